//! Equivalent spellings that are rewritten into one canonical form.

use super::{parse, serialize};
use insta::assert_snapshot;
use marktree::formats::markdown::{parse_markdown, MarkdownOptions};
use marktree::NodeType;

#[test]
fn canonical_block_spellings() {
    let text = "Title\n=====\n\n    indented\n\n***\n\nSee [docs][ref].\n\n[ref]: /docs\n";
    assert_snapshot!(serialize(&parse(text)), @r"
    # Title

    ```
    indented
    ```

    ---

    See [docs](/docs).
    ");
}

#[test]
fn soft_breaks_collapse_to_spaces() {
    assert_eq!(serialize(&parse("one\ntwo\n")), "one two\n");
}

#[test]
fn cjk_soft_breaks_join_without_space() {
    assert_eq!(serialize(&parse("日本\n語\n")), "日本語\n");

    let spaced = MarkdownOptions {
        cjk_soft_break_join: false,
        ..MarkdownOptions::default()
    };
    let doc = parse_markdown("日本\n語\n", &spaced).unwrap();
    assert_eq!(doc.content[0].text_content(), "日本 語");
}

#[test]
fn preserved_line_breaks_come_back_as_newlines() {
    let options = MarkdownOptions {
        preserve_line_breaks: true,
        ..MarkdownOptions::default()
    };
    let doc = parse_markdown("one\ntwo\n", &options).unwrap();
    let para = &doc.content[0];
    assert_eq!(para.content[1].kind, NodeType::HardBreak);
    assert_eq!(para.content[1].attr_bool("soft"), Some(true));
    let session_options = options.serialize_options(&Default::default());
    let text = marktree::formats::markdown::serialize_markdown(&doc, &session_options).unwrap();
    assert_eq!(text, "one\ntwo\n");
}

#[test]
fn html_marks_become_editor_marks() {
    let doc = parse("<sub>2</sub> <sup>3</sup> <mark>hot</mark>\n");
    let para = &doc.content[0];
    assert!(para.content.iter().all(|n| n.kind == NodeType::Text));
    assert_snapshot!(serialize(&doc).trim_end(), @"~2~ ^3^ ==hot==");
}

//! parse, serialize, parse yields the same tree; serialize, parse, serialize the same text.

use super::{parse, serialize};
use marktree::{MarkType, NodeType};
use proptest::prelude::*;

#[test]
fn adjacent_marked_runs() {
    let text = "**bold** and *italic* and `code`\n";
    let doc = parse(text);
    let para = &doc.content[0];
    assert_eq!(para.kind, NodeType::Paragraph);
    let marked: Vec<_> = para
        .content
        .iter()
        .filter_map(|n| n.marks.first().map(|m| m.kind))
        .collect();
    assert_eq!(marked, [MarkType::Bold, MarkType::Italic, MarkType::Code]);
    assert_eq!(serialize(&doc), text);
}

#[test]
fn kitchen_sink_is_stable() {
    let text = "\
# Title

Intro with [a link](https://example.com \"Example\") and H~2~O.

> quoted
>
> - nested list

1. first
2. second

- [ ] open
- [x] done

| name | value |
| :-- | --: |
| a | 1 |

```rust
fn main() {}
```

$$
x^2
$$

---

<details>
<summary>More</summary>

Hidden

</details>
";
    let doc = parse(text);
    let once = serialize(&doc);
    assert_eq!(parse(&once), doc);
    assert_eq!(serialize(&parse(&once)), once);
}

#[test]
fn raw_html_survives() {
    let text = "<div class=\"note\">\nkeep me\n</div>\n";
    let doc = parse(text);
    assert_eq!(doc.content[0].kind, NodeType::RawBlock);
    assert_eq!(serialize(&doc), text);
}

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn inline() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => word(),
        1 => word().prop_map(|w| format!("**{w}**")),
        1 => word().prop_map(|w| format!("*{w}*")),
        1 => word().prop_map(|w| format!("`{w}`")),
    ]
}

fn block() -> impl Strategy<Value = String> {
    let line = prop::collection::vec(inline(), 1..6).prop_map(|words| words.join(" ")).boxed();
    prop_oneof![
        3 => line.clone(),
        1 => (1usize..=6, line.clone()).prop_map(|(level, text)| format!("{} {text}", "#".repeat(level))),
        1 => prop::collection::vec(line.clone(), 1..4)
            .prop_map(|items| items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")),
        1 => line.prop_map(|text| format!("> {text}")),
    ]
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(block(), 1..6).prop_map(|blocks| format!("{}\n", blocks.join("\n\n")))
}

proptest! {
    #[test]
    fn parse_serialize_parse_is_identity(text in document()) {
        let doc = parse(&text);
        let written = serialize(&doc);
        prop_assert_eq!(parse(&written), doc);
    }

    #[test]
    fn serialize_is_a_fixed_point(text in document()) {
        let once = serialize(&parse(&text));
        let twice = serialize(&parse(&once));
        prop_assert_eq!(once, twice);
    }
}

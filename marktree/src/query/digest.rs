//! Whole-document digest
//!
//! A single pass that summarizes a document for an agent deciding where to look next.

use super::section::sections;
use super::Range;
use crate::formats::markdown::cjk::count_words;
use crate::ids::identify;
use crate::tree::{Node, NodeType};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub title: String,
    pub word_count: usize,
    pub char_count: usize,
    pub outline: Vec<OutlineEntry>,
    pub sections: Vec<SectionSummary>,
    pub block_counts: BTreeMap<String, usize>,
    pub has_images: bool,
    pub has_tables: bool,
    pub has_code_blocks: bool,
    pub languages: Vec<String>,
}

/// One heading in the outline. Placeholders fill skipped levels and have no id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub level: u8,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineEntry>,
}

impl OutlineEntry {
    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub id: String,
    pub level: u8,
    pub heading_text: String,
    pub range: Range,
    pub word_count: usize,
}

pub const UNTITLED: &str = "Untitled";

/// `structure.getDigest`
pub fn get_digest(doc: &Node) -> Digest {
    let mut title = None;
    let mut outline = Vec::new();
    let mut block_counts = BTreeMap::new();
    let mut languages: Vec<String> = Vec::new();
    let mut has_images = false;

    for node in identify(doc) {
        *block_counts.entry(node.node.kind.name().to_string()).or_insert(0) += 1;
        match node.node.kind {
            NodeType::Heading => {
                let level = node.node.level().unwrap_or(1);
                let text = node.node.text_content();
                if level == 1 && title.is_none() {
                    title = Some(text.clone());
                }
                insert_outline(
                    &mut outline,
                    1,
                    OutlineEntry {
                        id: Some(node.id.clone()),
                        level,
                        text,
                        children: Vec::new(),
                    },
                );
            }
            NodeType::CodeBlock => {
                if let Some(language) = node.node.attr_str("language").filter(|l| !l.is_empty()) {
                    if !languages.iter().any(|l| l == language) {
                        languages.push(language.to_string());
                    }
                }
            }
            _ => {}
        }
        if node.node.kind.is_textblock() {
            has_images |= node.node.content.iter().any(|c| c.kind == NodeType::Image);
        }
    }

    let text = doc.text_content();
    Digest {
        title: title.unwrap_or_else(|| UNTITLED.to_string()),
        word_count: count_words(&text),
        char_count: text.chars().filter(|c| *c != '\n').count(),
        outline,
        sections: sections(doc)
            .into_iter()
            .map(|s| SectionSummary {
                word_count: s
                    .body_blocks(doc)
                    .iter()
                    .map(|b| count_words(&b.text_content()))
                    .sum(),
                id: s.heading_id,
                level: s.level,
                heading_text: s.heading_text,
                range: s.range,
            })
            .collect(),
        has_tables: block_counts.contains_key(NodeType::Table.name()),
        has_code_blocks: block_counts.contains_key(NodeType::CodeBlock.name()),
        has_images,
        block_counts,
        languages,
    }
}

/// Insert `entry` into the outline list whose entries sit at `list_level`, creating empty
/// placeholders for any level the document skips.
fn insert_outline(list: &mut Vec<OutlineEntry>, list_level: u8, entry: OutlineEntry) {
    if entry.level <= list_level {
        list.push(entry);
        return;
    }
    if list.is_empty() {
        list.push(OutlineEntry {
            id: None,
            level: list_level,
            text: String::new(),
            children: Vec::new(),
        });
    }
    if let Some(parent) = list.last_mut() {
        insert_outline(&mut parent.children, list_level + 1, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::markdown::{parse_markdown, MarkdownOptions};

    fn digest(text: &str) -> Digest {
        get_digest(&parse_markdown(text, &MarkdownOptions::default()).unwrap())
    }

    #[test]
    fn title_falls_back_to_untitled() {
        assert_eq!(digest("## Only h2\n").title, "Untitled");
        assert_eq!(digest("## a\n\n# Real\n").title, "Real");
    }

    #[test]
    fn outline_fills_level_gaps() {
        let d = digest("# A\n\n### Deep\n\n## B\n");
        assert_eq!(d.outline.len(), 1);
        let a = &d.outline[0];
        assert_eq!(a.children.len(), 2);
        assert!(a.children[0].is_placeholder());
        assert_eq!(a.children[0].level, 2);
        assert_eq!(a.children[0].children[0].text, "Deep");
        assert_eq!(a.children[1].text, "B");
    }

    #[test]
    fn outline_starting_below_level_one() {
        let d = digest("### Deep\n");
        assert!(d.outline[0].is_placeholder());
        assert!(d.outline[0].children[0].is_placeholder());
        assert_eq!(d.outline[0].children[0].children[0].text, "Deep");
    }

    #[test]
    fn counts_and_flags() {
        let d = digest("# T\n\nhello world ![img](a.png)\n\n```rust\nfn x() {}\n```\n\n```rust\n```\n\n| a |\n|---|\n| b |\n");
        assert!(d.has_images);
        assert!(d.has_tables);
        assert!(d.has_code_blocks);
        assert_eq!(d.languages, vec!["rust"]);
        assert_eq!(d.block_counts["codeBlock"], 2);
        assert_eq!(d.sections.len(), 1);
        assert_eq!(d.sections[0].heading_text, "T");
    }

    #[test]
    fn cjk_words() {
        assert_eq!(digest("中文 text\n").word_count, 3);
    }
}

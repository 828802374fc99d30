//! Sections
//!
//! A section is derived, never stored: a top-level heading plus the top-level blocks after it,
//! up to the next heading of the same or a shallower level (or the end of the document). With
//! `include_nested` turned off the section stops at the next heading of any level, which gives
//! the text directly under the heading without its subsections.

use super::Range;
use crate::error::ProtocolError;
use crate::formats::markdown::{serialize_blocks, SerializeOptions};
use crate::ids::identify;
use crate::tree::{Node, NodeType};
use serde::{Deserialize, Serialize};

/// How a caller names a heading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HeadingSelector {
    /// Exact heading text, compared case-insensitively.
    Text(String),
    /// The `index`-th (0-based) heading of `level`.
    Ordinal { level: u8, index: usize },
    Id { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub heading_id: String,
    /// Index of the heading among the document's top-level blocks.
    pub heading_index: usize,
    /// One past the last top-level block of the section.
    pub end_index: usize,
    pub level: u8,
    pub heading_text: String,
    pub range: Range,
    /// Range of the blocks after the heading.
    pub body: Range,
}

impl Section {
    pub fn body_blocks<'a>(&self, doc: &'a Node) -> &'a [Node] {
        &doc.content[self.heading_index + 1..self.end_index]
    }
}

/// One past the last block of the section headed by `doc.content[heading_index]`.
pub fn section_end(doc: &Node, heading_index: usize, include_nested: bool) -> usize {
    let level = doc.content[heading_index].level().unwrap_or(1);
    doc.content[heading_index + 1..]
        .iter()
        .position(|block| match block.level() {
            Some(other) => !include_nested || other <= level,
            None => false,
        })
        .map_or(doc.content.len(), |offset| heading_index + 1 + offset)
}

/// Build the section for a top-level heading.
pub fn section_at(doc: &Node, heading_index: usize, include_nested: bool) -> Option<Section> {
    let heading = doc.content.get(heading_index)?;
    if heading.kind != NodeType::Heading {
        return None;
    }
    let end_index = section_end(doc, heading_index, include_nested);
    let start: usize = doc.content[..heading_index].iter().map(Node::node_size).sum();
    let body_start = start + heading.node_size();
    let end = body_start
        + doc.content[heading_index + 1..end_index]
            .iter()
            .map(Node::node_size)
            .sum::<usize>();
    let heading_id = identify(doc)
        .into_iter()
        .find(|n| n.path == [heading_index])
        .map(|n| n.id)
        .unwrap_or_default();
    Some(Section {
        heading_id,
        heading_index,
        end_index,
        level: heading.level().unwrap_or(1),
        heading_text: heading.text_content(),
        range: Range { from: start, to: end },
        body: Range {
            from: body_start,
            to: end,
        },
    })
}

/// Every top-level section in document order, each including its subsections.
pub fn sections(doc: &Node) -> Vec<Section> {
    (0..doc.content.len())
        .filter_map(|i| section_at(doc, i, true))
        .collect()
}

/// Locate a section by selector.
pub fn find_section(doc: &Node, selector: &HeadingSelector, include_nested: bool) -> Result<Section, ProtocolError> {
    let headings: Vec<(String, usize, &Node)> = identify(doc)
        .into_iter()
        .filter(|n| n.depth == 0 && n.node.kind == NodeType::Heading)
        .map(|n| (n.id, n.path[0], n.node))
        .collect();

    let found: Vec<usize> = match selector {
        HeadingSelector::Text(text) => {
            let wanted = text.trim().to_lowercase();
            headings
                .iter()
                .filter(|(_, _, node)| node.text_content().trim().to_lowercase() == wanted)
                .map(|(_, index, _)| *index)
                .collect()
        }
        HeadingSelector::Ordinal { level, index } => headings
            .iter()
            .filter(|(_, _, node)| node.level() == Some(*level))
            .nth(*index)
            .map(|(_, i, _)| *i)
            .into_iter()
            .collect(),
        HeadingSelector::Id { id } => headings
            .iter()
            .filter(|(hid, _, _)| hid == id)
            .map(|(_, i, _)| *i)
            .collect(),
    };

    match found.as_slice() {
        [] => Err(ProtocolError::not_found(format!(
            "no heading matches {}",
            describe(selector)
        ))),
        [index] => section_at(doc, *index, include_nested)
            .ok_or_else(|| ProtocolError::not_found("heading vanished while resolving section")),
        many => {
            let candidates: Vec<serde_json::Value> = many
                .iter()
                .filter_map(|i| headings.iter().find(|(_, index, _)| index == i))
                .map(|(id, _, node)| {
                    serde_json::json!({ "id": id, "level": node.level(), "text": node.text_content() })
                })
                .collect();
            Err(ProtocolError::ambiguous(
                format!("{} headings match {}", many.len(), describe(selector)),
                serde_json::Value::Array(candidates),
            ))
        }
    }
}

fn describe(selector: &HeadingSelector) -> String {
    match selector {
        HeadingSelector::Text(text) => format!("text '{text}'"),
        HeadingSelector::Ordinal { level, index } => format!("level {level} index {index}"),
        HeadingSelector::Id { id } => format!("id '{id}'"),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionArgs {
    pub heading: HeadingSelector,
    pub include_nested: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub heading: SectionHeading,
    /// Markdown of the blocks under the heading.
    pub content: String,
    pub range: Range,
    pub block_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionHeading {
    pub id: String,
    pub level: u8,
    pub text: String,
}

/// `structure.getSection`
pub fn get_section(doc: &Node, args: &SectionArgs, options: &SerializeOptions) -> Result<SectionView, ProtocolError> {
    let section = find_section(doc, &args.heading, args.include_nested.unwrap_or(true))?;
    let body = section.body_blocks(doc);
    Ok(SectionView {
        content: serialize_blocks(body, options)?,
        block_count: body.len(),
        range: section.range,
        heading: SectionHeading {
            id: section.heading_id,
            level: section.level,
            text: section.heading_text,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::formats::markdown::{parse_markdown, MarkdownOptions};

    const DOC: &str = "# One\n\nintro\n\n## Sub\n\nsub text\n\n# Two\n\nlast\n";

    fn doc() -> Node {
        parse_markdown(DOC, &MarkdownOptions::default()).unwrap()
    }

    #[test]
    fn section_stops_at_equal_or_shallower_heading() {
        let doc = doc();
        let section = find_section(&doc, &HeadingSelector::Text("one".into()), true).unwrap();
        assert_eq!(section.heading_index, 0);
        assert_eq!(section.end_index, 4);
        let only_own = find_section(&doc, &HeadingSelector::Text("One".into()), false).unwrap();
        assert_eq!(only_own.end_index, 2);
    }

    #[test]
    fn ordinal_and_id_selectors() {
        let doc = doc();
        let second = find_section(&doc, &HeadingSelector::Ordinal { level: 1, index: 1 }, true).unwrap();
        assert_eq!(second.heading_text, "Two");
        assert_eq!(second.end_index, doc.content.len());
        let sub = find_section(&doc, &HeadingSelector::Id { id: "h-1".into() }, true).unwrap();
        assert_eq!(sub.heading_text, "Sub");
    }

    #[test]
    fn get_section_returns_body_markdown() {
        let doc = doc();
        let args: SectionArgs = serde_json::from_value(serde_json::json!({ "heading": "One" })).unwrap();
        let view = get_section(&doc, &args, &SerializeOptions::default()).unwrap();
        assert_eq!(view.content, "intro\n\n## Sub\n\nsub text");
        assert_eq!(view.range.from, 0);
        assert_eq!(view.heading.id, "h-0");
    }

    #[test]
    fn missing_and_duplicate_headings() {
        let doc = doc();
        let err = find_section(&doc, &HeadingSelector::Text("nope".into()), true).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let twice = parse_markdown("# Same\n\na\n\n# Same\n\nb\n", &MarkdownOptions::default()).unwrap();
        let err = find_section(&twice, &HeadingSelector::Text("same".into()), true).unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousTarget);
    }

    #[test]
    fn ranges_cover_blocks() {
        let doc = doc();
        let all = sections(&doc);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].range.to, all[2].range.from);
        assert_eq!(all[2].range.to, doc.content_size());
    }
}

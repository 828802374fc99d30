//! Treeviz formatter for document trees
//!
//! Treeviz is a visual representation of the tree, one node per line, with box-drawing
//! connectors for nesting. Inline runs are folded into their textblock's label, so the output
//! reads like an outline of the block structure.
//!
//! So the format is :
//! <prefix><connector> <icon> <label> (label truncated to 30 characters)
//!
//! Example:
//!
//! ```text
//! ⧉ doc
//! ├─ # Introduction
//! ├─ ¶ Welcome to the guide, wh…
//! └─ ☰ 2 items
//!    ├─ • First
//!    └─ • Second
//! ```

use crate::error::FormatError;
use crate::format::Format;
use crate::tree::{Node, NodeType};
use std::collections::HashMap;

const LABEL_WIDTH: usize = 30;

/// Icon for a node type.
pub fn icon(kind: NodeType) -> &'static str {
    match kind {
        NodeType::Doc => "⧉",
        NodeType::Heading => "#",
        NodeType::Paragraph => "¶",
        NodeType::CodeBlock => "𝒱",
        NodeType::Blockquote => "❝",
        NodeType::BulletList | NodeType::OrderedList | NodeType::TaskList => "☰",
        NodeType::ListItem => "•",
        NodeType::TaskItem => "☐",
        NodeType::Table => "▦",
        NodeType::TableRow => "═",
        NodeType::TableHeader | NodeType::TableCell => "▫",
        NodeType::HorizontalRule => "⎯",
        NodeType::Image => "▣",
        NodeType::MathBlock | NodeType::MathInline => "√",
        NodeType::DetailsBlock => "▸",
        NodeType::DetailsSummary => "⊤",
        NodeType::RawBlock | NodeType::RawInline => "⟨⟩",
        NodeType::HardBreak => "↵",
        NodeType::Text => "◦",
    }
}

fn label(node: &Node) -> String {
    let text = match node.kind {
        NodeType::Doc => "doc".to_string(),
        kind if kind.is_list() => format!("{} items", node.content.len()),
        NodeType::Table => format!("{} rows", node.content.len()),
        NodeType::TaskItem => {
            let check = if node.attr_bool("checked") == Some(true) { "[x]" } else { "[ ]" };
            format!("{check} {}", first_line(node))
        }
        NodeType::CodeBlock => node.attr_str("language").unwrap_or("code").to_string(),
        NodeType::RawBlock => node.attr_str("kind").unwrap_or("raw").to_string(),
        _ => first_line(node),
    };
    truncate(&text)
}

fn first_line(node: &Node) -> String {
    node.text_content().lines().next().unwrap_or("").to_string()
}

fn truncate(text: &str) -> String {
    if text.chars().count() > LABEL_WIDTH {
        let cut: String = text.chars().take(LABEL_WIDTH - 1).collect();
        format!("{cut}…")
    } else {
        text.to_string()
    }
}

/// Whether the treeviz shows this node's children as separate lines.
fn shows_children(node: &Node) -> bool {
    !node.kind.is_textblock() && !node.content.is_empty()
}

fn format_node(node: &Node, prefix: &str, is_last: bool, out: &mut String) {
    let connector = if is_last { "└─" } else { "├─" };
    out.push_str(&format!("{prefix}{connector} {} {}\n", icon(node.kind), label(node)));
    if shows_children(node) {
        let child_prefix = format!("{prefix}{}", if is_last { "   " } else { "│  " });
        format_children(node, &child_prefix, out);
    }
}

fn format_children(node: &Node, prefix: &str, out: &mut String) {
    // A list item's single paragraph is already its label.
    let children: Vec<&Node> = if node.kind.is_list_item() {
        node.content.iter().skip(1).collect()
    } else {
        node.content.iter().collect()
    };
    for (i, child) in children.iter().enumerate() {
        format_node(child, prefix, i + 1 == children.len(), out);
    }
}

/// Render a tree as treeviz text.
pub fn to_treeviz_str(doc: &Node) -> String {
    let mut out = format!("{} {}\n", icon(doc.kind), label(doc));
    format_children(doc, "", &mut out);
    out
}

#[derive(Default)]
pub struct TreevizFormat;

impl Format for TreevizFormat {
    fn name(&self) -> &str {
        "treeviz"
    }

    fn description(&self) -> &str {
        "Visual tree representation of the block structure"
    }

    fn file_extensions(&self) -> &[&str] {
        &["tree", "treeviz"]
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn serialize(&self, doc: &Node) -> Result<String, FormatError> {
        Ok(to_treeviz_str(doc))
    }

    fn serialize_with_options(
        &self,
        doc: &Node,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        if let Some(key) = options.keys().next() {
            return Err(FormatError::NotSupported(format!("treeviz option '{key}'")));
        }
        self.serialize(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::markdown::{parse_markdown, MarkdownOptions};

    #[test]
    fn renders_nested_lists() {
        let doc = parse_markdown("# Intro\n\n- one\n- two\n  - deep\n", &MarkdownOptions::default())
            .unwrap();
        insta::assert_snapshot!(to_treeviz_str(&doc), @r"
        ⧉ doc
        ├─ # Intro
        └─ ☰ 2 items
           ├─ • one
           └─ • two
              └─ ☰ 1 items
                 └─ • deep
        ");
    }

    #[test]
    fn truncates_long_labels() {
        let long = "x".repeat(40);
        let doc = Node::doc(vec![Node::paragraph(vec![Node::text(long)])]);
        let out = to_treeviz_str(&doc);
        assert!(out.lines().nth(1).unwrap().ends_with('…'));
    }
}

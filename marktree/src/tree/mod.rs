//! Document tree
//!
//!     The tree is the structured side of the editor: a `doc` root holding block nodes, blocks
//!     holding either more blocks or inline content, and inline content stored flat as text runs
//!     and atoms that each carry their own ordered set of marks. This is the same shape a
//!     ProseMirror-style rich-text host works with, so positions computed here line up with
//!     positions the host reports.
//!
//!     Positions
//!
//!     Every node has a size: a text node counts one per character (Unicode scalar value), an
//!     atom counts 1 and every other node counts 2 (its open and close boundary) plus its
//!     content. Position 0 is the start of the document content. See [`pos`] for the helpers
//!     that walk between paths and positions.

pub mod edit;
pub mod pos;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Type-specific attributes of a node or mark.
pub type Attrs = BTreeMap<String, Value>;

/// Object replacement character standing in for inline atoms in extracted text.
pub const ATOM_PLACEHOLDER: char = '\u{FFFC}';

/// Closed set of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Doc,
    Paragraph,
    Heading,
    CodeBlock,
    Blockquote,
    BulletList,
    OrderedList,
    TaskList,
    ListItem,
    TaskItem,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    HorizontalRule,
    Image,
    HardBreak,
    Text,
    MathInline,
    MathBlock,
    DetailsBlock,
    DetailsSummary,
    RawBlock,
    RawInline,
}

impl NodeType {
    pub const ALL: [NodeType; 24] = [
        NodeType::Doc,
        NodeType::Paragraph,
        NodeType::Heading,
        NodeType::CodeBlock,
        NodeType::Blockquote,
        NodeType::BulletList,
        NodeType::OrderedList,
        NodeType::TaskList,
        NodeType::ListItem,
        NodeType::TaskItem,
        NodeType::Table,
        NodeType::TableRow,
        NodeType::TableHeader,
        NodeType::TableCell,
        NodeType::HorizontalRule,
        NodeType::Image,
        NodeType::HardBreak,
        NodeType::Text,
        NodeType::MathInline,
        NodeType::MathBlock,
        NodeType::DetailsBlock,
        NodeType::DetailsSummary,
        NodeType::RawBlock,
        NodeType::RawInline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Doc => "doc",
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::CodeBlock => "codeBlock",
            NodeType::Blockquote => "blockquote",
            NodeType::BulletList => "bulletList",
            NodeType::OrderedList => "orderedList",
            NodeType::TaskList => "taskList",
            NodeType::ListItem => "listItem",
            NodeType::TaskItem => "taskItem",
            NodeType::Table => "table",
            NodeType::TableRow => "tableRow",
            NodeType::TableHeader => "tableHeader",
            NodeType::TableCell => "tableCell",
            NodeType::HorizontalRule => "horizontalRule",
            NodeType::Image => "image",
            NodeType::HardBreak => "hardBreak",
            NodeType::Text => "text",
            NodeType::MathInline => "mathInline",
            NodeType::MathBlock => "mathBlock",
            NodeType::DetailsBlock => "detailsBlock",
            NodeType::DetailsSummary => "detailsSummary",
            NodeType::RawBlock => "rawBlock",
            NodeType::RawInline => "rawInline",
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            NodeType::Text
                | NodeType::Image
                | NodeType::HardBreak
                | NodeType::MathInline
                | NodeType::RawInline
        )
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline() && *self != NodeType::Doc
    }

    /// Leaf nodes with no content of their own (size 1).
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            NodeType::Image
                | NodeType::HardBreak
                | NodeType::MathInline
                | NodeType::RawInline
                | NodeType::HorizontalRule
                | NodeType::RawBlock
        )
    }

    /// Blocks whose content is inline.
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeType::Paragraph
                | NodeType::Heading
                | NodeType::CodeBlock
                | NodeType::MathBlock
                | NodeType::DetailsSummary
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            NodeType::BulletList | NodeType::OrderedList | NodeType::TaskList
        )
    }

    pub fn is_list_item(&self) -> bool {
        matches!(self, NodeType::ListItem | NodeType::TaskItem)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inline formatting annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkType {
    Link,
    Bold,
    Italic,
    Strike,
    Underline,
    Highlight,
    Subscript,
    Superscript,
    Code,
}

impl MarkType {
    pub const ALL: [MarkType; 9] = [
        MarkType::Link,
        MarkType::Bold,
        MarkType::Italic,
        MarkType::Strike,
        MarkType::Underline,
        MarkType::Highlight,
        MarkType::Subscript,
        MarkType::Superscript,
        MarkType::Code,
    ];

    /// Nesting rank when written as markdown; lower ranks wrap higher ones.
    pub fn rank(&self) -> u8 {
        match self {
            MarkType::Link => 0,
            MarkType::Bold => 1,
            MarkType::Italic => 2,
            MarkType::Strike => 3,
            MarkType::Underline => 4,
            MarkType::Highlight => 5,
            MarkType::Subscript => 6,
            MarkType::Superscript => 7,
            MarkType::Code => 8,
        }
    }
}

/// A mark applied to an inline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub kind: MarkType,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(kind: MarkType) -> Self {
        Mark {
            kind,
            attrs: Attrs::new(),
        }
    }

    pub fn link(href: impl Into<String>, title: Option<String>) -> Self {
        let mut mark = Mark::new(MarkType::Link);
        mark.attrs
            .insert("href".to_string(), Value::String(href.into()));
        if let Some(title) = title {
            mark.attrs.insert("title".to_string(), Value::String(title));
        }
        mark
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// Adds `mark` to a mark set, keeping the set ordered by rank and free of duplicates.
pub fn add_mark(marks: &mut Vec<Mark>, mark: Mark) {
    marks.retain(|m| m.kind != mark.kind);
    let at = marks
        .iter()
        .position(|m| m.kind.rank() > mark.kind.rank())
        .unwrap_or(marks.len());
    marks.insert(at, mark);
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeType) -> Self {
        Node {
            kind,
            attrs: Attrs::new(),
            marks: Vec::new(),
            text: None,
            content: Vec::new(),
        }
    }

    pub fn doc(content: Vec<Node>) -> Self {
        Node::block(NodeType::Doc, content)
    }

    pub fn block(kind: NodeType, content: Vec<Node>) -> Self {
        Node {
            content,
            ..Node::new(kind)
        }
    }

    pub fn paragraph(content: Vec<Node>) -> Self {
        Node::block(NodeType::Paragraph, content)
    }

    pub fn heading(level: u8, content: Vec<Node>) -> Self {
        Node::block(NodeType::Heading, content).with_attr("level", level)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node {
            text: Some(text.into()),
            ..Node::new(NodeType::Text)
        }
    }

    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Node {
            marks,
            ..Node::text(text)
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(Value::as_u64)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attrs.get(key).and_then(Value::as_bool)
    }

    /// Heading level, if this node is a heading.
    pub fn level(&self) -> Option<u8> {
        if self.kind == NodeType::Heading {
            self.attr_u64("level").map(|l| l.clamp(1, 6) as u8)
        } else {
            None
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeType::Text
    }

    pub fn has_mark(&self, kind: MarkType) -> bool {
        self.marks.iter().any(|m| m.kind == kind)
    }

    /// Size of this node in tree positions.
    pub fn node_size(&self) -> usize {
        if self.is_text() {
            self.text.as_deref().map_or(0, |t| t.chars().count())
        } else if self.kind.is_atom() {
            1
        } else {
            2 + self.content_size()
        }
    }

    /// Size of this node's content.
    pub fn content_size(&self) -> usize {
        self.content.iter().map(Node::node_size).sum()
    }

    /// Plain text of the node: text runs concatenated, math as its source, hard breaks as
    /// newlines, and blocks separated by a newline.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Inline text with each atom represented by a single placeholder character, so
    /// character offsets line up with positions inside the textblock.
    pub fn inline_text(&self) -> String {
        let mut out = String::new();
        for child in &self.content {
            match child.text.as_deref() {
                Some(text) if child.is_text() => out.push_str(text),
                _ => out.push(ATOM_PLACEHOLDER),
            }
        }
        out
    }

    /// Visit every node depth-first in document order together with its path.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node, &[usize])) {
        fn go<'a>(node: &'a Node, path: &mut Vec<usize>, visit: &mut dyn FnMut(&'a Node, &[usize])) {
            for (i, child) in node.content.iter().enumerate() {
                path.push(i);
                visit(child, path);
                go(child, path, visit);
                path.pop();
            }
        }
        let mut path = Vec::new();
        go(self, &mut path, visit);
    }

    /// Node at a child-index path, `[]` being this node.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self;
        for &i in path {
            node = node.content.get(i)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self;
        for &i in path {
            node = node.content.get_mut(i)?;
        }
        Some(node)
    }

    /// Whether any inline descendant carries one of `kinds`.
    pub fn has_any_mark(&self, kinds: &[MarkType]) -> bool {
        if self.marks.iter().any(|m| kinds.contains(&m.kind)) {
            return true;
        }
        self.content.iter().any(|c| c.has_any_mark(kinds))
    }

    /// Same type, attributes and marks, ignoring content.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.kind == other.kind && self.attrs == other.attrs && self.marks == other.marks
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node.kind {
        NodeType::Text => out.push_str(node.text.as_deref().unwrap_or("")),
        NodeType::HardBreak => out.push('\n'),
        NodeType::MathInline => out.push_str(node.attr_str("latex").unwrap_or("")),
        NodeType::Image => out.push_str(node.attr_str("alt").unwrap_or("")),
        _ => {
            for (i, child) in node.content.iter().enumerate() {
                if i > 0 && child.kind.is_block() {
                    out.push('\n');
                }
                collect_text(child, out);
            }
        }
    }
}

/// Merge adjacent text runs with identical marks and drop empty runs.
pub fn normalize_inline(content: &mut Vec<Node>) {
    let mut merged: Vec<Node> = Vec::with_capacity(content.len());
    for node in content.drain(..) {
        if node.is_text() && node.text.as_deref().map_or(true, str::is_empty) {
            continue;
        }
        if let Some(last) = merged.last_mut() {
            if last.is_text() && node.is_text() && last.marks == node.marks {
                let text = node.text.unwrap_or_default();
                last.text.get_or_insert_with(String::new).push_str(&text);
                continue;
            }
        }
        merged.push(node);
    }
    *content = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_position_rules() {
        let doc = Node::doc(vec![
            Node::paragraph(vec![Node::text("héllo")]),
            Node::new(NodeType::HorizontalRule),
        ]);
        assert_eq!(doc.content[0].node_size(), 7);
        assert_eq!(doc.content[1].node_size(), 1);
        assert_eq!(doc.content_size(), 8);
    }

    #[test]
    fn node_type_serializes_camel_case() {
        let json = serde_json::to_value(NodeType::HorizontalRule).unwrap();
        assert_eq!(json, "horizontalRule");
        let node = Node::heading(2, vec![Node::text("Title")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "heading");
        assert_eq!(json["attrs"]["level"], 2);
    }

    #[test]
    fn add_mark_keeps_rank_order() {
        let mut marks = vec![Mark::new(MarkType::Code)];
        add_mark(&mut marks, Mark::new(MarkType::Bold));
        add_mark(&mut marks, Mark::new(MarkType::Bold));
        assert_eq!(
            marks.iter().map(|m| m.kind).collect::<Vec<_>>(),
            vec![MarkType::Bold, MarkType::Code]
        );
    }

    #[test]
    fn normalize_merges_equal_runs() {
        let bold = vec![Mark::new(MarkType::Bold)];
        let mut content = vec![
            Node::marked_text("a", bold.clone()),
            Node::marked_text("b", bold.clone()),
            Node::text(""),
            Node::text("c"),
        ];
        normalize_inline(&mut content);
        assert_eq!(content.len(), 2);
        assert_eq!(content[0].text.as_deref(), Some("ab"));
    }

    #[test]
    fn text_content_joins_blocks() {
        let doc = Node::doc(vec![
            Node::paragraph(vec![Node::text("one")]),
            Node::paragraph(vec![Node::text("two")]),
        ]);
        assert_eq!(doc.text_content(), "one\ntwo");
    }
}

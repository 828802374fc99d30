//! Node identity
//!
//!     IDs are view handles, not stored state: a traversal walks the tree in document order and
//!     hands out `{prefix}-{n}` per node type from an explicit counter map. The same snapshot
//!     walked with fresh counters always yields the same IDs, and nothing is written onto the
//!     nodes themselves.
//!
//!     Counters are passed in by the caller rather than held globally, so two traversals over
//!     different snapshots can never leak numbering into each other.

use crate::tree::{Node, NodeType};
use std::collections::HashMap;

/// ID prefix for a node type.
pub fn id_prefix(kind: NodeType) -> &'static str {
    match kind {
        NodeType::Doc => "doc",
        NodeType::Heading => "h",
        NodeType::Paragraph => "p",
        NodeType::CodeBlock => "code",
        NodeType::Blockquote => "quote",
        NodeType::BulletList => "ul",
        NodeType::OrderedList => "ol",
        NodeType::TaskList => "task",
        NodeType::ListItem => "li",
        NodeType::TaskItem => "ti",
        NodeType::Table => "table",
        NodeType::TableRow => "tr",
        NodeType::TableHeader => "th",
        NodeType::TableCell => "td",
        NodeType::HorizontalRule => "hr",
        NodeType::Image => "img",
        NodeType::HardBreak => "br",
        NodeType::Text => "txt",
        NodeType::MathBlock => "math",
        NodeType::MathInline => "imath",
        NodeType::DetailsBlock => "details",
        NodeType::DetailsSummary => "summary",
        NodeType::RawBlock => "raw",
        NodeType::RawInline => "iraw",
    }
}

/// Per-prefix counters for one traversal.
#[derive(Debug, Clone, Default)]
pub struct IdCounters {
    counts: HashMap<&'static str, usize>,
}

impl IdCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    pub fn next(&mut self, prefix: &'static str) -> String {
        let n = self.counts.entry(prefix).or_insert(0);
        let id = format!("{prefix}-{n}");
        *n += 1;
        id
    }
}

/// A node together with the handle and coordinates a traversal gave it.
#[derive(Debug, Clone)]
pub struct IdentifiedNode<'a> {
    pub id: String,
    pub path: Vec<usize>,
    /// Position just before the node.
    pub pos: usize,
    /// Nesting depth, 0 for children of the root.
    pub depth: usize,
    pub node: &'a Node,
}

impl IdentifiedNode<'_> {
    pub fn end(&self) -> usize {
        self.pos + self.node.node_size()
    }
}

/// Walk `doc` depth-first in document order and assign IDs to its block nodes.
///
/// The counters are used as given, so callers reset them before a client-facing traversal.
pub fn assign_ids<'a>(doc: &'a Node, counters: &mut IdCounters) -> Vec<IdentifiedNode<'a>> {
    fn go<'a>(
        node: &'a Node,
        content_start: usize,
        path: &mut Vec<usize>,
        counters: &mut IdCounters,
        out: &mut Vec<IdentifiedNode<'a>>,
    ) {
        let mut pos = content_start;
        for (i, child) in node.content.iter().enumerate() {
            path.push(i);
            if child.kind.is_block() {
                out.push(IdentifiedNode {
                    id: counters.next(id_prefix(child.kind)),
                    path: path.clone(),
                    pos,
                    depth: path.len() - 1,
                    node: child,
                });
                go(child, pos + 1, path, counters, out);
            }
            path.pop();
            pos += child.node_size();
        }
    }

    let mut out = Vec::new();
    go(doc, 0, &mut Vec::new(), counters, &mut out);
    out
}

/// Traversal with fresh counters: the numbering every query response uses.
pub fn identify(doc: &Node) -> Vec<IdentifiedNode<'_>> {
    assign_ids(doc, &mut IdCounters::new())
}

/// Find a block by the ID a fresh traversal would give it.
pub fn find_by_id<'a>(doc: &'a Node, id: &str) -> Option<IdentifiedNode<'a>> {
    identify(doc).into_iter().find(|n| n.id == id)
}

/// The ID of the node at `path`, as numbered by a block-level traversal.
pub fn id_at_path(doc: &Node, path: &[usize]) -> Option<String> {
    identify(doc).into_iter().find(|n| n.path == path).map(|n| n.id)
}

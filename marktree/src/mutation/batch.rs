//! `mutation.batchEdit`
//!
//! Targets are resolved against the snapshot the caller read, before anything changes. The
//! operations then run in order on a working copy, and a [`PathTracker`] keeps every resolved
//! path pointing at the same node while earlier operations insert, delete and move blocks
//! around it. An operation whose node is gone, or that cannot be expressed in the tree, becomes
//! a warning.

use super::{begin, finish, resolve, MutationHeader, MutationOutcome, Placement, Target};
use crate::error::ProtocolError;
use crate::formats::markdown::{parse_blocks, parse_inline, MarkdownOptions};
use crate::session::DocumentSession;
use crate::tree::edit::set_mark;
use crate::tree::{Mark, MarkType, Node, NodeType};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditOp {
    /// Replace a block's content with markdown.
    Update { target: Target, content: String },
    Insert {
        target: Target,
        #[serde(default)]
        position: Placement,
        content: String,
    },
    Delete { target: Target },
    /// Add or remove a mark on `text` (every occurrence) or on the whole target.
    Format {
        target: Target,
        mark: MarkType,
        #[serde(default)]
        remove: bool,
        text: Option<String>,
        href: Option<String>,
    },
    Move {
        target: Target,
        destination: Target,
        #[serde(default)]
        position: Placement,
    },
}

impl EditOp {
    fn name(&self) -> &'static str {
        match self {
            EditOp::Update { .. } => "update",
            EditOp::Insert { .. } => "insert",
            EditOp::Delete { .. } => "delete",
            EditOp::Format { .. } => "format",
            EditOp::Move { .. } => "move",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEditArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    pub operations: Vec<EditOp>,
}

/// Keeps resolved paths valid across structural edits.
#[derive(Debug, Clone, Default)]
pub struct PathTracker {
    slots: Vec<Option<Vec<usize>>>,
}

impl PathTracker {
    pub fn track(&mut self, path: Vec<usize>) -> usize {
        self.slots.push(Some(path));
        self.slots.len() - 1
    }

    pub fn get(&self, slot: usize) -> Option<&[usize]> {
        self.slots.get(slot).and_then(|p| p.as_deref())
    }

    /// The node at `path` was removed. Returns, for each slot that pointed into it, the slot
    /// and the rest of its path below the removed node.
    pub fn removed(&mut self, path: &[usize]) -> Vec<(usize, Vec<usize>)> {
        let depth = path.len() - 1;
        let mut detached = Vec::new();
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            let Some(p) = entry else { continue };
            if p.starts_with(path) {
                detached.push((slot, p[path.len()..].to_vec()));
                *entry = None;
            } else if p.len() > depth && p[..depth] == path[..depth] && p[depth] > path[depth] {
                p[depth] -= 1;
            }
        }
        detached
    }

    /// `count` nodes were inserted under `parent` starting at `index`.
    pub fn inserted(&mut self, parent: &[usize], index: usize, count: usize) {
        let depth = parent.len();
        for p in self.slots.iter_mut().flatten() {
            if p.len() > depth && p[..depth] == *parent && p[depth] >= index {
                p[depth] += count;
            }
        }
    }

    /// Point detached slots at the node's new home.
    pub fn reattach(&mut self, at: &[usize], detached: Vec<(usize, Vec<usize>)>) {
        for (slot, rest) in detached {
            let mut path = at.to_vec();
            path.extend(rest);
            self.slots[slot] = Some(path);
        }
    }
}

/// `mutation.batchEdit`
pub fn batch_edit(
    session: &mut DocumentSession,
    args: &BatchEditArgs,
) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    if args.operations.is_empty() {
        return Err(ProtocolError::invalid_operation("operations must not be empty"));
    }

    let mut tracker = PathTracker::default();
    let mut slots = Vec::with_capacity(args.operations.len());
    for op in &args.operations {
        let target = match op {
            EditOp::Update { target, .. }
            | EditOp::Insert { target, .. }
            | EditOp::Delete { target }
            | EditOp::Format { target, .. }
            | EditOp::Move { target, .. } => target,
        };
        let primary = tracker.track(resolve(session.doc(), target)?.path);
        let secondary = match op {
            EditOp::Move { destination, .. } => Some(tracker.track(resolve(session.doc(), destination)?.path)),
            _ => None,
        };
        slots.push((primary, secondary));
    }

    let options = session.settings().markdown.clone();
    let mut doc = session.doc().clone();
    let mut warnings = Vec::new();
    for (i, (op, (primary, secondary))) in args.operations.iter().zip(slots).enumerate() {
        let result = match tracker.get(primary).map(<[usize]>::to_vec) {
            None => Err("target was removed by an earlier operation".to_string()),
            Some(path) => {
                let destination = secondary.and_then(|s| tracker.get(s).map(<[usize]>::to_vec));
                apply_op(&mut doc, op, &path, destination, secondary.is_some(), &mut tracker, &options)
            }
        };
        if let Err(message) = result {
            warnings.push(format!("operations[{i}] ({}): {message}", op.name()));
        }
    }
    finish(session, mode, doc, warnings)
}

fn apply_op(
    doc: &mut Node,
    op: &EditOp,
    path: &[usize],
    destination: Option<Vec<usize>>,
    expects_destination: bool,
    tracker: &mut PathTracker,
    options: &MarkdownOptions,
) -> Result<(), String> {
    match op {
        EditOp::Update { content, .. } => update(doc, path, content, tracker, options),
        EditOp::Insert { content, position, .. } => insert(doc, path, *position, content, tracker, options),
        EditOp::Delete { .. } => delete(doc, path, tracker).map(|_| ()),
        EditOp::Format {
            mark, remove, text, href, ..
        } => format(doc, path, *mark, *remove, text.as_deref(), href.as_deref()),
        EditOp::Move { position, .. } => match destination {
            Some(destination) => move_block(doc, path, &destination, *position, tracker),
            None if expects_destination => Err("destination was removed by an earlier operation".into()),
            None => Err("missing destination".into()),
        },
    }
}

fn split_path(path: &[usize]) -> Result<(&[usize], usize), String> {
    path.split_last()
        .map(|(last, parent)| (parent, *last))
        .ok_or_else(|| "the document root cannot be edited".to_string())
}

fn literal(text: &str) -> Vec<Node> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Node::text(text)]
    }
}

fn update(
    doc: &mut Node,
    path: &[usize],
    content: &str,
    tracker: &mut PathTracker,
    options: &MarkdownOptions,
) -> Result<(), String> {
    let (parent_path, index) = split_path(path)?;
    let kind = doc.node_at(path).ok_or("target vanished")?.kind;
    let replacement = match kind {
        NodeType::CodeBlock | NodeType::MathBlock => literal(content.trim_end_matches('\n')),
        NodeType::Paragraph | NodeType::Heading | NodeType::DetailsSummary => {
            parse_inline(content, options).map_err(|e| e.to_string())?
        }
        NodeType::TableCell | NodeType::TableHeader => {
            vec![Node::paragraph(parse_inline(content, options).map_err(|e| e.to_string())?)]
        }
        NodeType::ListItem | NodeType::TaskItem => {
            let blocks = parse_blocks(content, options).map_err(|e| e.to_string())?;
            if blocks.is_empty() {
                vec![Node::paragraph(Vec::new())]
            } else {
                blocks
            }
        }
        NodeType::TableRow => return Err("table rows are edited with table.batchModify".into()),
        _ => {
            let blocks = parse_blocks(content, options).map_err(|e| e.to_string())?;
            if blocks.is_empty() {
                return Err("content is empty; use delete to remove a block".into());
            }
            let count = blocks.len();
            let parent = doc.node_at_mut(parent_path).ok_or("parent vanished")?;
            parent.content.splice(index..index + 1, blocks);
            tracker.removed(path);
            tracker.inserted(parent_path, index, count);
            return Ok(());
        }
    };
    doc.node_at_mut(path).ok_or("target vanished")?.content = replacement;
    Ok(())
}

fn insert(
    doc: &mut Node,
    path: &[usize],
    position: Placement,
    content: &str,
    tracker: &mut PathTracker,
    options: &MarkdownOptions,
) -> Result<(), String> {
    let (parent_path, index) = split_path(path)?;
    let target = doc.node_at(path).ok_or("target vanished")?;
    let blocks = parse_blocks(content, options).map_err(|e| e.to_string())?;
    if blocks.is_empty() {
        return Err("nothing to insert".into());
    }
    let new_nodes = match target.kind {
        NodeType::ListItem | NodeType::TaskItem => {
            let mut item = Node::block(target.kind, blocks);
            if target.kind == NodeType::TaskItem {
                item = item.with_attr("checked", false);
            }
            vec![item]
        }
        NodeType::TableRow | NodeType::TableCell | NodeType::TableHeader => {
            return Err("table structure is edited with table.batchModify".into())
        }
        kind if !path_is_block_container(doc, parent_path) => {
            return Err(format!("cannot insert next to a {kind}"))
        }
        _ => blocks,
    };
    let at = match position {
        Placement::Before => index,
        Placement::After => index + 1,
    };
    let count = new_nodes.len();
    let parent = doc.node_at_mut(parent_path).ok_or("parent vanished")?;
    parent.content.splice(at..at, new_nodes);
    tracker.inserted(parent_path, at, count);
    Ok(())
}

/// Whether the node at `path` holds arbitrary blocks (as opposed to items, rows or inline).
fn path_is_block_container(doc: &Node, path: &[usize]) -> bool {
    doc.node_at(path).is_some_and(|n| {
        matches!(
            n.kind,
            NodeType::Doc
                | NodeType::Blockquote
                | NodeType::ListItem
                | NodeType::TaskItem
                | NodeType::DetailsBlock
        )
    })
}

/// Remove the node at `path`, then any container left empty by it. Returns the removed node.
fn delete(doc: &mut Node, path: &[usize], tracker: &mut PathTracker) -> Result<Node, String> {
    let kind = doc.node_at(path).ok_or("target vanished")?.kind;
    if matches!(kind, NodeType::TableRow | NodeType::TableCell | NodeType::TableHeader) {
        return Err("table structure is edited with table.batchModify".into());
    }
    let (parent_path, index) = split_path(path)?;
    let parent = doc.node_at_mut(parent_path).ok_or("parent vanished")?;
    let removed = parent.content.remove(index);
    tracker.removed(path);

    let mut empty = parent_path.to_vec();
    while !empty.is_empty() && doc.node_at(&empty).is_some_and(|n| n.content.is_empty()) {
        let Some((&last, grand)) = empty.split_last() else { break };
        if let Some(container) = doc.node_at_mut(grand) {
            container.content.remove(last);
        }
        tracker.removed(&empty);
        empty.pop();
    }
    Ok(removed)
}

fn format(
    doc: &mut Node,
    path: &[usize],
    kind: MarkType,
    remove: bool,
    text: Option<&str>,
    href: Option<&str>,
) -> Result<(), String> {
    let mark = match (kind, href) {
        (MarkType::Link, Some(href)) => Mark::link(href, None),
        (MarkType::Link, None) if !remove => return Err("link marks need an href".into()),
        _ => Mark::new(kind),
    };
    let target = doc.node_at_mut(path).ok_or("target vanished")?;
    let mut touched = false;
    for_each_textblock(target, &mut |block| {
        if block.kind == NodeType::CodeBlock || block.kind == NodeType::MathBlock {
            return;
        }
        let haystack: Vec<char> = block.inline_text().chars().collect();
        let ranges: Vec<(usize, usize)> = match text {
            None if haystack.is_empty() => Vec::new(),
            None => vec![(0, haystack.len())],
            Some(needle) => find_all(&haystack, needle),
        };
        for (start, end) in ranges.into_iter().rev() {
            set_mark(&mut block.content, start, end, &mark, remove);
            touched = true;
        }
    });
    if touched {
        Ok(())
    } else {
        match text {
            Some(needle) => Err(format!("'{needle}' does not occur in the target")),
            None => Err("target has no formattable text".into()),
        }
    }
}

fn for_each_textblock(node: &mut Node, visit: &mut dyn FnMut(&mut Node)) {
    if node.kind.is_textblock() {
        visit(node);
        return;
    }
    for child in &mut node.content {
        for_each_textblock(child, visit);
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`, as character ranges.
pub(crate) fn find_all(haystack: &[char], needle: &str) -> Vec<(usize, usize)> {
    let needle: Vec<char> = needle.chars().collect();
    let mut out = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return out;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()] == needle[..] {
            out.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

fn move_block(
    doc: &mut Node,
    source: &[usize],
    destination: &[usize],
    position: Placement,
    tracker: &mut PathTracker,
) -> Result<(), String> {
    if destination.starts_with(source) {
        return Err("cannot move a block next to itself or into its own content".into());
    }
    let moving = doc.node_at(source).ok_or("target vanished")?;
    let anchor = doc.node_at(destination).ok_or("destination vanished")?;
    if moving.kind.is_list_item() != anchor.kind.is_list_item() {
        return Err(format!("cannot move a {} next to a {}", moving.kind, anchor.kind));
    }
    if matches!(moving.kind, NodeType::TableRow | NodeType::TableCell | NodeType::TableHeader) {
        return Err("table structure is edited with table.batchModify".into());
    }

    let (parent_path, index) = split_path(source)?;
    let parent = doc.node_at_mut(parent_path).ok_or("parent vanished")?;
    let node = parent.content.remove(index);
    let detached = tracker.removed(source);

    // The destination slot has been shifted by the removal; re-read it through the tracker.
    let mut destination = destination.to_vec();
    let depth = index_depth(source);
    if destination.len() > depth
        && destination[..depth] == source[..depth]
        && destination[depth] > source[depth]
    {
        destination[depth] -= 1;
    }
    let (dest_parent, dest_index) = split_path(&destination)?;
    let at = match position {
        Placement::Before => dest_index,
        Placement::After => dest_index + 1,
    };
    let container = doc.node_at_mut(dest_parent).ok_or("destination parent vanished")?;
    if at > container.content.len() {
        return Err("destination is out of range".into());
    }
    container.content.insert(at, node);
    tracker.inserted(dest_parent, at, 1);
    let mut new_path = dest_parent.to_vec();
    new_path.push(at);
    tracker.reattach(&new_path, detached);
    Ok(())
}

fn index_depth(path: &[usize]) -> usize {
    path.len() - 1
}

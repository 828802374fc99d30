//! Structural edits on the tree
//!
//! Block edits work on sibling ranges under a common parent. Inline edits work on the flat
//! inline content of a single textblock in character offsets, where every atom counts as one
//! character.

use super::pos::{resolve_boundary, textblock_at};
use super::{add_mark, normalize_inline, Mark, MarkType, Node};

/// Replace the blocks between two boundary positions with `blocks`.
pub fn replace_block_range(doc: &mut Node, from: usize, to: usize, blocks: Vec<Node>) -> Result<(), String> {
    let (parent_a, start) =
        resolve_boundary(doc, from).ok_or_else(|| format!("position {from} is not a block boundary"))?;
    let (parent_b, end) =
        resolve_boundary(doc, to).ok_or_else(|| format!("position {to} is not a block boundary"))?;
    if parent_a != parent_b || start > end {
        return Err(format!("range {from}..{to} does not cover sibling blocks"));
    }
    let parent = doc
        .node_at_mut(&parent_a)
        .ok_or_else(|| "range parent vanished".to_string())?;
    parent.content.splice(start..end, blocks);
    Ok(())
}

/// Replace the inline range `from..to` (positions inside one textblock) with plain text.
///
/// The inserted text takes the marks of the first replaced character, or of the character
/// before the range for pure insertions.
pub fn replace_inline_range(doc: &mut Node, from: usize, to: usize, text: &str) -> Result<(), String> {
    let (path_a, start) = textblock_at(doc, from)
        .ok_or_else(|| format!("position {from} is not inside a textblock"))?;
    let (path_b, end) =
        textblock_at(doc, to).ok_or_else(|| format!("position {to} is not inside a textblock"))?;
    if path_a != path_b || start > end {
        return Err(format!("range {from}..{to} spans more than one textblock"));
    }
    let block = doc
        .node_at_mut(&path_a)
        .ok_or_else(|| "textblock vanished".to_string())?;
    splice_text(&mut block.content, start, end, text);
    Ok(())
}

/// Split the text run containing character `offset`, returning the index of the first inline
/// node that starts at or after it.
pub fn split_at(content: &mut Vec<Node>, offset: usize) -> usize {
    let mut at = 0;
    for i in 0..content.len() {
        if at == offset {
            return i;
        }
        let size = content[i].node_size();
        if offset < at + size {
            let node = &mut content[i];
            let text = node.text.take().unwrap_or_default();
            let cut = text
                .char_indices()
                .nth(offset - at)
                .map_or(text.len(), |(b, _)| b);
            node.text = Some(text[..cut].to_string());
            let tail = Node::marked_text(&text[cut..], node.marks.clone());
            content.insert(i + 1, tail);
            return i + 1;
        }
        at += size;
    }
    content.len()
}

/// Marks in effect at character `offset` (the character at it, else the one before).
pub fn marks_at(content: &[Node], offset: usize) -> Vec<Mark> {
    let mut at = 0;
    let mut before: Option<&Node> = None;
    for node in content {
        let size = node.node_size();
        if offset < at + size {
            return node.marks.clone();
        }
        before = Some(node);
        at += size;
    }
    before.map(|n| n.marks.clone()).unwrap_or_default()
}

/// Replace characters `start..end` of an inline run with `text`.
pub fn splice_text(content: &mut Vec<Node>, start: usize, end: usize, text: &str) {
    let marks = if start < end {
        marks_at(content, start)
    } else {
        marks_at(content, start.saturating_sub(1))
    };
    let i = split_at(content, start);
    let j = split_at(content, end);
    let insert = if text.is_empty() {
        Vec::new()
    } else {
        vec![Node::marked_text(text, marks)]
    };
    content.splice(i..j, insert);
    normalize_inline(content);
}

/// Add or remove a mark over characters `start..end`.
pub fn set_mark(content: &mut Vec<Node>, start: usize, end: usize, mark: &Mark, remove: bool) {
    let i = split_at(content, start);
    let j = split_at(content, end);
    for node in &mut content[i..j] {
        if remove {
            node.marks.retain(|m| m.kind != mark.kind);
        } else if !(node.kind != super::NodeType::Text && mark.kind == MarkType::Code) {
            add_mark(&mut node.marks, mark.clone());
        }
    }
    normalize_inline(content);
}

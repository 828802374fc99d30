//! Paths, positions and changed ranges
//!
//! A path is the list of child indices from the document root down to a node. A position is an
//! integer offset in the flattened document (see the sizing rules in the module above). Paths are
//! what the engine edits with; positions are what suggestions and cursors are expressed in.

use super::Node;

/// Position just before the node at `path`.
pub fn pos_before(doc: &Node, path: &[usize]) -> Option<usize> {
    let mut pos = 0;
    let mut node = doc;
    for (depth, &index) in path.iter().enumerate() {
        if index > node.content.len() {
            return None;
        }
        pos += node.content[..index]
            .iter()
            .map(Node::node_size)
            .sum::<usize>();
        if depth + 1 < path.len() {
            node = node.content.get(index)?;
            pos += 1;
        }
    }
    Some(pos)
}

/// Start and end positions of the node at `path`.
pub fn node_range(doc: &Node, path: &[usize]) -> Option<(usize, usize)> {
    let node = doc.node_at(path)?;
    let start = pos_before(doc, path)?;
    Some((start, start + node.node_size()))
}

/// Range covering the siblings `start..end` under `parent`.
pub fn children_range(doc: &Node, parent: &[usize], start: usize, end: usize) -> Option<(usize, usize)> {
    let node = doc.node_at(parent)?;
    if start > end || end > node.content.len() {
        return None;
    }
    let mut child = parent.to_vec();
    child.push(start);
    let from = pos_before(doc, &child)?;
    let size: usize = node.content[start..end].iter().map(Node::node_size).sum();
    Some((from, from + size))
}

/// Resolve a position sitting between two block children to `(parent path, child index)`.
///
/// Returns `None` when the position falls inside a textblock or an atom.
pub fn resolve_boundary(doc: &Node, pos: usize) -> Option<(Vec<usize>, usize)> {
    let mut parent = doc;
    let mut path = Vec::new();
    let mut pos = pos;
    'descend: loop {
        let mut offset = 0;
        for (i, child) in parent.content.iter().enumerate() {
            if pos == offset {
                return Some((path, i));
            }
            let size = child.node_size();
            if pos < offset + size {
                if child.kind.is_atom() || child.kind.is_textblock() || child.is_text() {
                    return None;
                }
                path.push(i);
                pos -= offset + 1;
                parent = child;
                continue 'descend;
            }
            offset += size;
        }
        return (pos == offset).then_some((path, parent.content.len()));
    }
}

/// The textblock containing `pos` and the character offset of `pos` inside its content.
pub fn textblock_at(doc: &Node, pos: usize) -> Option<(Vec<usize>, usize)> {
    let mut parent = doc;
    let mut path = Vec::new();
    let mut pos = pos;
    'descend: loop {
        let mut offset = 0;
        for (i, child) in parent.content.iter().enumerate() {
            let size = child.node_size();
            if child.kind.is_textblock() && pos > offset && pos < offset + size {
                path.push(i);
                return Some((path, pos - offset - 1));
            }
            if !child.kind.is_atom() && !child.is_text() && pos > offset && pos < offset + size {
                path.push(i);
                pos -= offset + 1;
                parent = child;
                continue 'descend;
            }
            offset += size;
        }
        return None;
    }
}

/// Every textblock in document order with its path and content start position.
pub fn textblocks(doc: &Node) -> Vec<(Vec<usize>, usize, &Node)> {
    let mut out = Vec::new();
    doc.walk(&mut |node, path| {
        if node.kind.is_textblock() {
            if let Some(pos) = pos_before(doc, path) {
                out.push((path.to_vec(), pos + 1, node));
            }
        }
    });
    out
}

/// The region two documents differ in: `from` is shared, `old_to` and `new_to` are the ends
/// of the changed region in the old and new document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from: usize,
    pub old_to: usize,
    pub new_to: usize,
}

impl ChangedRange {
    /// Offset to apply to positions after the change.
    pub fn delta(&self) -> isize {
        self.new_to as isize - self.old_to as isize
    }
}

/// Smallest range covering every difference between `old` and `new`, or `None` if equal.
pub fn diff_range(old: &Node, new: &Node) -> Option<ChangedRange> {
    let from = find_diff_start(&old.content, &new.content, 0)?;
    let (mut old_to, mut new_to) =
        find_diff_end(&old.content, &new.content, old.content_size(), new.content_size())
            .unwrap_or((from, from));
    let lowest = old_to.min(new_to);
    if lowest < from {
        let overlap = from - lowest;
        old_to += overlap;
        new_to += overlap;
    }
    Some(ChangedRange {
        from,
        old_to,
        new_to,
    })
}

fn find_diff_start(a: &[Node], b: &[Node], mut pos: usize) -> Option<usize> {
    let mut i = 0;
    loop {
        if i == a.len() || i == b.len() {
            return (a.len() != b.len()).then_some(pos);
        }
        let (left, right) = (&a[i], &b[i]);
        if left == right {
            pos += left.node_size();
            i += 1;
            continue;
        }
        if !left.same_markup(right) {
            return Some(pos);
        }
        if left.is_text() {
            let shared = common_prefix(
                left.text.as_deref().unwrap_or(""),
                right.text.as_deref().unwrap_or(""),
            );
            return Some(pos + shared);
        }
        if let Some(found) = find_diff_start(&left.content, &right.content, pos + 1) {
            return Some(found);
        }
        pos += left.node_size();
        i += 1;
    }
}

fn find_diff_end(a: &[Node], b: &[Node], mut pos_a: usize, mut pos_b: usize) -> Option<(usize, usize)> {
    let (mut i, mut j) = (a.len(), b.len());
    loop {
        if i == 0 || j == 0 {
            return (i != j).then_some((pos_a, pos_b));
        }
        let (left, right) = (&a[i - 1], &b[j - 1]);
        let (size_a, size_b) = (left.node_size(), right.node_size());
        if left == right {
            i -= 1;
            j -= 1;
            pos_a -= size_a;
            pos_b -= size_b;
            continue;
        }
        if !left.same_markup(right) {
            return Some((pos_a, pos_b));
        }
        if left.is_text() {
            let shared = common_suffix(
                left.text.as_deref().unwrap_or(""),
                right.text.as_deref().unwrap_or(""),
            );
            return Some((pos_a - shared, pos_b - shared));
        }
        if let Some(found) = find_diff_end(&left.content, &right.content, pos_a - 1, pos_b - 1) {
            return Some(found);
        }
        i -= 1;
        j -= 1;
        pos_a -= size_a;
        pos_b -= size_b;
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Node, NodeType};

    fn sample() -> Node {
        // <p>ab</p><ul><li><p>cd</p></li></ul>
        Node::doc(vec![
            Node::paragraph(vec![Node::text("ab")]),
            Node::block(
                NodeType::BulletList,
                vec![Node::block(
                    NodeType::ListItem,
                    vec![Node::paragraph(vec![Node::text("cd")])],
                )],
            ),
        ])
    }

    #[test]
    fn pos_before_nested_paths() {
        let doc = sample();
        assert_eq!(pos_before(&doc, &[0]), Some(0));
        assert_eq!(pos_before(&doc, &[1]), Some(4));
        assert_eq!(pos_before(&doc, &[1, 0, 0]), Some(6));
        assert_eq!(node_range(&doc, &[1]), Some((4, 12)));
    }

    #[test]
    fn boundaries_and_textblocks_resolve() {
        let doc = sample();
        assert_eq!(resolve_boundary(&doc, 4), Some((vec![], 1)));
        assert_eq!(resolve_boundary(&doc, 12), Some((vec![], 2)));
        assert_eq!(resolve_boundary(&doc, 6), Some((vec![1, 0], 0)));
        assert_eq!(resolve_boundary(&doc, 2), None);
        assert_eq!(textblock_at(&doc, 2), Some((vec![0], 1)));
        assert_eq!(textblock_at(&doc, 8), Some((vec![1, 0, 0], 1)));
    }

    #[test]
    fn diff_range_finds_text_change() {
        let old = sample();
        let mut new = sample();
        new.content[0].content[0].text = Some("aXb".to_string());
        let range = diff_range(&old, &new).unwrap();
        assert_eq!(range.from, 2);
        assert_eq!(range.old_to, 2);
        assert_eq!(range.new_to, 3);
        assert_eq!(range.delta(), 1);
        assert!(diff_range(&old, &old.clone()).is_none());
    }
}

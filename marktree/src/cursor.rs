//! Cursor and selection coordinate mapping
//!
//!     Translates between tree positions and character offsets in the markdown the tree
//!     serializes to. Both directions are pure: the tree is serialized with a source map and the
//!     lookup interpolates between its anchors. Inputs outside the valid range are clamped to the
//!     nearest end instead of failing.
//!
//!     After an external change the old cursor offset is carried across the text edit with a
//!     character diff (see [`map_offset_through`]) before it is turned back into a position in
//!     the reparsed tree.

use crate::error::FormatError;
use crate::formats::markdown::serializer::{serialize, SourceMap};
use crate::formats::markdown::SerializeOptions;
use crate::tree::Node;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// A selection expressed as anchor and head tree positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(pos: usize) -> Self {
        Selection {
            anchor: pos,
            head: pos,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Bidirectional position/offset lookup for one tree snapshot.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    text: String,
    text_len: usize,
    doc_size: usize,
    map: SourceMap,
}

impl CoordinateMapper {
    pub fn new(doc: &Node, options: &SerializeOptions) -> Result<Self, FormatError> {
        let serialized = serialize(doc, options, true)?;
        Ok(CoordinateMapper {
            text_len: serialized.text.chars().count(),
            text: serialized.text,
            doc_size: doc.content_size(),
            map: serialized.source_map,
        })
    }

    /// The markdown the offsets refer to.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn to_offset(&self, pos: usize) -> usize {
        let pos = pos.min(self.doc_size);
        self.map.offset_of(pos).unwrap_or(0).min(self.text_len)
    }

    pub fn to_pos(&self, offset: usize) -> usize {
        let offset = offset.min(self.text_len);
        self.map.pos_of(offset).unwrap_or(0).min(self.doc_size)
    }

    pub fn selection_to_offsets(&self, selection: Selection) -> (usize, usize) {
        (self.to_offset(selection.anchor), self.to_offset(selection.head))
    }

    pub fn offsets_to_selection(&self, anchor: usize, head: usize) -> Selection {
        Selection {
            anchor: self.to_pos(anchor),
            head: self.to_pos(head),
        }
    }
}

/// Character offset in the markdown for a tree position.
pub fn tree_pos_to_offset(doc: &Node, pos: usize, options: &SerializeOptions) -> Result<usize, FormatError> {
    Ok(CoordinateMapper::new(doc, options)?.to_offset(pos))
}

/// Tree position for a character offset in the markdown.
pub fn offset_to_tree_pos(doc: &Node, offset: usize, options: &SerializeOptions) -> Result<usize, FormatError> {
    Ok(CoordinateMapper::new(doc, options)?.to_pos(offset))
}

/// Carry a character offset in `old` over to the matching offset in `new`.
///
/// Offsets inside a replaced span move to the start of its replacement; offsets in unchanged
/// text shift by whatever was inserted or deleted before them.
pub fn map_offset_through(old: &str, new: &str, offset: usize) -> usize {
    if old == new {
        return offset.min(new.chars().count());
    }
    let diff = TextDiff::from_chars(old, new);
    let mut old_at = 0;
    let mut new_at = 0;
    for change in diff.iter_all_changes() {
        let len = change.value().chars().count();
        match change.tag() {
            ChangeTag::Equal => {
                if offset < old_at + len {
                    return new_at + (offset - old_at);
                }
                old_at += len;
                new_at += len;
            }
            ChangeTag::Delete => {
                if offset < old_at + len {
                    return new_at;
                }
                old_at += len;
            }
            ChangeTag::Insert => new_at += len,
        }
    }
    new_at
}

//! Read-side queries over a document snapshot
//!
//!     Every query takes the tree as it is now, numbers its blocks with a fresh ID traversal
//!     (see [`crate::ids`]) and answers in terms of those IDs and tree positions. Nothing here
//!     mutates the tree or the revision.
//!
//!     Arguments arrive as JSON objects from the protocol layer, so each query has a
//!     `Deserialize` argument struct whose field names match the wire (camelCase).
//!
//!     Pagination is cursor based: the cursor is the ID of the last node a page returned. Because
//!     the traversal is deterministic, replaying a cursor against an unchanged tree yields the
//!     same next page; a cursor that no longer names a matching node is an `invalid_selector`.

pub mod digest;
pub mod section;
pub mod targets;

use crate::error::ProtocolError;
use crate::ids::{identify, IdentifiedNode};
use crate::tree::{MarkType, Node, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub use digest::{get_digest, Digest, OutlineEntry, SectionSummary};
pub use section::{find_section, get_section, HeadingSelector, Section, SectionArgs, SectionView};
pub use targets::{resolve_targets, Candidate, ResolveArgs, Resolution, TargetQuery};

/// Length of block previews in `listBlocks`.
pub const PREVIEW_CHARS: usize = 100;

/// Fields a projection may keep.
pub const AST_FIELDS: [&str; 9] = [
    "id", "type", "depth", "level", "text", "range", "attrs", "marks", "childCount",
];

/// One value or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        match self {
            OneOrMany::One(v) => v == value,
            OneOrMany::Many(vs) => vs.contains(value),
        }
    }
}

/// A `{from, to}` pair of tree positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub from: usize,
    pub to: usize,
}

/// Predicate over block nodes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeFilter {
    #[serde(rename = "type")]
    pub types: Option<OneOrMany<NodeType>>,
    pub level: Option<u8>,
    /// Case-insensitive substring of the node's text.
    pub contains: Option<String>,
    /// Matches when any inline descendant carries one of these marks.
    pub has_marks: Option<Vec<MarkType>>,
}

impl NodeFilter {
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&node.kind) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if node.level() != Some(level) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !node
                .text_content()
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(marks) = &self.has_marks {
            if !marks.is_empty() && !node.has_any_mark(marks) {
                return false;
            }
        }
        true
    }
}

/// A block as `getAst` reports it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AstNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    pub text: String,
    pub range: Range,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub attrs: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<MarkType>,
    pub child_count: usize,
}

impl AstNode {
    pub fn from_identified(node: &IdentifiedNode<'_>) -> Self {
        let marks: BTreeSet<MarkType> = collect_marks(node.node);
        AstNode {
            id: node.id.clone(),
            kind: node.node.kind,
            depth: node.depth,
            level: node.node.level(),
            text: node.node.text_content(),
            range: Range {
                from: node.pos,
                to: node.end(),
            },
            attrs: node
                .node
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            marks: marks.into_iter().collect(),
            child_count: node.node.content.len(),
        }
    }
}

fn collect_marks(node: &Node) -> BTreeSet<MarkType> {
    let mut out = BTreeSet::new();
    node.walk(&mut |n, _| out.extend(n.marks.iter().map(|m| m.kind)));
    out
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstArgs {
    #[serde(default)]
    pub filter: NodeFilter,
    pub projection: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub after_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AstPage {
    pub nodes: Vec<Value>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `structure.getAst`
pub fn get_ast(doc: &Node, args: &AstArgs, default_limit: usize) -> Result<AstPage, ProtocolError> {
    if let Some(fields) = &args.projection {
        if let Some(unknown) = fields.iter().find(|f| !AST_FIELDS.contains(&f.as_str())) {
            return Err(ProtocolError::invalid_selector(format!(
                "unknown projection field '{unknown}'"
            ))
            .with_details(serde_json::json!({ "allowed": AST_FIELDS })));
        }
    }
    let matching: Vec<IdentifiedNode<'_>> = identify(doc)
        .into_iter()
        .filter(|n| args.filter.matches(n.node))
        .collect();
    let limit = args.limit.unwrap_or(default_limit);
    let page = paginate(&matching, |n| n.id.as_str(), args.after_cursor.as_deref(), args.offset, limit)?;

    let mut nodes = Vec::with_capacity(page.items.len());
    for node in page.items {
        let value = serde_json::to_value(AstNode::from_identified(node))
            .map_err(|e| ProtocolError::invalid_operation(e.to_string()))?;
        nodes.push(project(value, args.projection.as_deref()));
    }
    Ok(AstPage {
        nodes,
        has_more: page.has_more,
        next_cursor: page.next_cursor,
    })
}

/// Keep only the projected keys of a JSON object. `id` always survives.
pub fn project(value: Value, fields: Option<&[String]>) -> Value {
    match (fields, value) {
        (Some(fields), Value::Object(mut map)) => {
            map.retain(|k, _| k == "id" || fields.iter().any(|f| f == k));
            Value::Object(map)
        }
        (_, value) => value,
    }
}

pub(crate) struct Page<'a, T> {
    pub items: &'a [T],
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Slice one page out of `items`, resuming after the item whose key is `after`.
pub(crate) fn paginate<'a, T>(
    items: &'a [T],
    key: impl Fn(&T) -> &str,
    after: Option<&str>,
    offset: Option<usize>,
    limit: usize,
) -> Result<Page<'a, T>, ProtocolError> {
    let mut start = match after {
        Some(cursor) => {
            let at = items.iter().position(|item| key(item) == cursor).ok_or_else(|| {
                ProtocolError::invalid_selector(format!("cursor '{cursor}' does not name a node in this result"))
                    .with_recovery("Restart pagination without afterCursor")
            })?;
            at + 1
        }
        None => 0,
    };
    start = (start + offset.unwrap_or(0)).min(items.len());
    let end = start.saturating_add(limit).min(items.len());
    let page = &items[start..end];
    let has_more = end < items.len();
    Ok(Page {
        items: page,
        has_more,
        next_cursor: if has_more {
            page.last().map(|item| key(item).to_string())
        } else {
            None
        },
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBlocksArgs {
    #[serde(default)]
    pub query: NodeFilter,
    pub limit: Option<usize>,
    pub after_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    pub preview: String,
    pub range: Range,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPage {
    pub blocks: Vec<BlockSummary>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `structure.listBlocks`: text-bearing blocks with short previews.
pub fn list_blocks(doc: &Node, args: &ListBlocksArgs, default_limit: usize) -> Result<BlockPage, ProtocolError> {
    let matching: Vec<IdentifiedNode<'_>> = identify(doc)
        .into_iter()
        .filter(|n| n.node.kind.is_textblock() && args.query.matches(n.node))
        .collect();
    let limit = args.limit.unwrap_or(default_limit);
    let page = paginate(&matching, |n| n.id.as_str(), args.after_cursor.as_deref(), None, limit)?;
    Ok(BlockPage {
        blocks: page
            .items
            .iter()
            .map(|n| BlockSummary {
                id: n.id.clone(),
                kind: n.node.kind,
                level: n.node.level(),
                preview: preview(&n.node.text_content(), PREVIEW_CHARS),
                range: Range {
                    from: n.pos,
                    to: n.end(),
                },
            })
            .collect(),
        has_more: page.has_more,
        next_cursor: page.next_cursor,
    })
}

/// First `max` characters on one line, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let mut cut: String = flat.chars().take(max).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::formats::markdown::{parse_markdown, MarkdownOptions};

    fn doc() -> Node {
        parse_markdown(
            "# Intro\n\nSome **bold** text.\n\n## Details\n\nplain one\n\nplain two\n",
            &MarkdownOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn filters_by_type_and_level() {
        let doc = doc();
        let args: AstArgs = serde_json::from_value(serde_json::json!({
            "filter": { "type": "heading", "level": 2 }
        }))
        .unwrap();
        let page = get_ast(&doc, &args, 50).unwrap();
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.nodes[0]["id"], "h-1");
        assert_eq!(page.nodes[0]["text"], "Details");
    }

    #[test]
    fn filters_by_marks_and_text() {
        let doc = doc();
        let args: AstArgs = serde_json::from_value(serde_json::json!({
            "filter": { "type": ["paragraph"], "hasMarks": ["bold"] }
        }))
        .unwrap();
        let page = get_ast(&doc, &args, 50).unwrap();
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.nodes[0]["marks"], serde_json::json!(["bold"]));

        let args: AstArgs =
            serde_json::from_value(serde_json::json!({ "filter": { "contains": "PLAIN" } })).unwrap();
        assert_eq!(get_ast(&doc, &args, 50).unwrap().nodes.len(), 2);
    }

    #[test]
    fn cursor_pagination_replays() {
        let doc = doc();
        let first = get_ast(&doc, &AstArgs { limit: Some(2), ..AstArgs::default() }, 50).unwrap();
        assert!(first.has_more);
        assert_eq!(first.next_cursor.as_deref(), Some("p-0"));
        let second = get_ast(
            &doc,
            &AstArgs {
                limit: Some(2),
                after_cursor: first.next_cursor.clone(),
                ..AstArgs::default()
            },
            50,
        )
        .unwrap();
        assert_eq!(second.nodes[0]["id"], "h-1");
        let again = get_ast(
            &doc,
            &AstArgs {
                limit: Some(2),
                after_cursor: first.next_cursor,
                ..AstArgs::default()
            },
            50,
        )
        .unwrap();
        assert_eq!(second.nodes, again.nodes);
    }

    #[test]
    fn unknown_cursor_is_invalid_selector() {
        let doc = doc();
        let err = get_ast(
            &doc,
            &AstArgs {
                after_cursor: Some("p-99".into()),
                ..AstArgs::default()
            },
            50,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSelector);
    }

    #[test]
    fn projection_keeps_id() {
        let doc = doc();
        let args = AstArgs {
            projection: Some(vec!["type".into()]),
            limit: Some(1),
            ..AstArgs::default()
        };
        let page = get_ast(&doc, &args, 50).unwrap();
        assert_eq!(page.nodes[0], serde_json::json!({ "id": "h-0", "type": "heading" }));

        let bad = AstArgs {
            projection: Some(vec!["colour".into()]),
            ..AstArgs::default()
        };
        assert_eq!(get_ast(&doc, &bad, 50).unwrap_err().code, ErrorCode::InvalidSelector);
    }

    #[test]
    fn list_blocks_previews() {
        let long = format!("{}\n", "x".repeat(150));
        let doc = parse_markdown(&long, &MarkdownOptions::default()).unwrap();
        let page = list_blocks(&doc, &ListBlocksArgs::default(), 50).unwrap();
        assert_eq!(page.blocks.len(), 1);
        assert_eq!(page.blocks[0].preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(page.blocks[0].preview.ends_with('…'));
    }
}

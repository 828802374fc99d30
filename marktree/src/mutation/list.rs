//! `list.batchModify`

use super::{begin, finish, resolve_enclosing, MutationHeader, MutationOutcome, Target};
use crate::error::ProtocolError;
use crate::formats::markdown::{parse_blocks, MarkdownOptions};
use crate::session::DocumentSession;
use crate::tree::{Node, NodeType};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Ordered,
    Task,
}

impl ListKind {
    fn node_type(self) -> NodeType {
        match self {
            ListKind::Bullet => NodeType::BulletList,
            ListKind::Ordered => NodeType::OrderedList,
            ListKind::Task => NodeType::TaskList,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ListOp {
    AddItem {
        /// Position of the new item (default: after the last one).
        index: Option<usize>,
        content: String,
        checked: Option<bool>,
    },
    DeleteItem { index: usize },
    UpdateItem { index: usize, content: String },
    /// Flip a task item, or set it when `checked` is given.
    ToggleCheck { index: usize, checked: Option<bool> },
    /// New order as a permutation of the current item indices.
    Reorder { order: Vec<usize> },
    SetType {
        #[serde(rename = "listType")]
        list_type: ListKind,
    },
}

impl ListOp {
    fn name(&self) -> &'static str {
        match self {
            ListOp::AddItem { .. } => "add_item",
            ListOp::DeleteItem { .. } => "delete_item",
            ListOp::UpdateItem { .. } => "update_item",
            ListOp::ToggleCheck { .. } => "toggle_check",
            ListOp::Reorder { .. } => "reorder",
            ListOp::SetType { .. } => "set_type",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModifyArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    /// The list, or any node inside it. Nested lists resolve to the innermost one.
    pub list: Target,
    pub operations: Vec<ListOp>,
}

/// `list.batchModify`
pub fn modify_list(session: &mut DocumentSession, args: &ListModifyArgs) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    let path = resolve_enclosing(session.doc(), &args.list, "list", |n| n.kind.is_list())?;
    let options = session.settings().markdown.clone();

    let mut doc = session.doc().clone();
    let Some(list) = doc.node_at_mut(&path) else {
        return Err(ProtocolError::not_found("list vanished while resolving"));
    };
    let mut warnings = Vec::new();
    for (i, op) in args.operations.iter().enumerate() {
        if let Err(message) = apply(list, op, &options) {
            warnings.push(format!("operations[{i}] ({}): {message}", op.name()));
        }
    }
    finish(session, mode, doc, warnings)
}

fn item_content(content: &str, options: &MarkdownOptions) -> Result<Vec<Node>, String> {
    let blocks = parse_blocks(content, options).map_err(|e| e.to_string())?;
    Ok(if blocks.is_empty() {
        vec![Node::paragraph(Vec::new())]
    } else {
        blocks
    })
}

fn out_of_range(index: usize, list: &Node) -> String {
    format!("item {index} is out of range (list has {} items)", list.content.len())
}

fn apply(list: &mut Node, op: &ListOp, options: &MarkdownOptions) -> Result<(), String> {
    let len = list.content.len();
    match op {
        ListOp::AddItem { index, content, checked } => {
            let at = index.unwrap_or(len);
            if at > len {
                return Err(out_of_range(at, list));
            }
            let content = item_content(content, options)?;
            let item = if list.kind == NodeType::TaskList {
                Node::block(NodeType::TaskItem, content).with_attr("checked", checked.unwrap_or(false))
            } else {
                if checked.is_some() {
                    return Err("only task list items can be checked".into());
                }
                Node::block(NodeType::ListItem, content)
            };
            list.content.insert(at, item);
        }
        ListOp::DeleteItem { index } => {
            if *index >= len {
                return Err(out_of_range(*index, list));
            }
            if len == 1 {
                return Err("the last item cannot be deleted; delete the list instead".into());
            }
            list.content.remove(*index);
        }
        ListOp::UpdateItem { index, content } => {
            let content = item_content(content, options)?;
            let item = list.content.get_mut(*index).ok_or_else(|| format!("item {index} is out of range"))?;
            item.content = content;
        }
        ListOp::ToggleCheck { index, checked } => {
            if list.kind != NodeType::TaskList {
                return Err(format!("{} items have no checkbox", list.kind));
            }
            let item = list.content.get_mut(*index).ok_or_else(|| format!("item {index} is out of range"))?;
            let next = checked.unwrap_or(item.attr_bool("checked") != Some(true));
            item.attrs.insert("checked".into(), next.into());
        }
        ListOp::Reorder { order } => {
            let mut seen = vec![false; len];
            let valid = order.len() == len
                && order
                    .iter()
                    .all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
            if !valid {
                return Err(format!("order must be a permutation of 0..{len}"));
            }
            let items = std::mem::take(&mut list.content);
            let mut slots: Vec<Option<Node>> = items.into_iter().map(Some).collect();
            list.content = order.iter().filter_map(|&i| slots[i].take()).collect();
        }
        ListOp::SetType { list_type } => set_type(list, *list_type),
    }
    Ok(())
}

/// Convert a list between bullet, ordered and task form, adjusting items and list attributes.
fn set_type(list: &mut Node, kind: ListKind) {
    let target = kind.node_type();
    if list.kind == target {
        return;
    }
    for item in &mut list.content {
        if target == NodeType::TaskList {
            item.kind = NodeType::TaskItem;
            item.attrs.entry("checked".into()).or_insert(false.into());
        } else {
            item.kind = NodeType::ListItem;
            item.attrs.remove("checked");
        }
    }
    if target == NodeType::OrderedList {
        list.attrs.remove("bullet");
        list.attrs.entry("start".into()).or_insert(1u64.into());
    } else {
        list.attrs.remove("start");
        list.attrs.remove("delimiter");
    }
    list.kind = target;
}

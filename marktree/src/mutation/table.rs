//! `table.batchModify`
//!
//! Row indices count the header row as row 0. Column alignment is stored on every cell of the
//! column, the way the parser reads it.

use super::{begin, finish, resolve_enclosing, MutationHeader, MutationOutcome, Target};
use crate::error::ProtocolError;
use crate::formats::markdown::{parse_inline, MarkdownOptions};
use crate::session::DocumentSession;
use crate::tree::{Node, NodeType};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    None,
}

impl Alignment {
    fn attr(self) -> Option<&'static str> {
        match self {
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
            Alignment::None => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TableOp {
    /// Insert a body row at `index` (default: after the last row).
    AddRow {
        index: Option<usize>,
        #[serde(default)]
        cells: Vec<String>,
    },
    DeleteRow { index: usize },
    AddColumn {
        index: Option<usize>,
        #[serde(default)]
        header: String,
        #[serde(default)]
        cells: Vec<String>,
        align: Option<Alignment>,
    },
    DeleteColumn { index: usize },
    UpdateCell { row: usize, column: usize, content: String },
    SetAlignment { column: usize, align: Alignment },
}

impl TableOp {
    fn name(&self) -> &'static str {
        match self {
            TableOp::AddRow { .. } => "add_row",
            TableOp::DeleteRow { .. } => "delete_row",
            TableOp::AddColumn { .. } => "add_column",
            TableOp::DeleteColumn { .. } => "delete_column",
            TableOp::UpdateCell { .. } => "update_cell",
            TableOp::SetAlignment { .. } => "set_alignment",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableModifyArgs {
    #[serde(flatten)]
    pub header: MutationHeader,
    /// The table, or any node inside it.
    pub table: Target,
    pub operations: Vec<TableOp>,
}

/// `table.batchModify`
pub fn modify_table(session: &mut DocumentSession, args: &TableModifyArgs) -> Result<MutationOutcome, ProtocolError> {
    let mode = begin(session, &args.header)?;
    let path = resolve_enclosing(session.doc(), &args.table, "table", |n| n.kind == NodeType::Table)?;
    let options = session.settings().markdown.clone();

    let mut doc = session.doc().clone();
    let Some(table) = doc.node_at_mut(&path) else {
        return Err(ProtocolError::not_found("table vanished while resolving"));
    };
    let mut warnings = Vec::new();
    for (i, op) in args.operations.iter().enumerate() {
        if let Err(message) = apply(table, op, &options) {
            warnings.push(format!("operations[{i}] ({}): {message}", op.name()));
        }
    }
    finish(session, mode, doc, warnings)
}

fn column_count(table: &Node) -> usize {
    table.content.iter().map(|row| row.content.len()).max().unwrap_or(0)
}

fn column_align(table: &Node, column: usize) -> Option<String> {
    table
        .content
        .iter()
        .find_map(|row| row.content.get(column).and_then(|c| c.attr_str("align")))
        .map(str::to_string)
}

fn cell(kind: NodeType, content: &str, align: Option<&str>, options: &MarkdownOptions) -> Result<Node, String> {
    let inline = parse_inline(content, options).map_err(|e| e.to_string())?;
    let mut node = Node::block(kind, vec![Node::paragraph(inline)]);
    if let Some(align) = align {
        node = node.with_attr("align", align);
    }
    Ok(node)
}

fn apply(table: &mut Node, op: &TableOp, options: &MarkdownOptions) -> Result<(), String> {
    let rows = table.content.len();
    let columns = column_count(table);
    match op {
        TableOp::AddRow { index, cells } => {
            let at = index.unwrap_or(rows);
            if at == 0 {
                return Err("rows cannot be inserted above the header".into());
            }
            if at > rows {
                return Err(format!("row {at} is out of range (table has {rows} rows)"));
            }
            if cells.len() > columns {
                return Err(format!("{} cells given for {columns} columns", cells.len()));
            }
            let mut row = Vec::with_capacity(columns);
            for c in 0..columns {
                let text = cells.get(c).map_or("", String::as_str);
                row.push(cell(NodeType::TableCell, text, column_align(table, c).as_deref(), options)?);
            }
            table.content.insert(at, Node::block(NodeType::TableRow, row));
        }
        TableOp::DeleteRow { index } => {
            if *index == 0 {
                return Err("the header row cannot be deleted".into());
            }
            if *index >= rows {
                return Err(format!("row {index} is out of range (table has {rows} rows)"));
            }
            table.content.remove(*index);
        }
        TableOp::AddColumn {
            index,
            header,
            cells,
            align,
        } => {
            let at = index.unwrap_or(columns);
            if at > columns {
                return Err(format!("column {at} is out of range (table has {columns} columns)"));
            }
            let align = align.and_then(Alignment::attr);
            for (r, row) in table.content.iter_mut().enumerate() {
                let (kind, text) = if r == 0 {
                    (NodeType::TableHeader, header.as_str())
                } else {
                    (NodeType::TableCell, cells.get(r - 1).map_or("", String::as_str))
                };
                let at = at.min(row.content.len());
                row.content.insert(at, cell(kind, text, align, options)?);
            }
        }
        TableOp::DeleteColumn { index } => {
            if *index >= columns {
                return Err(format!("column {index} is out of range (table has {columns} columns)"));
            }
            if columns == 1 {
                return Err("the last column cannot be deleted".into());
            }
            for row in &mut table.content {
                if *index < row.content.len() {
                    row.content.remove(*index);
                }
            }
        }
        TableOp::UpdateCell { row, column, content } => {
            let kind = if *row == 0 {
                NodeType::TableHeader
            } else {
                NodeType::TableCell
            };
            let align = column_align(table, *column);
            let target = table
                .content
                .get_mut(*row)
                .and_then(|r| r.content.get_mut(*column))
                .ok_or_else(|| format!("cell ({row}, {column}) is out of range"))?;
            *target = cell(kind, content, align.as_deref(), options)?;
        }
        TableOp::SetAlignment { column, align } => {
            if *column >= columns {
                return Err(format!("column {column} is out of range (table has {columns} columns)"));
            }
            for row in &mut table.content {
                if let Some(cell) = row.content.get_mut(*column) {
                    match align.attr() {
                        Some(value) => {
                            cell.attrs.insert("align".into(), value.into());
                        }
                        None => {
                            cell.attrs.remove("align");
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::session::SessionSettings;
    use serde_json::json;

    const TABLE: &str = "| a | b |\n| --- | --- |\n| 1 | 2 |\n";

    fn session(text: &str) -> DocumentSession {
        DocumentSession::load(text, SessionSettings::default()).unwrap()
    }

    fn modify(ops: serde_json::Value) -> TableModifyArgs {
        serde_json::from_value(json!({
            "baseRevision": "r1",
            "table": "table-0",
            "operations": ops,
        }))
        .unwrap()
    }

    #[test]
    fn rows_and_columns() {
        let mut s = session(TABLE);
        let outcome = modify_table(
            &mut s,
            &modify(json!([
                { "op": "add_row", "cells": ["3", "4"] },
                { "op": "add_column", "header": "c", "cells": ["x", "y"], "align": "right" },
                { "op": "update_cell", "row": 1, "column": 0, "content": "**one**" },
            ])),
        )
        .unwrap();
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(
            s.content().unwrap(),
            "| a | b | c |\n| --- | --- | --: |\n| **one** | 2 | x |\n| 3 | 4 | y |\n"
        );
    }

    #[test]
    fn bad_operations_become_warnings_and_the_rest_applies() {
        let mut s = session(TABLE);
        let outcome = modify_table(
            &mut s,
            &modify(json!([
                { "op": "delete_row", "index": 0 },
                { "op": "delete_row", "index": 7 },
                { "op": "set_alignment", "column": 0, "align": "center" },
            ])),
        )
        .unwrap();
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[0].starts_with("operations[0] (delete_row)"));
        assert!(outcome.applied);
        assert_eq!(s.content().unwrap(), "| a | b |\n| :-: | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn last_column_stays() {
        let mut s = session("| a |\n| --- |\n| 1 |\n");
        let outcome = modify_table(&mut s, &modify(json!([{ "op": "delete_column", "index": 0 }]))).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(!outcome.applied);
        assert_eq!(s.revision().to_string(), "r1");
    }

    #[test]
    fn cell_targets_resolve_to_their_table() {
        let mut s = session(TABLE);
        let args: TableModifyArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "table": "td-1",
            "operations": [{ "op": "delete_column", "index": 1 }],
        }))
        .unwrap();
        modify_table(&mut s, &args).unwrap();
        assert_eq!(s.content().unwrap(), "| a |\n| --- |\n| 1 |\n");
    }

    #[test]
    fn non_table_target_is_not_found() {
        let mut s = session("text\n");
        let args: TableModifyArgs = serde_json::from_value(json!({
            "baseRevision": "r1",
            "table": "p-0",
            "operations": [],
        }))
        .unwrap();
        assert_eq!(modify_table(&mut s, &args).unwrap_err().code, ErrorCode::NotFound);
    }
}

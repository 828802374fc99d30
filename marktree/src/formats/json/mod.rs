//! JSON document tree format
//!
//! The document tree written out as JSON, in the same shape the query engine and the protocol
//! return it: `{"type": "doc", "content": [...]}` with `attrs`, `marks` and `text` present only
//! when non-empty.

use crate::error::FormatError;
use crate::format::Format;
use crate::tree::{Node, NodeType};
use std::collections::HashMap;

#[derive(Default)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Document tree as JSON"
    }

    fn file_extensions(&self) -> &[&str] {
        &["json"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn parse(&self, source: &str) -> Result<Node, FormatError> {
        let node: Node =
            serde_json::from_str(source).map_err(|e| FormatError::ParseError(e.to_string()))?;
        if node.kind != NodeType::Doc {
            return Err(FormatError::ParseError(format!(
                "expected a 'doc' root, found '{}'",
                node.kind
            )));
        }
        Ok(node)
    }

    fn serialize(&self, doc: &Node) -> Result<String, FormatError> {
        serde_json::to_string_pretty(doc).map_err(|e| FormatError::SerializationError(e.to_string()))
    }

    fn serialize_with_options(
        &self,
        doc: &Node,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        match options.get("compact").map(String::as_str) {
            Some("true") if options.len() == 1 => serde_json::to_string(doc)
                .map_err(|e| FormatError::SerializationError(e.to_string())),
            None if options.is_empty() => self.serialize(doc),
            _ => Err(FormatError::NotSupported(
                "json accepts only 'compact=true'".to_string(),
            )),
        }
    }
}

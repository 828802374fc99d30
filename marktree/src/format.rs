//! The [`Format`] trait: one text representation of the document tree.
//!
//! Markdown is the only format that round-trips. JSON exposes the tree itself and treeviz is a
//! write-only debugging view, so most methods have refusing defaults.

use crate::error::FormatError;
use crate::tree::Node;
use std::collections::HashMap;

fn unsupported(format: &str, what: &str) -> FormatError {
    FormatError::NotSupported(format!("{format} does not support {what}"))
}

pub trait Format: Send + Sync {
    /// Registry key, also accepted by `--from`/`--to`.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Extensions (no dot) that select this format for a path.
    fn file_extensions(&self) -> &[&str] {
        &[]
    }

    fn supports_parsing(&self) -> bool {
        false
    }

    fn supports_serialization(&self) -> bool {
        false
    }

    fn parse(&self, _source: &str) -> Result<Node, FormatError> {
        Err(unsupported(self.name(), "parsing"))
    }

    fn serialize(&self, _doc: &Node) -> Result<String, FormatError> {
        Err(unsupported(self.name(), "serialization"))
    }

    /// Serialize with `key=value` overrides. Formats without overrides refuse any.
    fn serialize_with_options(
        &self,
        doc: &Node,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        match options.keys().next() {
            None => self.serialize(doc),
            Some(key) => Err(unsupported(self.name(), &format!("the option '{key}'"))),
        }
    }
}

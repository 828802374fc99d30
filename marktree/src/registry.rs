//! Name and extension lookup over the available [`Format`]s.

use crate::error::FormatError;
use crate::format::Format;
use crate::formats::markdown::{MarkdownFormat, MarkdownOptions};
use crate::formats::{JsonFormat, TreevizFormat};
use crate::tree::Node;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Formats keyed by name. Registering a name twice replaces the earlier format.
pub struct FormatRegistry {
    formats: BTreeMap<String, Box<dyn Format>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry {
            formats: BTreeMap::new(),
        }
    }

    /// Markdown (configured by `options`), JSON and treeviz.
    pub fn with_markdown_options(options: MarkdownOptions) -> Self {
        let mut registry = Self::new();
        registry.register(MarkdownFormat::new(options));
        registry.register(JsonFormat);
        registry.register(TreevizFormat);
        registry
    }

    pub fn with_defaults() -> Self {
        Self::with_markdown_options(MarkdownOptions::default())
    }

    pub fn register<F: Format + 'static>(&mut self, format: F) {
        self.formats.insert(format.name().to_string(), Box::new(format));
    }

    pub fn get(&self, name: &str) -> Result<&dyn Format, FormatError> {
        match self.formats.get(name) {
            Some(format) => Ok(format.as_ref()),
            None => Err(FormatError::FormatNotFound(name.to_string())),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list_formats(&self) -> Vec<String> {
        self.formats.keys().cloned().collect()
    }

    /// The format whose extensions include the extension of `filename`.
    pub fn detect_format_from_filename(&self, filename: &str) -> Option<String> {
        let extension = Path::new(filename).extension()?.to_str()?;
        self.formats
            .values()
            .find(|format| format.file_extensions().contains(&extension))
            .map(|format| format.name().to_string())
    }

    pub fn parse(&self, source: &str, format: &str) -> Result<Node, FormatError> {
        let found = self.get(format)?;
        if !found.supports_parsing() {
            return Err(FormatError::NotSupported(format!("{format} cannot be read")));
        }
        found.parse(source)
    }

    pub fn serialize(&self, doc: &Node, format: &str) -> Result<String, FormatError> {
        self.serialize_with_options(doc, format, &HashMap::new())
    }

    pub fn serialize_with_options(
        &self,
        doc: &Node,
        format: &str,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        let found = self.get(format)?;
        if !found.supports_serialization() {
            return Err(FormatError::NotSupported(format!("{format} cannot be written")));
        }
        found.serialize_with_options(doc, options)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

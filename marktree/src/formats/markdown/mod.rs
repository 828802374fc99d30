//! Markdown format implementation
//!
//! This module implements bidirectional conversion between markdown text and the document tree.
//!
//! # Library Choice
//!
//! We use the `comrak` crate for markdown parsing. It gives us CommonMark + GFM block structure
//! and the inline extensions we need (tables, task lists, strikethrough, superscript, dollar
//! math, wiki links, front matter). The serializer is hand-written: the editor needs control over
//! hard-break style, line endings, escaping and the editor-only constructs (highlight, underline,
//! subscript, details blocks), none of which comrak's formatter exposes.
//!
//! # Element Mapping Table
//!
//! | Tree node / mark   | Markdown                          | Notes                                      |
//! |--------------------|-----------------------------------|--------------------------------------------|
//! | heading            | `#` .. `######`                   | setext headings are written back as ATX    |
//! | paragraph          | paragraph                         |                                            |
//! | codeBlock          | fenced code (```` ``` ```` / `~~~`) | indented code is written back fenced     |
//! | mathBlock          | `$$ ... $$`                       | also from ```` ```math ```` fences          |
//! | blockquote         | `> `                              |                                            |
//! | bulletList         | `-` / `*` / `+`                   | bullet char and tightness preserved        |
//! | orderedList        | `1.` / `1)`                       | start number and delimiter preserved       |
//! | taskList           | `- [ ]` / `- [x]`                 | only when every item is a task item        |
//! | table              | GFM pipe table                    | first row is the header row                |
//! | horizontalRule     | `---`                             |                                            |
//! | detailsBlock       | `<details><summary>`              | summary inline markdown is parsed          |
//! | rawBlock           | HTML block / front matter         | kept verbatim                              |
//! | image              | `![alt](src "title")`             |                                            |
//! | hardBreak          | `\` or two trailing spaces        | per resolved style; soft when preserved    |
//! | mathInline         | `$...$`                           |                                            |
//! | bold / italic      | `**` / `*`                        | `__` / `_` when adjacent to another `*`    |
//! | strike / subscript | `~~` / `~`                        | double tilde wins over single              |
//! | superscript        | `^`                               | `<sup>` also accepted                      |
//! | highlight          | `==`                              | `<mark>` also accepted                     |
//! | underline          | `<u>`                             |                                            |
//! | link               | `[text](href "title")`, `[[t|a]]` | `<href>` when the text is the href         |
//!
//! # Lossy Conversions
//!
//! - Reference-style links and link definitions become inline links.
//! - Link titles are always written with double quotes.
//! - Character entities are decoded on input and written as literal characters.
//! - Without `preserve_line_breaks`, soft line breaks become spaces (or nothing between CJK).

pub mod cjk;
pub mod detect;
mod escape;
mod inline;
pub mod parser;
pub mod serializer;

use crate::error::FormatError;
use crate::format::Format;
use crate::tree::{Node, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use detect::detect_style;
pub use serializer::{SourceMap, Serialized};

/// Line-ending convention found in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    Crlf,
    #[default]
    Unknown,
}

/// Hard-break style found in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HardBreakStyle {
    Backslash,
    TwoSpaces,
    Mixed,
    #[default]
    Unknown,
}

/// What the detector reports about a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStyle {
    pub line_ending: LineEnding,
    pub hard_break_style: HardBreakStyle,
}

/// A concrete way of writing a hard break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakStyle {
    #[default]
    Backslash,
    TwoSpaces,
}

/// How hard breaks are written on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardBreakPolicy {
    #[default]
    Preserve,
    Backslash,
    TwoSpaces,
}

/// How line endings are written on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineEndingPolicy {
    #[default]
    Preserve,
    Lf,
    Crlf,
}

/// Settings consumed by the parser and serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownOptions {
    /// Keep single newlines inside paragraphs as soft hard-breaks.
    pub preserve_line_breaks: bool,
    pub hard_break_on_save: HardBreakPolicy,
    /// Used when the source style is `mixed` or `unknown`.
    pub default_hard_break: BreakStyle,
    pub line_ending_on_save: LineEndingPolicy,
    /// Join soft-broken lines without a space between two CJK characters.
    pub cjk_soft_break_join: bool,
    pub max_nesting_depth: usize,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        MarkdownOptions {
            preserve_line_breaks: false,
            hard_break_on_save: HardBreakPolicy::Preserve,
            default_hard_break: BreakStyle::Backslash,
            line_ending_on_save: LineEndingPolicy::Preserve,
            cjk_soft_break_join: true,
            max_nesting_depth: 64,
        }
    }
}

impl MarkdownOptions {
    /// Resolve the save policies against what was detected in the source.
    pub fn serialize_options(&self, source: &SourceStyle) -> SerializeOptions {
        let hard_break = match self.hard_break_on_save {
            HardBreakPolicy::Backslash => BreakStyle::Backslash,
            HardBreakPolicy::TwoSpaces => BreakStyle::TwoSpaces,
            HardBreakPolicy::Preserve => match source.hard_break_style {
                HardBreakStyle::Backslash => BreakStyle::Backslash,
                HardBreakStyle::TwoSpaces => BreakStyle::TwoSpaces,
                HardBreakStyle::Mixed | HardBreakStyle::Unknown => self.default_hard_break,
            },
        };
        let crlf = match self.line_ending_on_save {
            LineEndingPolicy::Lf => false,
            LineEndingPolicy::Crlf => true,
            LineEndingPolicy::Preserve => source.line_ending == LineEnding::Crlf,
        };
        SerializeOptions {
            hard_break,
            crlf,
            preserve_line_breaks: self.preserve_line_breaks,
        }
    }
}

/// Fully resolved serializer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    pub hard_break: BreakStyle,
    pub crlf: bool,
    pub preserve_line_breaks: bool,
}

/// Parse a markdown document into a tree.
pub fn parse_markdown(source: &str, options: &MarkdownOptions) -> Result<Node, FormatError> {
    parser::parse_markdown(source, options)
}

/// Serialize a tree into markdown.
pub fn serialize_markdown(doc: &Node, options: &SerializeOptions) -> Result<String, FormatError> {
    serializer::serialize(doc, options, false).map(|s| s.text)
}

/// Parse markdown into a list of blocks, for content supplied by mutation calls.
pub fn parse_blocks(source: &str, options: &MarkdownOptions) -> Result<Vec<Node>, FormatError> {
    Ok(parser::parse_markdown(source, options)?.content)
}

/// Parse markdown as inline content. Block syntax is unwrapped to the first textblock.
pub fn parse_inline(source: &str, options: &MarkdownOptions) -> Result<Vec<Node>, FormatError> {
    let doc = parser::parse_markdown(source, options)?;
    let mut first = None;
    doc.walk(&mut |node, _| {
        if first.is_none() && node.kind.is_textblock() && node.kind != NodeType::CodeBlock {
            first = Some(node.content.clone());
        }
    });
    Ok(first.unwrap_or_default())
}

/// Serialize a list of blocks without the trailing newline.
pub fn serialize_blocks(blocks: &[Node], options: &SerializeOptions) -> Result<String, FormatError> {
    let doc = Node::doc(blocks.to_vec());
    let text = serialize_markdown(&doc, options)?;
    Ok(text.trim_end_matches(['\n', '\r']).to_string())
}

/// Format implementation for Markdown
#[derive(Default)]
pub struct MarkdownFormat {
    pub options: MarkdownOptions,
}

impl MarkdownFormat {
    pub fn new(options: MarkdownOptions) -> Self {
        MarkdownFormat { options }
    }
}

impl Format for MarkdownFormat {
    fn name(&self) -> &str {
        "markdown"
    }

    fn description(&self) -> &str {
        "CommonMark + GFM markdown with editor extensions"
    }

    fn file_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn parse(&self, source: &str) -> Result<Node, FormatError> {
        parse_markdown(source, &self.options)
    }

    fn serialize(&self, doc: &Node) -> Result<String, FormatError> {
        let options = self.options.serialize_options(&SourceStyle::default());
        serialize_markdown(doc, &options)
    }

    fn serialize_with_options(
        &self,
        doc: &Node,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        let mut resolved = self.options.serialize_options(&SourceStyle::default());
        for (key, value) in options {
            match (key.as_str(), value.as_str()) {
                ("hard-break-style", "backslash") => resolved.hard_break = BreakStyle::Backslash,
                ("hard-break-style", "two-spaces") => resolved.hard_break = BreakStyle::TwoSpaces,
                ("line-ending", "lf") => resolved.crlf = false,
                ("line-ending", "crlf") => resolved.crlf = true,
                _ => {
                    return Err(FormatError::NotSupported(format!(
                        "markdown option '{key}={value}'"
                    )))
                }
            }
        }
        serialize_markdown(doc, &resolved)
    }
}

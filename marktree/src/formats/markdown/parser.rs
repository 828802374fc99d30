//! Markdown parsing (markdown text → document tree)
//!
//! Pipeline: markdown string → comrak AST → document tree.
//!
//! comrak does the CommonMark/GFM work. On top of its AST this module recognizes the editor's
//! own block constructs (`<details>` blocks, display math paragraphs, `math` fences) and hands
//! inline content to [`super::inline`], which layers highlight, underline and html-tag marks
//! onto comrak's inline nodes.

use super::MarkdownOptions;
use crate::error::FormatError;
use crate::tree::{Node, NodeType};
use comrak::nodes::{AstNode, ListDelimType, ListType, NodeValue, TableAlignment};
use comrak::{parse_document, Arena, ComrakOptions};
use std::time::Instant;
use tracing::debug;

/// Parse markdown into a document tree.
pub fn parse_markdown(source: &str, options: &MarkdownOptions) -> Result<Node, FormatError> {
    let started = Instant::now();
    let normalized = normalize_source(source);

    let arena = Arena::new();
    let comrak_options = default_comrak_options();
    let root = parse_document(&arena, &normalized, &comrak_options);

    let depth = max_depth(root);
    if depth > options.max_nesting_depth {
        return Err(FormatError::ParseError(format!(
            "nesting depth {depth} exceeds the limit of {}",
            options.max_nesting_depth
        )));
    }

    let converter = Converter::new(&normalized, options);
    let children: Vec<_> = root.children().collect();
    let content = converter.block_list(&children)?;

    debug!(
        bytes = source.len(),
        blocks = content.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "parsed markdown"
    );
    Ok(Node::doc(content))
}

pub(super) fn default_comrak_options() -> ComrakOptions<'static> {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options.extension.superscript = true;
    options.extension.math_dollars = true;
    options.extension.wikilinks_title_after_pipe = true;
    options.extension.front_matter_delimiter = Some("---".to_string());
    options
}

/// Strip a byte-order mark and normalize every line ending to LF.
fn normalize_source(source: &str) -> String {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    if source.contains('\r') {
        source.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        source.to_string()
    }
}

fn max_depth<'a>(root: &'a AstNode<'a>) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        for child in node.children() {
            stack.push((child, depth + 1));
        }
    }
    deepest
}

/// Walks a comrak AST and builds tree nodes.
pub(super) struct Converter<'s> {
    pub(super) options: &'s MarkdownOptions,
    pub(super) lines: Vec<&'s str>,
}

impl<'s> Converter<'s> {
    fn new(source: &'s str, options: &'s MarkdownOptions) -> Self {
        Converter {
            options,
            lines: source.split('\n').collect(),
        }
    }

    pub(super) fn block_list<'a>(&self, nodes: &[&'a AstNode<'a>]) -> Result<Vec<Node>, FormatError> {
        let mut blocks = Vec::new();
        let mut i = 0;
        while i < nodes.len() {
            if let Some((details, next)) = self.details(nodes, i)? {
                blocks.push(details);
                i = next;
                continue;
            }
            if let Some(block) = self.block(nodes[i])? {
                blocks.push(block);
            }
            i += 1;
        }
        Ok(blocks)
    }

    fn children<'a>(&self, node: &'a AstNode<'a>) -> Result<Vec<Node>, FormatError> {
        let children: Vec<_> = node.children().collect();
        self.block_list(&children)
    }

    fn block<'a>(&self, node: &'a AstNode<'a>) -> Result<Option<Node>, FormatError> {
        let data = node.data.borrow();
        let block = match &data.value {
            NodeValue::Heading(heading) => Node::heading(heading.level, self.inline(node)),

            NodeValue::Paragraph => match self.display_math(node) {
                Some(latex) => math_block(latex),
                None => Node::paragraph(self.inline(node)),
            },

            NodeValue::List(list) => {
                let items: Vec<_> = node.children().collect();
                let all_tasks = !items.is_empty()
                    && items
                        .iter()
                        .all(|item| matches!(item.data.borrow().value, NodeValue::TaskItem(_)));
                let kind = if all_tasks {
                    NodeType::TaskList
                } else if matches!(list.list_type, ListType::Ordered) {
                    NodeType::OrderedList
                } else {
                    NodeType::BulletList
                };
                let mut content = Vec::with_capacity(items.len());
                for item in items {
                    content.push(self.list_item(item, all_tasks)?);
                }
                let mut block = Node::block(kind, content).with_attr("tight", list.tight);
                if kind == NodeType::OrderedList {
                    let delimiter = match list.delimiter {
                        ListDelimType::Paren => ")",
                        ListDelimType::Period => ".",
                    };
                    block = block
                        .with_attr("start", list.start as u64)
                        .with_attr("delimiter", delimiter);
                } else {
                    block = block.with_attr("bullet", (list.bullet_char as char).to_string());
                }
                block
            }

            NodeValue::Item(_) | NodeValue::TaskItem(_) => self.list_item(node, false)?,

            NodeValue::CodeBlock(code) => {
                let info = code.info.trim();
                let language = info.split_whitespace().next().unwrap_or("");
                let literal = code.literal.strip_suffix('\n').unwrap_or(&code.literal);
                if language == "math" {
                    math_block(literal.to_string())
                } else {
                    let content = if literal.is_empty() {
                        Vec::new()
                    } else {
                        vec![Node::text(literal)]
                    };
                    let mut block = Node::block(NodeType::CodeBlock, content);
                    if !info.is_empty() {
                        block = block.with_attr("language", info);
                    }
                    if code.fenced && code.fence_char == b'~' {
                        block = block.with_attr("fence", "~");
                    }
                    block
                }
            }

            NodeValue::HtmlBlock(html) => raw_block("html", html.literal.trim_end_matches('\n')),

            NodeValue::FrontMatter(front) => raw_block("frontMatter", front.trim_end()),

            NodeValue::ThematicBreak => Node::new(NodeType::HorizontalRule),

            NodeValue::BlockQuote => Node::block(NodeType::Blockquote, self.children(node)?),

            NodeValue::Table(table) => {
                let alignments = table.alignments.clone();
                let mut rows = Vec::new();
                for row in node.children() {
                    let header = matches!(row.data.borrow().value, NodeValue::TableRow(true));
                    let cell_kind = if header {
                        NodeType::TableHeader
                    } else {
                        NodeType::TableCell
                    };
                    let mut cells = Vec::new();
                    for (col, cell) in row.children().enumerate() {
                        let mut cell_node =
                            Node::block(cell_kind, vec![Node::paragraph(self.inline(cell))]);
                        if let Some(align) = alignments.get(col).and_then(alignment_name) {
                            cell_node = cell_node.with_attr("align", align);
                        }
                        cells.push(cell_node);
                    }
                    rows.push(Node::block(NodeType::TableRow, cells));
                }
                Node::block(NodeType::Table, rows)
            }

            NodeValue::Document => Node::doc(self.children(node)?),

            _ => {
                let source = self.source_of(node);
                if source.trim().is_empty() {
                    return Ok(None);
                }
                raw_block("html", &source)
            }
        };
        Ok(Some(block))
    }

    fn list_item<'a>(&self, node: &'a AstNode<'a>, as_task: bool) -> Result<Node, FormatError> {
        let checked = match node.data.borrow().value {
            NodeValue::TaskItem(mark) => Some(mark.is_some()),
            _ => None,
        };
        let mut content = self.children(node)?;
        match (as_task, checked) {
            (true, Some(checked)) => {
                Ok(Node::block(NodeType::TaskItem, content).with_attr("checked", checked))
            }
            (false, Some(checked)) => {
                // A task item in a list that is not entirely tasks keeps its box as text.
                let marker = if checked { "[x] " } else { "[ ] " };
                match content.first_mut() {
                    Some(first) if first.kind == NodeType::Paragraph => {
                        first.content.insert(0, Node::text(marker));
                        crate::tree::normalize_inline(&mut first.content);
                    }
                    _ => content.insert(0, Node::paragraph(vec![Node::text(marker.trim_end())])),
                }
                Ok(Node::block(NodeType::ListItem, content))
            }
            _ => Ok(Node::block(NodeType::ListItem, content)),
        }
    }

    /// A paragraph whose only content is one `$$...$$` span.
    fn display_math<'a>(&self, paragraph: &'a AstNode<'a>) -> Option<String> {
        let mut children = paragraph.children();
        let only = children.next()?;
        if children.next().is_some() {
            return None;
        }
        match &only.data.borrow().value {
            NodeValue::Math(math) if math.display_math => {
                Some(math.literal.trim_matches('\n').to_string())
            }
            _ => None,
        }
    }

    /// `<details>` html blocks become a details node, either self-contained or closed by a
    /// later `</details>` sibling.
    fn details<'a>(
        &self,
        nodes: &[&'a AstNode<'a>],
        at: usize,
    ) -> Result<Option<(Node, usize)>, FormatError> {
        let literal = match &nodes[at].data.borrow().value {
            NodeValue::HtmlBlock(html) => html.literal.clone(),
            _ => return Ok(None),
        };
        let Some(opening) = parse_details_opening(&literal) else {
            return Ok(None);
        };

        let summary = super::parse_inline(&opening.summary, self.options)?;
        let mut content = vec![Node::block(NodeType::DetailsSummary, summary)];

        if let Some(close) = find_closing_tag(&opening.rest) {
            if !opening.rest[close + CLOSE_TAG.len()..].trim().is_empty() {
                return Ok(None);
            }
            let inner = &opening.rest[..close];
            content.extend(super::parse_blocks(inner, self.options)?);
            let node = Node::block(NodeType::DetailsBlock, content).with_attr("open", opening.open);
            return Ok(Some((node, at + 1)));
        }

        let mut depth = 0usize;
        for end in at + 1..nodes.len() {
            let sibling = match &nodes[end].data.borrow().value {
                NodeValue::HtmlBlock(html) => html.literal.trim().to_string(),
                _ => continue,
            };
            if sibling.starts_with(CLOSE_TAG) {
                if depth == 0 {
                    if !opening.rest.trim().is_empty() {
                        content.extend(super::parse_blocks(&opening.rest, self.options)?);
                    }
                    content.extend(self.block_list(&nodes[at + 1..end])?);
                    let node =
                        Node::block(NodeType::DetailsBlock, content).with_attr("open", opening.open);
                    return Ok(Some((node, end + 1)));
                }
                depth -= 1;
            } else if parse_details_opening(&sibling).is_some()
                && find_closing_tag(&sibling).is_none()
            {
                depth += 1;
            }
        }
        Ok(None)
    }

    /// Source lines covered by a node, for constructs passed through verbatim.
    pub(super) fn source_of<'a>(&self, node: &'a AstNode<'a>) -> String {
        let pos = node.data.borrow().sourcepos;
        if pos.start.line == 0 || pos.end.line < pos.start.line {
            return String::new();
        }
        self.lines
            .iter()
            .skip(pos.start.line - 1)
            .take(pos.end.line - pos.start.line + 1)
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

const CLOSE_TAG: &str = "</details>";

struct DetailsOpening {
    open: bool,
    summary: String,
    rest: String,
}

fn parse_details_opening(literal: &str) -> Option<DetailsOpening> {
    let trimmed = literal.trim_start();
    let after_name = trimmed.strip_prefix("<details")?;
    if !after_name.starts_with(['>', ' ', '\t', '\n']) {
        return None;
    }
    let tag_end = after_name.find('>')?;
    let attrs = &after_name[..tag_end];
    let open = attrs.split_whitespace().any(|a| a == "open" || a.starts_with("open="));
    let mut rest = after_name[tag_end + 1..].trim_start();

    let mut summary = String::new();
    if let Some(after_open) = rest.strip_prefix("<summary>") {
        if let Some(end) = after_open.find("</summary>") {
            summary = after_open[..end].trim().to_string();
            rest = &after_open[end + "</summary>".len()..];
        }
    }
    Some(DetailsOpening {
        open,
        summary,
        rest: rest.trim_start_matches('\n').to_string(),
    })
}

/// Position of the `</details>` that closes the current block, skipping nested pairs.
fn find_closing_tag(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut at = 0;
    while at < text.len() {
        let rest = &text[at..];
        let open = rest.find("<details");
        let close = rest.find(CLOSE_TAG)?;
        match open {
            Some(o) if o < close => {
                depth += 1;
                at += o + "<details".len();
            }
            _ => {
                if depth == 0 {
                    return Some(at + close);
                }
                depth -= 1;
                at += close + CLOSE_TAG.len();
            }
        }
    }
    None
}

fn alignment_name(align: &TableAlignment) -> Option<&'static str> {
    match align {
        TableAlignment::Left => Some("left"),
        TableAlignment::Center => Some("center"),
        TableAlignment::Right => Some("right"),
        TableAlignment::None => None,
    }
}

fn math_block(latex: String) -> Node {
    let content = if latex.is_empty() {
        Vec::new()
    } else {
        vec![Node::text(latex)]
    };
    Node::block(NodeType::MathBlock, content)
}

fn raw_block(kind: &str, source: &str) -> Node {
    Node::new(NodeType::RawBlock)
        .with_attr("kind", kind)
        .with_attr("source", source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MarkType;

    fn parse(text: &str) -> Node {
        parse_markdown(text, &MarkdownOptions::default()).unwrap()
    }

    #[test]
    fn parses_headings_and_paragraphs() {
        let doc = parse("# Title\n\nSome text\n");
        assert_eq!(doc.content[0].kind, NodeType::Heading);
        assert_eq!(doc.content[0].level(), Some(1));
        assert_eq!(doc.content[1].text_content(), "Some text");
    }

    #[test]
    fn task_lists_need_every_item_checked_or_unchecked() {
        let doc = parse("- [ ] one\n- [x] two\n");
        let list = &doc.content[0];
        assert_eq!(list.kind, NodeType::TaskList);
        assert_eq!(list.content[1].attr_bool("checked"), Some(true));

        let mixed = parse("- [ ] one\n- two\n");
        assert_eq!(mixed.content[0].kind, NodeType::BulletList);
        assert_eq!(mixed.content[0].content[0].text_content(), "[ ] one");
    }

    #[test]
    fn ordered_list_keeps_start_and_delimiter() {
        let doc = parse("3) a\n4) b\n");
        let list = &doc.content[0];
        assert_eq!(list.kind, NodeType::OrderedList);
        assert_eq!(list.attr_u64("start"), Some(3));
        assert_eq!(list.attr_str("delimiter"), Some(")"));
        assert_eq!(list.attr_bool("tight"), Some(true));
    }

    #[test]
    fn details_spanning_blank_lines() {
        let doc = parse("<details open>\n<summary>More **info**</summary>\n\nHidden body\n\n</details>\n");
        let details = &doc.content[0];
        assert_eq!(details.kind, NodeType::DetailsBlock);
        assert_eq!(details.attr_bool("open"), Some(true));
        assert_eq!(details.content[0].kind, NodeType::DetailsSummary);
        assert!(details.content[0].content[1].has_mark(MarkType::Bold));
        assert_eq!(details.content[1].text_content(), "Hidden body");
    }

    #[test]
    fn unclosed_details_stays_raw() {
        let doc = parse("<details>\n<summary>x</summary>\n\nbody\n");
        assert_eq!(doc.content[0].kind, NodeType::RawBlock);
    }

    #[test]
    fn display_math_and_math_fences() {
        let doc = parse("$$\nx^2\n$$\n\n```math\ny\n```\n");
        assert_eq!(doc.content[0].kind, NodeType::MathBlock);
        assert_eq!(doc.content[0].text_content(), "x^2");
        assert_eq!(doc.content[1].kind, NodeType::MathBlock);
    }

    #[test]
    fn crlf_input_is_normalized() {
        let doc = parse("a\r\nb\r\n\r\nc");
        assert_eq!(doc.content.len(), 2);
        assert_eq!(doc.content[0].text_content(), "a b");
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let options = MarkdownOptions {
            max_nesting_depth: 4,
            ..MarkdownOptions::default()
        };
        let deep = "> > > > > > deep\n";
        let err = parse_markdown(deep, &options).unwrap_err();
        assert!(matches!(err, FormatError::ParseError(_)));
    }

    #[test]
    fn tables_carry_alignment() {
        let doc = parse("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let table = &doc.content[0];
        assert_eq!(table.kind, NodeType::Table);
        assert_eq!(table.content[0].content[0].kind, NodeType::TableHeader);
        assert_eq!(table.content[1].content[1].attr_str("align"), Some("right"));
        assert_eq!(table.content[1].content[0].text_content(), "1");
    }
}

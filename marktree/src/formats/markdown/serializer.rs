//! Markdown serialization (document tree → markdown text)
//!
//! The writer follows the prosemirror-markdown serializer model: blocks are written through a
//! line prefix (`delim`) that nests for blockquotes and list items, and a block is only
//! "closed" until the next write decides how many newlines separate it from what follows.
//! That is what lets tight lists, loose lists and nested containers come out right without
//! any lookahead.
//!
//! While writing, the serializer can record a [`SourceMap`]: anchor pairs of tree position and
//! character offset in the output. Anchors sit at the start of every textblock's content,
//! around every inline node, and after every inserted escape, so lookups between anchors only
//! ever interpolate across literal text.

use super::escape::{escape_text, EscapeContext};
use super::{BreakStyle, SerializeOptions};
use crate::error::FormatError;
use crate::tree::{Mark, MarkType, Node, NodeType};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// A tree position paired with the character offset where it lands in the markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub pos: usize,
    pub offset: usize,
}

/// Correspondence between tree positions and markdown character offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    anchors: Vec<Anchor>,
}

impl SourceMap {
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Character offset for a tree position, interpolated from the nearest anchor at or before
    /// it and never past the next anchor.
    pub fn offset_of(&self, pos: usize) -> Option<usize> {
        let idx = self.anchors.partition_point(|a| a.pos <= pos);
        if idx == 0 {
            return self.anchors.first().map(|a| a.offset);
        }
        let anchor = self.anchors[idx - 1];
        let mut offset = anchor.offset + (pos - anchor.pos);
        if let Some(next) = self.anchors.get(idx) {
            offset = offset.min(next.offset);
        }
        Some(offset)
    }

    /// Tree position for a character offset, the inverse of [`SourceMap::offset_of`].
    pub fn pos_of(&self, offset: usize) -> Option<usize> {
        let idx = self.anchors.partition_point(|a| a.offset <= offset);
        if idx == 0 {
            return self.anchors.first().map(|a| a.pos);
        }
        let anchor = self.anchors[idx - 1];
        let mut pos = anchor.pos + (offset - anchor.offset);
        if let Some(next) = self.anchors.get(idx) {
            pos = pos.min(next.pos);
        }
        Some(pos)
    }
}

/// Serializer output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Serialized {
    pub text: String,
    pub source_map: SourceMap,
}

/// Serialize a document. The source map is only recorded when asked for.
pub fn serialize(
    doc: &Node,
    options: &SerializeOptions,
    with_source_map: bool,
) -> Result<Serialized, FormatError> {
    let started = Instant::now();
    let mut writer = Writer::new(options, with_source_map);
    if doc.kind == NodeType::Doc {
        writer.render_content(doc, 0)?;
    } else {
        writer.render_block(doc, 0, None)?;
    }

    let Writer {
        mut out, anchors, ..
    } = writer;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    let mut anchors = anchors.unwrap_or_default();
    if options.crlf {
        (out, anchors) = to_crlf(out, anchors);
    }

    debug!(
        bytes = out.len(),
        anchors = anchors.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "serialized markdown"
    );
    Ok(Serialized {
        text: out,
        source_map: SourceMap { anchors },
    })
}

fn to_crlf(text: String, anchors: Vec<Anchor>) -> (String, Vec<Anchor>) {
    let newlines: Vec<usize> = text
        .chars()
        .enumerate()
        .filter(|(_, c)| *c == '\n')
        .map(|(i, _)| i)
        .collect();
    let anchors = anchors
        .into_iter()
        .map(|a| Anchor {
            pos: a.pos,
            offset: a.offset + newlines.partition_point(|&n| n < a.offset),
        })
        .collect();
    (text.replace('\n', "\r\n"), anchors)
}

/// A mark that has been opened in the output and how to close it.
struct OpenMark {
    mark: Mark,
    close: String,
    autolink: bool,
}

struct Writer<'o> {
    options: &'o SerializeOptions,
    out: String,
    chars: usize,
    delim: String,
    closed: bool,
    in_tight_list: bool,
    anchors: Option<Vec<Anchor>>,
}

impl<'o> Writer<'o> {
    fn new(options: &'o SerializeOptions, with_source_map: bool) -> Self {
        Writer {
            options,
            out: String::new(),
            chars: 0,
            delim: String::new(),
            closed: false,
            in_tight_list: false,
            anchors: with_source_map.then(Vec::new),
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
        self.chars += text.chars().count();
    }

    fn anchor(&mut self, pos: usize) {
        self.anchor_at(pos, self.chars);
    }

    fn anchor_at(&mut self, pos: usize, offset: usize) {
        if let Some(anchors) = self.anchors.as_mut() {
            if anchors
                .last()
                .map_or(true, |last| pos >= last.pos && offset >= last.offset)
            {
                anchors.push(Anchor { pos, offset });
            }
        }
    }

    fn at_blank(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    /// Whether nothing but the line prefix has been written on the current line.
    fn at_line_start(&self) -> bool {
        self.out.rsplit('\n').next().unwrap_or("") == self.delim
    }

    /// Emit the separator owed by the last closed block: `size - 1` blank lines.
    fn flush_close(&mut self, size: usize) {
        if !self.closed {
            return;
        }
        if !self.at_blank() {
            self.push("\n");
        }
        let blank = self.delim.trim_end().to_string();
        for _ in 1..size {
            self.push(&blank);
            self.push("\n");
        }
        self.closed = false;
    }

    fn write(&mut self, content: Option<&str>) {
        self.flush_close(2);
        if !self.delim.is_empty() && self.at_blank() {
            let delim = self.delim.clone();
            self.push(&delim);
        }
        if let Some(content) = content {
            self.push(content);
        }
    }

    fn close_block(&mut self) {
        self.closed = true;
    }

    fn ensure_new_line(&mut self) {
        if !self.at_blank() {
            self.push("\n");
        }
    }

    /// Write literal text line by line under the current prefix, anchoring each line start.
    fn text(&mut self, text: &str, pos: Option<usize>) {
        if text.is_empty() {
            if let Some(p) = pos {
                self.anchor(p);
            }
            return;
        }
        let mut line_pos = pos;
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.push("\n");
            }
            self.write(None);
            if let Some(p) = line_pos {
                self.anchor(p);
                line_pos = Some(p + line.chars().count() + 1);
            }
            self.push(line);
        }
    }

    fn wrap_block(
        &mut self,
        delim: &str,
        first_delim: Option<&str>,
        render: impl FnOnce(&mut Self) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        let old = self.delim.clone();
        self.write(Some(first_delim.unwrap_or(delim)));
        self.delim.push_str(delim);
        render(self)?;
        self.delim = old;
        self.close_block();
        Ok(())
    }

    fn render_content(&mut self, parent: &Node, content_start: usize) -> Result<(), FormatError> {
        let mut pos = content_start;
        let mut prev = None;
        for child in &parent.content {
            self.render_block(child, pos, prev)?;
            pos += child.node_size();
            prev = Some(child);
        }
        Ok(())
    }

    fn render_block(&mut self, node: &Node, pos: usize, prev: Option<&Node>) -> Result<(), FormatError> {
        match node.kind {
            NodeType::Doc => self.render_content(node, 0)?,
            NodeType::Paragraph => {
                self.render_inline(node, pos + 1, true, false);
                self.close_block();
            }
            NodeType::Heading => {
                let level = node.level().unwrap_or(1) as usize;
                self.write(Some(&format!("{} ", "#".repeat(level))));
                self.render_inline(node, pos + 1, false, false);
                self.close_block();
            }
            NodeType::CodeBlock => {
                let code = node.text_content();
                let fence_char = if node.attr_str("fence") == Some("~") { '~' } else { '`' };
                let longest = longest_run(&code, fence_char);
                let fence = fence_char.to_string().repeat((longest + 1).max(3));
                let language = node.attr_str("language").unwrap_or("");
                self.write(Some(&format!("{fence}{language}")));
                self.push("\n");
                self.text(&code, Some(pos + 1));
                self.ensure_new_line();
                self.write(Some(&fence));
                self.close_block();
            }
            NodeType::MathBlock => {
                self.write(Some("$$"));
                self.push("\n");
                self.text(&node.text_content(), Some(pos + 1));
                self.ensure_new_line();
                self.write(Some("$$"));
                self.close_block();
            }
            NodeType::Blockquote => {
                self.wrap_block("> ", None, |w| w.render_content(node, pos + 1))?;
            }
            NodeType::BulletList | NodeType::OrderedList | NodeType::TaskList => {
                self.render_list(node, pos, prev)?;
            }
            NodeType::ListItem | NodeType::TaskItem | NodeType::TableRow => {
                self.render_content(node, pos + 1)?;
            }
            NodeType::TableHeader | NodeType::TableCell => {
                self.render_content(node, pos + 1)?;
            }
            NodeType::Table => self.render_table(node, pos),
            NodeType::HorizontalRule => {
                self.write(Some("---"));
                self.close_block();
            }
            NodeType::DetailsBlock => self.render_details(node, pos)?,
            NodeType::DetailsSummary => {
                self.write(Some("<summary>"));
                self.render_inline(node, pos + 1, false, false);
                self.push("</summary>");
                self.close_block();
            }
            NodeType::RawBlock => {
                self.text(node.attr_str("source").unwrap_or(""), None);
                self.close_block();
            }
            NodeType::Text
            | NodeType::Image
            | NodeType::HardBreak
            | NodeType::MathInline
            | NodeType::RawInline => {
                return Err(FormatError::SerializationError(format!(
                    "inline node '{}' cannot appear at block level",
                    node.kind
                )));
            }
        }
        Ok(())
    }

    fn render_list(&mut self, node: &Node, pos: usize, prev: Option<&Node>) -> Result<(), FormatError> {
        if self.in_tight_list {
            self.flush_close(1);
        }
        let tight = node.attr_bool("tight").unwrap_or(true);
        let was_tight = std::mem::replace(&mut self.in_tight_list, tight);
        let markers = ListMarkers::for_list(node, prev);

        let mut item_pos = pos + 1;
        for (i, item) in node.content.iter().enumerate() {
            if i > 0 && tight {
                self.flush_close(1);
            }
            let first = markers.first(i, item);
            let delim = markers.continuation.clone();
            self.wrap_block(&delim, Some(&first), |w| w.render_content(item, item_pos + 1))?;
            item_pos += item.node_size();
        }
        self.in_tight_list = was_tight;
        Ok(())
    }

    fn render_table(&mut self, node: &Node, pos: usize) {
        let columns = node.content.iter().map(|row| row.content.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let aligns: Vec<Option<&str>> = (0..columns)
            .map(|c| {
                node.content
                    .iter()
                    .find_map(|row| row.content.get(c).and_then(|cell| cell.attr_str("align")))
            })
            .collect();

        let mut row_pos = pos + 1;
        for (r, row) in node.content.iter().enumerate() {
            self.write(Some("|"));
            let mut cell_pos = row_pos + 1;
            for c in 0..columns {
                self.push(" ");
                if let Some(cell) = row.content.get(c) {
                    let mut block_pos = cell_pos + 1;
                    for (k, block) in cell.content.iter().enumerate() {
                        if k > 0 {
                            self.push("<br>");
                        }
                        if block.kind.is_textblock() {
                            self.render_inline(block, block_pos + 1, false, true);
                        } else {
                            self.push(&block.text_content().replace('|', "\\|").replace('\n', " "));
                        }
                        block_pos += block.node_size();
                    }
                    cell_pos += cell.node_size();
                }
                self.push(" |");
            }
            self.ensure_new_line();
            if r == 0 {
                self.write(Some("|"));
                for align in &aligns {
                    let rule = match align {
                        Some("left") => ":--",
                        Some("center") => ":-:",
                        Some("right") => "--:",
                        _ => "---",
                    };
                    self.push(&format!(" {rule} |"));
                }
                self.ensure_new_line();
            }
            row_pos += row.node_size();
        }
        self.close_block();
    }

    fn render_details(&mut self, node: &Node, pos: usize) -> Result<(), FormatError> {
        let open = if node.attr_bool("open") == Some(true) {
            "<details open>"
        } else {
            "<details>"
        };
        self.write(Some(open));
        self.push("\n");
        let mut child_pos = pos + 1;
        let mut prev = None;
        for (i, child) in node.content.iter().enumerate() {
            if i == 0 && child.kind == NodeType::DetailsSummary {
                self.write(Some("<summary>"));
                self.render_inline(child, child_pos + 1, false, false);
                self.push("</summary>");
                self.close_block();
            } else {
                self.render_block(child, child_pos, prev)?;
            }
            child_pos += child.node_size();
            prev = Some(child);
        }
        if node.content.is_empty() {
            self.write(Some("<summary></summary>"));
            self.close_block();
        }
        self.write(Some("</details>"));
        self.close_block();
        Ok(())
    }

    /// Write a textblock's inline content. Marks open and close around runs, with whitespace at
    /// either end of a marked run moved outside the delimiters.
    fn render_inline(&mut self, parent: &Node, content_start: usize, paragraph: bool, in_table: bool) {
        let block_text: Vec<char> = parent.inline_text().chars().collect();
        let block_string: String = block_text.iter().collect();
        let ctx = EscapeContext::new(&block_string, in_table);
        let nodes = &parent.content;

        self.write(None);
        self.anchor(content_start);

        let mut active: Vec<OpenMark> = Vec::new();
        let mut trail: Option<(String, usize)> = None;
        let mut pos = content_start;

        for (i, node) in nodes.iter().enumerate() {
            let size = node.node_size();
            let text = node.text.as_deref().unwrap_or("");
            let is_code = node.has_mark(MarkType::Code);
            let (lead, inner, tail) = if node.is_text() && !node.marks.is_empty() && !is_code {
                split_whitespace(text)
            } else {
                ("", text, "")
            };

            let mut marks: Vec<Mark> = node
                .marks
                .iter()
                .filter(|m| m.kind != MarkType::Code)
                .cloned()
                .collect();
            if node.is_text() && inner.is_empty() {
                marks.retain(|m| active.iter().any(|o| &o.mark == m));
            }

            let keep = active.iter().take_while(|o| marks.contains(&o.mark)).count();
            while active.len() > keep {
                if let Some(open) = active.pop() {
                    self.push(&open.close);
                }
            }
            if let Some((ws, at)) = trail.take() {
                self.anchor(at);
                self.push(&ws);
            }
            if !lead.is_empty() {
                self.anchor(pos);
                self.push(lead);
            }

            let mut opening: Vec<&Mark> = marks
                .iter()
                .filter(|m| !active.iter().any(|o| &o.mark == *m))
                .collect();
            opening.sort_by_key(|m| (std::cmp::Reverse(run_length(nodes, i, m)), m.kind.rank()));
            for mark in opening {
                let open = self.open_mark(mark, nodes, i);
                active.push(open);
            }

            let inner_pos = pos + lead.chars().count();
            self.anchor(inner_pos);
            match node.kind {
                NodeType::Text if is_code => self.code_span(inner, inner_pos),
                NodeType::Text if active.iter().any(|o| o.autolink) => self.push(inner),
                NodeType::Text => {
                    let offset = inner_pos - content_start;
                    let before = offset.checked_sub(1).and_then(|b| block_text.get(b)).copied();
                    let after = block_text.get(offset + inner.chars().count()).copied();
                    let line_start = (paragraph && offset == 0) || self.at_line_start();
                    self.escaped_text(inner, inner_pos, &ctx, before, after, line_start && !in_table);
                }
                NodeType::HardBreak => self.hard_break(nodes, i, pos, in_table),
                NodeType::Image => {
                    self.push(&image_markdown(node));
                    self.anchor(pos + 1);
                }
                NodeType::MathInline => {
                    let latex = node.attr_str("latex").unwrap_or("");
                    let fence = if node.attr_bool("display") == Some(true) { "$$" } else { "$" };
                    self.push(&format!("{fence}{latex}{fence}"));
                    self.anchor(pos + 1);
                }
                NodeType::RawInline => {
                    self.push(node.attr_str("source").unwrap_or(""));
                    self.anchor(pos + 1);
                }
                _ => {}
            }

            if !tail.is_empty() {
                trail = Some((tail.to_string(), pos + size - tail.chars().count()));
            }
            pos += size;
        }

        let end_inner = trail.as_ref().map_or(pos, |(_, at)| *at);
        self.anchor(end_inner);
        while let Some(open) = active.pop() {
            self.push(&open.close);
        }
        if let Some((ws, at)) = trail.take() {
            self.anchor(at);
            self.push(&ws);
        }
        self.anchor(pos);
    }

    fn escaped_text(
        &mut self,
        text: &str,
        pos: usize,
        ctx: &EscapeContext,
        before: Option<char>,
        after: Option<char>,
        line_start: bool,
    ) {
        let mut line_pos = pos;
        let mut prev = before;
        let lines: Vec<&str> = text.split('\n').collect();
        for (n, line) in lines.iter().enumerate() {
            if n > 0 {
                // A newline stored in a text run is written as a hard break.
                let line_break = self.hard_break_text(false);
                self.push(line_break);
                let delim = self.delim.clone();
                self.push(&delim);
                self.anchor(line_pos);
            }
            let next = if n + 1 < lines.len() { Some('\n') } else { after };
            let start_chars = self.chars;
            let escaped = escape_text(line, ctx, prev, next, line_start || n > 0);
            self.push(&escaped.text);
            for (k, at) in escaped.escaped_at.iter().enumerate() {
                self.anchor_at(line_pos + at + 1, start_chars + at + k + 2);
            }
            line_pos += line.chars().count() + 1;
            prev = Some('\n');
        }
    }

    fn code_span(&mut self, text: &str, pos: usize) {
        let fence = "`".repeat(longest_run(text, '`') + 1);
        let pad = if text.starts_with('`')
            || text.ends_with('`')
            || (text.starts_with(' ') && text.ends_with(' ') && !text.trim().is_empty())
        {
            " "
        } else {
            ""
        };
        self.push(&fence);
        self.push(pad);
        self.anchor(pos);
        self.push(text);
        self.anchor(pos + text.chars().count());
        self.push(pad);
        self.push(&fence);
    }

    fn hard_break_text(&self, soft: bool) -> &'static str {
        if soft {
            return "\n";
        }
        match self.options.hard_break {
            BreakStyle::Backslash => "\\\n",
            BreakStyle::TwoSpaces => "  \n",
        }
    }

    fn hard_break(&mut self, nodes: &[Node], i: usize, pos: usize, in_table: bool) {
        if in_table {
            self.push("<br>");
            self.anchor(pos + 1);
            return;
        }
        // A break with nothing but breaks after it would read back as a literal backslash.
        if !nodes[i + 1..].iter().any(|n| n.kind != NodeType::HardBreak) {
            return;
        }
        let soft = nodes[i].attr_bool("soft") == Some(true);
        let line_break = self.hard_break_text(soft);
        self.push(line_break);
        let delim = self.delim.clone();
        self.push(&delim);
        self.anchor(pos + 1);
    }

    fn open_mark(&mut self, mark: &Mark, nodes: &[Node], i: usize) -> OpenMark {
        let simple = |open: &str, close: &str| (open.to_string(), close.to_string());
        let after_star = self.out.ends_with('*');
        let mut autolink = false;
        let (open, close) = match mark.kind {
            MarkType::Bold if after_star => simple("__", "__"),
            MarkType::Bold => simple("**", "**"),
            MarkType::Italic if after_star => simple("_", "_"),
            MarkType::Italic => simple("*", "*"),
            MarkType::Strike => simple("~~", "~~"),
            MarkType::Subscript => simple("~", "~"),
            MarkType::Superscript => simple("^", "^"),
            MarkType::Highlight => simple("==", "=="),
            MarkType::Underline => simple("<u>", "</u>"),
            MarkType::Code => simple("", ""),
            MarkType::Link => {
                let href = mark.attr_str("href").unwrap_or("");
                let run = run_text(nodes, i, mark);
                if mark.attrs.get("wiki") == Some(&Value::Bool(true)) {
                    if run == href {
                        simple("[[", "]]")
                    } else {
                        (format!("[[{href}|"), "]]".to_string())
                    }
                } else if is_autolink(nodes, i, mark, &run) {
                    autolink = true;
                    simple("<", ">")
                } else {
                    let title = mark
                        .attr_str("title")
                        .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
                        .unwrap_or_default();
                    ("[".to_string(), format!("]({}{title})", link_destination(href)))
                }
            }
        };
        self.push(&open);
        OpenMark {
            mark: mark.clone(),
            close,
            autolink,
        }
    }
}

/// Bullet and number markers for one list.
struct ListMarkers {
    kind: NodeType,
    bullet: char,
    start: u64,
    delimiter: char,
    width: usize,
    continuation: String,
}

impl ListMarkers {
    fn for_list(list: &Node, prev: Option<&Node>) -> Self {
        let bullet_of = |n: &Node| {
            n.attr_str("bullet")
                .and_then(|b| b.chars().next())
                .unwrap_or('-')
        };
        let delimiter_of = |n: &Node| {
            n.attr_str("delimiter")
                .and_then(|d| d.chars().next())
                .unwrap_or('.')
        };
        let after_same = prev.filter(|p| p.kind == list.kind);

        // Two adjacent lists of the same kind only stay apart if their markers differ.
        let mut bullet = bullet_of(list);
        if after_same.is_some_and(|p| bullet_of(p) == bullet) {
            bullet = if bullet == '-' { '*' } else { '-' };
        }
        let mut delimiter = delimiter_of(list);
        if after_same.is_some_and(|p| delimiter_of(p) == delimiter) {
            delimiter = if delimiter == '.' { ')' } else { '.' };
        }

        let start = list.attr_u64("start").unwrap_or(1);
        let last = start + list.content.len().saturating_sub(1) as u64;
        let width = last.to_string().len();
        let continuation = match list.kind {
            NodeType::OrderedList => " ".repeat(width + 2),
            _ => "  ".to_string(),
        };
        ListMarkers {
            kind: list.kind,
            bullet,
            start,
            delimiter,
            width,
            continuation,
        }
    }

    fn first(&self, index: usize, item: &Node) -> String {
        match self.kind {
            NodeType::OrderedList => {
                let number = (self.start + index as u64).to_string();
                let pad = " ".repeat(self.width - number.len());
                format!("{pad}{number}{} ", self.delimiter)
            }
            _ if item.kind == NodeType::TaskItem => {
                let check = if item.attr_bool("checked") == Some(true) { 'x' } else { ' ' };
                format!("{} [{check}] ", self.bullet)
            }
            _ => format!("{} ", self.bullet),
        }
    }
}

fn split_whitespace(text: &str) -> (&str, &str, &str) {
    let trimmed_start = text.trim_start();
    let lead = &text[..text.len() - trimmed_start.len()];
    let inner = trimmed_start.trim_end();
    let tail = &trimmed_start[inner.len()..];
    (lead, inner, tail)
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// How many nodes from `i` onwards carry `mark`.
fn run_length(nodes: &[Node], i: usize, mark: &Mark) -> usize {
    nodes[i..].iter().take_while(|n| n.marks.contains(mark)).count()
}

fn run_text(nodes: &[Node], i: usize, mark: &Mark) -> String {
    nodes[i..]
        .iter()
        .take_while(|n| n.marks.contains(mark))
        .map(|n| n.text.as_deref().unwrap_or(""))
        .collect()
}

/// `<href>` form: the visible text is the URL itself and carries no other formatting.
fn is_autolink(nodes: &[Node], i: usize, mark: &Mark, text: &str) -> bool {
    let Some(href) = mark.attr_str("href") else {
        return false;
    };
    let plain = nodes[i..]
        .iter()
        .take_while(|n| n.marks.contains(mark))
        .all(|n| n.is_text() && n.marks.len() == 1);
    let matches = href == text || href.strip_prefix("mailto:") == Some(text);
    plain
        && matches
        && mark.attr_str("title").is_none()
        && href.contains(':')
        && !href.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
}

fn link_destination(href: &str) -> String {
    let mut depth = 0i32;
    let mut balanced = true;
    for c in href.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                }
            }
            _ => {}
        }
    }
    if href.is_empty() || href.chars().any(char::is_whitespace) || depth != 0 || !balanced {
        format!("<{}>", href.replace('<', "\\<").replace('>', "\\>"))
    } else {
        href.to_string()
    }
}

fn image_markdown(node: &Node) -> String {
    let alt = node
        .attr_str("alt")
        .unwrap_or("")
        .replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]");
    let src = link_destination(node.attr_str("src").unwrap_or(""));
    let title = node
        .attr_str("title")
        .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
        .unwrap_or_default();
    format!("![{alt}]({src}{title})")
}

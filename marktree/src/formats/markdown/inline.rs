//! Inline conversion
//!
//! comrak's nested inline AST is flattened into runs that each carry their mark set. Three passes
//! then add what comrak does not know about: `<sub> <sup> <u> <mark>` tag pairs become marks,
//! `==text==` becomes highlight, and soft line breaks are resolved per the line-break settings.

use super::cjk;
use super::parser::Converter;
use crate::tree::{add_mark, normalize_inline, Mark, MarkType, Node, NodeType};
use comrak::nodes::{AstNode, NodeValue};

impl<'s> Converter<'s> {
    /// Inline content of a comrak block node.
    pub(super) fn inline<'a>(&self, node: &'a AstNode<'a>) -> Vec<Node> {
        let mut runs = Vec::new();
        let mut marks = Vec::new();
        for child in node.children() {
            self.collect(child, &mut marks, &mut runs);
        }
        let runs = pair_html_tags(runs);
        let runs = pair_highlight(runs);
        let mut runs = self.resolve_soft_breaks(runs);
        normalize_inline(&mut runs);
        runs
    }

    fn collect<'a>(&self, node: &'a AstNode<'a>, marks: &mut Vec<Mark>, out: &mut Vec<Node>) {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Text(text) => out.push(Node::marked_text(text.as_str(), marks.clone())),
            NodeValue::Code(code) => {
                let mut code_marks = marks.clone();
                add_mark(&mut code_marks, Mark::new(MarkType::Code));
                out.push(Node::marked_text(code.literal.as_str(), code_marks));
            }
            NodeValue::Emph => self.wrap(node, Mark::new(MarkType::Italic), marks, out),
            NodeValue::Strong => self.wrap(node, Mark::new(MarkType::Bold), marks, out),
            NodeValue::Superscript => self.wrap(node, Mark::new(MarkType::Superscript), marks, out),
            NodeValue::Strikethrough => {
                let pos = data.sourcepos;
                let kind = if self.is_single_tilde(pos.start.line, pos.start.column) {
                    MarkType::Subscript
                } else {
                    MarkType::Strike
                };
                self.wrap(node, Mark::new(kind), marks, out)
            }
            NodeValue::Link(link) => {
                let title = (!link.title.is_empty()).then(|| link.title.clone());
                self.wrap(node, Mark::link(decode_href(&link.url), title), marks, out)
            }
            NodeValue::WikiLink(link) => {
                let mut mark = Mark::link(link.url.clone(), None);
                mark.attrs.insert("wiki".to_string(), true.into());
                self.wrap(node, mark, marks, out)
            }
            NodeValue::Image(link) => {
                let alt: String = node.descendants().skip(1).filter_map(plain_text).collect();
                let mut image = Node::new(NodeType::Image)
                    .with_attr("src", decode_href(&link.url))
                    .with_attr("alt", alt);
                if !link.title.is_empty() {
                    image = image.with_attr("title", link.title.as_str());
                }
                image.marks = marks.clone();
                out.push(image);
            }
            NodeValue::Math(math) => {
                let mut node = Node::new(NodeType::MathInline).with_attr("latex", math.literal.as_str());
                if math.display_math {
                    node = node.with_attr("display", true);
                }
                node.marks = marks.clone();
                out.push(node);
            }
            NodeValue::LineBreak => out.push(Node::new(NodeType::HardBreak)),
            NodeValue::SoftBreak => {
                out.push(Node::new(NodeType::HardBreak).with_attr("soft", true));
            }
            NodeValue::HtmlInline(html) => {
                let mut raw = Node::new(NodeType::RawInline).with_attr("source", html.as_str());
                raw.marks = marks.clone();
                out.push(raw);
            }
            _ => {
                for child in node.children() {
                    self.collect(child, marks, out);
                }
            }
        }
    }

    fn wrap<'a>(&self, node: &'a AstNode<'a>, mark: Mark, marks: &mut Vec<Mark>, out: &mut Vec<Node>) {
        let saved = marks.clone();
        add_mark(marks, mark);
        for child in node.children() {
            self.collect(child, marks, out);
        }
        *marks = saved;
    }

    /// `~x~` and `~~x~~` both reach us as strikethrough; the source tells them apart.
    fn is_single_tilde(&self, line: usize, column: usize) -> bool {
        if line == 0 || column == 0 {
            return false;
        }
        let Some(text) = self.lines.get(line - 1) else {
            return false;
        };
        let bytes = text.as_bytes();
        bytes.get(column - 1) == Some(&b'~') && bytes.get(column) != Some(&b'~')
    }

    /// Soft breaks stay as soft hard-breaks when line breaks are preserved, and otherwise turn
    /// into a space (or vanish between two CJK characters).
    fn resolve_soft_breaks(&self, runs: Vec<Node>) -> Vec<Node> {
        if self.options.preserve_line_breaks {
            return runs;
        }
        let mut out: Vec<Node> = Vec::with_capacity(runs.len());
        for i in 0..runs.len() {
            let node = &runs[i];
            if node.kind != NodeType::HardBreak || node.attr_bool("soft") != Some(true) {
                out.push(node.clone());
                continue;
            }
            let before = out.last().and_then(|n| n.text.as_deref()).and_then(|t| t.chars().last());
            let next = runs.get(i + 1);
            let after = next.and_then(|n| n.text.as_deref()).and_then(|t| t.chars().next());
            if self.options.cjk_soft_break_join && cjk::joins_without_space(before, after) {
                continue;
            }
            let marks = match (out.last(), next) {
                (Some(prev), Some(next)) if prev.marks == next.marks => prev.marks.clone(),
                _ => Vec::new(),
            };
            out.push(Node::marked_text(" ", marks));
        }
        out
    }
}

fn plain_text<'a>(node: &'a AstNode<'a>) -> Option<String> {
    match &node.data.borrow().value {
        NodeValue::Text(text) => Some(text.clone()),
        NodeValue::Code(code) => Some(code.literal.clone()),
        NodeValue::SoftBreak | NodeValue::LineBreak => Some(" ".to_string()),
        _ => None,
    }
}

/// Percent-encoded relative paths are decoded for display and editing. Absolute URLs are kept
/// exactly as written.
pub(super) fn decode_href(href: &str) -> String {
    if !href.contains('%') || url::Url::parse(href).is_ok() {
        return href.to_string();
    }
    match urlencoding::decode(href) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => href.to_string(),
    }
}

const TAG_MARKS: [(&str, MarkType); 4] = [
    ("sub", MarkType::Subscript),
    ("sup", MarkType::Superscript),
    ("u", MarkType::Underline),
    ("mark", MarkType::Highlight),
];

fn tag_of(node: &Node) -> Option<(MarkType, bool)> {
    if node.kind != NodeType::RawInline {
        return None;
    }
    let source = node.attr_str("source")?.trim().to_ascii_lowercase();
    let inner = source.strip_prefix('<')?.strip_suffix('>')?;
    let (closing, name) = match inner.strip_prefix('/') {
        Some(name) => (true, name),
        None => (false, inner),
    };
    TAG_MARKS
        .iter()
        .find(|(tag, _)| *tag == name)
        .map(|(_, kind)| (*kind, closing))
}

/// Turn matching `<tag>`/`</tag>` raw inline pairs into marks on the runs between them.
fn pair_html_tags(mut runs: Vec<Node>) -> Vec<Node> {
    let mut i = 0;
    while i < runs.len() {
        let Some((kind, false)) = tag_of(&runs[i]) else {
            i += 1;
            continue;
        };
        let mut depth = 0usize;
        let mut close = None;
        for (j, node) in runs.iter().enumerate().skip(i + 1) {
            match tag_of(node) {
                Some((k, false)) if k == kind => depth += 1,
                Some((k, true)) if k == kind => {
                    if depth == 0 {
                        close = Some(j);
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        match close {
            Some(j) => {
                for node in &mut runs[i + 1..j] {
                    add_mark(&mut node.marks, Mark::new(kind));
                }
                runs.remove(j);
                runs.remove(i);
            }
            None => i += 1,
        }
    }
    runs
}

enum Piece {
    Run(Node),
    Delim {
        marks: Vec<Mark>,
        can_open: bool,
        can_close: bool,
        paired: bool,
    },
}

/// Pair `==` delimiters inside text runs into highlight marks.
fn pair_highlight(runs: Vec<Node>) -> Vec<Node> {
    if !runs
        .iter()
        .any(|n| n.is_text() && n.text.as_deref().is_some_and(|t| t.contains("==")))
    {
        return runs;
    }

    let mut pieces = Vec::new();
    for node in runs {
        let eligible = node.is_text() && !node.has_mark(MarkType::Code);
        match node.text.as_deref() {
            Some(text) if eligible && text.contains("==") => split_delimiters(text, &node.marks, &mut pieces),
            _ => pieces.push(Piece::Run(node)),
        }
    }

    let mut openers: Vec<usize> = Vec::new();
    let mut pairs = Vec::new();
    for k in 0..pieces.len() {
        if let Piece::Delim { can_open, can_close, .. } = pieces[k] {
            if can_close {
                if let Some(open) = openers.pop() {
                    pairs.push((open, k));
                    continue;
                }
            }
            if can_open {
                openers.push(k);
            }
        }
    }

    for (open, close) in pairs {
        for piece in &mut pieces[open + 1..close] {
            if let Piece::Run(node) = piece {
                add_mark(&mut node.marks, Mark::new(MarkType::Highlight));
            }
        }
        for at in [open, close] {
            if let Piece::Delim { paired, .. } = &mut pieces[at] {
                *paired = true;
            }
        }
    }

    pieces
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Run(node) => Some(node),
            Piece::Delim { paired: true, .. } => None,
            Piece::Delim { marks, .. } => Some(Node::marked_text("==", marks)),
        })
        .collect()
}

fn split_delimiters(text: &str, marks: &[Mark], pieces: &mut Vec<Piece>) {
    let chars: Vec<char> = text.chars().collect();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '=' {
            let run = chars[i..].iter().take_while(|c| **c == '=').count();
            if run == 2 {
                if !literal.is_empty() {
                    pieces.push(Piece::Run(Node::marked_text(std::mem::take(&mut literal), marks.to_vec())));
                }
                let before = i.checked_sub(1).map(|b| chars[b]);
                let after = chars.get(i + 2).copied();
                pieces.push(Piece::Delim {
                    marks: marks.to_vec(),
                    can_open: after.is_some_and(|c| !c.is_whitespace()),
                    can_close: before.is_some_and(|c| !c.is_whitespace()),
                    paired: false,
                });
            } else {
                literal.extend(&chars[i..i + run]);
            }
            i += run;
        } else {
            literal.push(chars[i]);
            i += 1;
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Run(Node::marked_text(literal, marks.to_vec())));
    }
}

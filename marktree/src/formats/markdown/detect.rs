//! Line-ending and hard-break detection
//!
//! Classifies the conventions a markdown file was written with so the serializer can write it
//! back the same way. Fenced code is skipped: trailing spaces or backslashes inside a fence are
//! content, not line breaks.

use super::{HardBreakStyle, LineEnding, SourceStyle};

/// Inspect raw text and report its line-ending and hard-break conventions.
pub fn detect_style(text: &str) -> SourceStyle {
    SourceStyle {
        line_ending: detect_line_ending(text),
        hard_break_style: detect_hard_breaks(text),
    }
}

/// Any carriage return means CRLF, otherwise any newline means LF.
pub fn detect_line_ending(text: &str) -> LineEnding {
    if text.contains('\r') {
        LineEnding::Crlf
    } else if text.contains('\n') {
        LineEnding::Lf
    } else {
        LineEnding::Unknown
    }
}

pub fn detect_hard_breaks(text: &str) -> HardBreakStyle {
    let mut backslash = false;
    let mut two_spaces = false;
    let mut fence: Option<(char, usize)> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some((ch, len)) = fence_marker(line) {
            match fence {
                None => {
                    fence = Some((ch, len));
                    continue;
                }
                Some((open_ch, open_len)) if open_ch == ch && len >= open_len && is_closing(line) => {
                    fence = None;
                    continue;
                }
                Some(_) => {}
            }
        }
        if fence.is_some() || line.trim().is_empty() {
            continue;
        }
        if ends_with_hard_backslash(line) {
            backslash = true;
        } else if line.ends_with("  ") {
            two_spaces = true;
        }
    }

    match (backslash, two_spaces) {
        (true, true) => HardBreakStyle::Mixed,
        (true, false) => HardBreakStyle::Backslash,
        (false, true) => HardBreakStyle::TwoSpaces,
        (false, false) => HardBreakStyle::Unknown,
    }
}

/// A backtick or tilde fence of three or more, indented at most three spaces.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn is_closing(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c == '`' || c == '~')
}

/// An odd run of trailing backslashes; an even run is escaped backslashes.
fn ends_with_hard_backslash(line: &str) -> bool {
    let run = line.chars().rev().take_while(|c| *c == '\\').count();
    run % 2 == 1
}

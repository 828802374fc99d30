//! Context-sensitive escaping of text runs
//!
//! Escaping every punctuation character would round-trip, but it makes the saved file noisy and
//! produces large diffs against what the user typed. Characters are escaped only when the
//! surrounding textblock could give them meaning.

/// Facts about a whole textblock that decide whether a delimiter could pair up.
pub(super) struct EscapeContext {
    dollars: usize,
    tildes: usize,
    carets: usize,
    close_bracket: bool,
    pub(super) in_table: bool,
}

impl EscapeContext {
    pub(super) fn new(block_text: &str, in_table: bool) -> Self {
        let count = |ch: char| block_text.chars().filter(|c| *c == ch).count();
        EscapeContext {
            dollars: count('$'),
            tildes: count('~'),
            carets: count('^'),
            close_bracket: block_text.contains(']'),
            in_table,
        }
    }
}

/// Escaped text plus the indices of input characters that received a backslash.
pub(super) struct Escaped {
    pub text: String,
    pub escaped_at: Vec<usize>,
}

/// Escape `text`. `before` and `after` are the characters adjacent to the run in the same
/// textblock, and `line_start` says whether the run begins a markdown line.
pub(super) fn escape_text(
    text: &str,
    ctx: &EscapeContext,
    before: Option<char>,
    after: Option<char>,
    line_start: bool,
) -> Escaped {
    let chars: Vec<char> = text.chars().collect();
    if line_start {
        if let Some(at) = ordered_marker_delimiter(&chars) {
            // `1.` at line start: escape the delimiter rather than the digits.
            let head: String = chars[..at].iter().collect();
            let tail: String = chars[at + 1..].iter().collect();
            let rest = escape_text(&tail, ctx, Some(chars[at]), after, false);
            let mut escaped_at = vec![at];
            escaped_at.extend(rest.escaped_at.iter().map(|i| i + at + 1));
            return Escaped {
                text: format!("{head}\\{}{}", chars[at], rest.text),
                escaped_at,
            };
        }
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut escaped_at = Vec::new();
    for (i, &c) in chars.iter().enumerate() {
        let prev = if i == 0 { before } else { Some(chars[i - 1]) };
        let next = chars.get(i + 1).copied().or(after);
        let needs = match c {
            '*' | '`' => true,
            '_' => !(prev.is_some_and(char::is_alphanumeric) && next.is_some_and(char::is_alphanumeric)),
            '\\' => i + 1 == chars.len() || next.is_some_and(|n| n.is_ascii_punctuation()),
            '$' => ctx.dollars >= 2,
            '~' => ctx.tildes >= 2,
            '^' => ctx.carets >= 2,
            '[' => ctx.close_bracket,
            '<' => next.is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')),
            '&' => looks_like_entity(&chars[i + 1..]),
            '|' => ctx.in_table,
            _ => line_start && i == 0 && starts_block_syntax(&chars),
        };
        if needs {
            out.push('\\');
            escaped_at.push(i);
        }
        out.push(c);
    }

    Escaped {
        text: out,
        escaped_at,
    }
}

/// Markers that start a block when they begin a line.
fn starts_block_syntax(chars: &[char]) -> bool {
    let next = chars.get(1).copied();
    match chars.first() {
        Some('#') => next.map_or(true, |n| n == ' ' || n == '#'),
        Some('-') | Some('+') => next.map_or(true, |n| n == ' ' || n == '-'),
        Some('>') => true,
        Some('=') => chars.iter().all(|c| *c == '='),
        _ => false,
    }
}

/// Index of the `.` or `)` in a leading `123.` that would start an ordered list.
fn ordered_marker_delimiter(chars: &[char]) -> Option<usize> {
    let digits = chars.iter().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    match (chars.get(digits), chars.get(digits + 1)) {
        (Some('.') | Some(')'), None | Some(' ')) => Some(digits),
        _ => None,
    }
}

/// `&name;` or `&#123;` would be decoded as a character reference.
fn looks_like_entity(rest: &[char]) -> bool {
    let body = rest
        .iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == '#')
        .count();
    body > 0 && rest.get(body) == Some(&';')
}

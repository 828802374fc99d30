use marktree::formats::markdown::{detect_style, HardBreakStyle, LineEnding};

#[test]
fn hard_break_styles() {
    assert_eq!(detect_style("line  \nnext").hard_break_style, HardBreakStyle::TwoSpaces);
    assert_eq!(detect_style("line\\\nnext").hard_break_style, HardBreakStyle::Backslash);
    assert_eq!(
        detect_style("a  \nb\n\nc\\\nd").hard_break_style,
        HardBreakStyle::Mixed
    );
    assert_eq!(detect_style("plain\ntext\n").hard_break_style, HardBreakStyle::Unknown);
}

#[test]
fn fenced_code_is_ignored() {
    let text = "```\ncode line  \ncode line\\\n```\ntext line\\\nmore";
    assert_eq!(detect_style(text).hard_break_style, HardBreakStyle::Backslash);
}

#[test]
fn line_endings() {
    assert_eq!(detect_style("a\r\nb\r\n").line_ending, LineEnding::Crlf);
    assert_eq!(detect_style("a\nb\n").line_ending, LineEnding::Lf);
    assert_eq!(detect_style("a").line_ending, LineEnding::Unknown);
}

//! CJK text conventions
//!
//! Chinese and Japanese text does not separate words with spaces, so a soft line break between
//! two such characters must not turn into a space, and word counts treat each ideograph as a
//! word. Hangul is written with spaces and is only treated as CJK for counting.

/// Han ideographs, kana and CJK punctuation: scripts written without spaces.
pub fn is_spaceless(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F      // CJK symbols and punctuation
        | 0x3040..=0x309F    // Hiragana
        | 0x30A0..=0x30FF    // Katakana
        | 0x31F0..=0x31FF    // Katakana phonetic extensions
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0xFF00..=0xFFEF    // Halfwidth and fullwidth forms
        | 0x20000..=0x2FA1F  // CJK extensions B onwards
    )
}

pub fn is_hangul(c: char) -> bool {
    matches!(c as u32, 0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF)
}

/// Whether a soft break between `before` and `after` should vanish instead of becoming a space.
pub fn joins_without_space(before: Option<char>, after: Option<char>) -> bool {
    matches!((before, after), (Some(a), Some(b)) if is_spaceless(a) && is_spaceless(b))
}

/// Word count where every spaceless CJK character is one word and other text is split on
/// whitespace.
pub fn count_words(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for c in text.chars() {
        if is_spaceless(c) && !c.is_ascii_punctuation() && !is_cjk_punctuation(c) {
            count += 1;
            in_word = false;
        } else if c.is_whitespace() || is_cjk_punctuation(c) {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }
    count
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c as u32, 0x3000..=0x303F | 0xFF01..=0xFF0F | 0xFF1A..=0xFF20)
}

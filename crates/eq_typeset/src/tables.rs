//! Process-wide character classification tables.
//!
//! Built once behind `OnceLock` and shared read-only across every
//! typesetter instance. The sets drive structural-operator recognition,
//! math styling, kerning, and stretchy-bracer detection.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Opening delimiter characters.
pub fn left_bracket_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| ['(', '[', '{', '\u{27E8}', '\u{2308}', '\u{230A}'].into_iter().collect())
}

/// Closing delimiter characters.
pub fn right_bracket_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| [')', ']', '}', '\u{27E9}', '\u{2309}', '\u{230B}'].into_iter().collect())
}

/// Opening delimiters that may stretch to content height.
pub fn left_stretchy_bracer_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| ['(', '[', '{', '\u{27E8}'].into_iter().collect())
}

/// Closing delimiters that may stretch to content height.
pub fn right_stretchy_bracer_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| [')', ']', '}', '\u{27E9}'].into_iter().collect())
}

/// Symmetric vertical delimiters (absolute value, norm).
pub fn vertical_stretchy_bracer_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| ['|', '\u{2016}'].into_iter().collect())
}

/// Every character the bracer assembler knows how to stretch.
pub fn stretchy_bracer_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        left_stretchy_bracer_characters()
            .iter()
            .chain(right_stretchy_bracer_characters())
            .chain(vertical_stretchy_bracer_characters())
            .copied()
            .collect()
    })
}

/// N-ary operators drawn at large-op size.
pub fn large_op_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            '\u{2211}', '\u{220F}', '\u{2210}', '\u{222B}', '\u{222C}', '\u{222D}',
            '\u{222E}', '\u{22C3}', '\u{22C2}', '\u{22C1}', '\u{22C0}',
        ]
        .into_iter()
        .collect()
    })
}

/// Large operators whose limits stack above/below (sum-class, not integrals).
pub fn sum_op_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        ['\u{2211}', '\u{220F}', '\u{2210}', '\u{22C3}', '\u{22C2}', '\u{22C1}', '\u{22C0}']
            .into_iter()
            .collect()
    })
}

/// Latin and greek characters whose ink drops below the baseline.
pub fn descender_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            'g', 'j', 'p', 'q', 'y', '\u{03B2}', '\u{03B3}', '\u{03B6}', '\u{03B7}',
            '\u{03BC}', '\u{03BE}', '\u{03C1}', '\u{03C2}', '\u{03C6}', '\u{03C7}',
            '\u{03C8}',
        ]
        .into_iter()
        .collect()
    })
}

/// Characters that take an italic-correction kern when followed by an
/// upright character.
pub fn italic_adjust_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        ['f', 'j', 'A', 'T', 'V', 'W', 'Y', '\u{0393}', '\u{03A5}'].into_iter().collect()
    })
}

/// Function names rendered upright instead of italic.
pub fn function_names() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "sin", "cos", "tan", "sec", "csc", "cot", "arcsin", "arccos", "arctan",
            "sinh", "cosh", "tanh", "log", "ln", "lg", "exp", "lim", "max", "min",
            "sup", "inf", "det", "dim", "ker", "deg", "arg", "gcd", "mod",
        ]
        .into_iter()
        .collect()
    })
}

/// Binary operators that keep surrounding spacing.
pub fn binomial_operator_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            '+', '\u{2212}', '-', '\u{00D7}', '\u{00F7}', '\u{22C5}', '=', '<', '>',
            '\u{2260}', '\u{2264}', '\u{2265}', '\u{2248}', '\u{2261}', '\u{00B1}',
            '\u{2213}', '\u{2208}', '\u{2209}', '\u{2282}', '\u{2283}', '\u{2286}',
            '\u{2287}', '\u{2227}', '\u{2228}', '\u{21D2}', '\u{21D4}', '\u{2192}',
        ]
        .into_iter()
        .collect()
    })
}

/// Prefix/postfix operators that bind tight to one operand.
pub fn unary_operator_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        ['\u{00AC}', '!', '\u{2032}', '\u{2033}', '\u{2207}', '\u{2202}'].into_iter().collect()
    })
}

/// Combining accent operators drawn over a base.
pub fn accent_op_characters() -> &'static HashSet<char> {
    static SET: OnceLock<HashSet<char>> = OnceLock::new();
    SET.get_or_init(|| {
        ['\u{0302}', '\u{0303}', '\u{0304}', '\u{0305}', '\u{20D7}', '\u{0307}', '\u{0308}']
            .into_iter()
            .collect()
    })
}

/// Whether the character is any recognized operator.
pub fn is_operator_char(ch: char) -> bool {
    binomial_operator_characters().contains(&ch)
        || unary_operator_characters().contains(&ch)
        || large_op_characters().contains(&ch)
        || ch == '/'
}

pub fn is_greek_lowercase(ch: char) -> bool {
    ('\u{03B1}'..='\u{03C9}').contains(&ch)
}

pub fn is_greek_uppercase(ch: char) -> bool {
    ('\u{0391}'..='\u{03A9}').contains(&ch)
}

pub fn is_greek(ch: char) -> bool {
    is_greek_lowercase(ch) || is_greek_uppercase(ch)
}

// ---------------------------------------------------------------------------
// Math alphanumeric mapping
//
// Maps plain latin letters into the Unicode math alphanumeric planes for
// script, fraktur, and double-struck variants. The legacy letterlike block
// holds a handful of exceptions that predate the SMP ranges.
// ---------------------------------------------------------------------------

fn offset_char(base: u32, plain_base: char, ch: char) -> char {
    char::from_u32(base + (ch as u32 - plain_base as u32)).unwrap_or(ch)
}

/// Map a latin letter to its script (calligraphic) form.
pub fn script_char(ch: char) -> char {
    match ch {
        'B' => '\u{212C}',
        'E' => '\u{2130}',
        'F' => '\u{2131}',
        'H' => '\u{210B}',
        'I' => '\u{2110}',
        'L' => '\u{2112}',
        'M' => '\u{2133}',
        'R' => '\u{211B}',
        'A'..='Z' => offset_char(0x1D49C, 'A', ch),
        'e' => '\u{212F}',
        'g' => '\u{210A}',
        'o' => '\u{2134}',
        'a'..='z' => offset_char(0x1D4B6, 'a', ch),
        _ => ch,
    }
}

/// Map a latin letter to its fraktur form.
pub fn fraktur_char(ch: char) -> char {
    match ch {
        'C' => '\u{212D}',
        'H' => '\u{210C}',
        'I' => '\u{2111}',
        'R' => '\u{211C}',
        'Z' => '\u{2128}',
        'A'..='Z' => offset_char(0x1D504, 'A', ch),
        'a'..='z' => offset_char(0x1D51E, 'a', ch),
        _ => ch,
    }
}

/// Map a latin letter or digit to its double-struck (blackboard) form.
pub fn double_struck_char(ch: char) -> char {
    match ch {
        'C' => '\u{2102}',
        'H' => '\u{210D}',
        'N' => '\u{2115}',
        'P' => '\u{2119}',
        'Q' => '\u{211A}',
        'R' => '\u{211D}',
        'Z' => '\u{2124}',
        'A'..='Z' => offset_char(0x1D538, 'A', ch),
        'a'..='z' => offset_char(0x1D552, 'a', ch),
        '0'..='9' => offset_char(0x1D7D8, '0', ch),
        _ => ch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_sets_are_disjoint() {
        for ch in left_bracket_characters() {
            assert!(!right_bracket_characters().contains(ch));
        }
    }

    #[test]
    fn test_stretchy_union_covers_verticals() {
        assert!(stretchy_bracer_characters().contains(&'|'));
        assert!(stretchy_bracer_characters().contains(&'('));
        assert!(stretchy_bracer_characters().contains(&'}'));
    }

    #[test]
    fn test_sum_ops_are_large_ops() {
        for ch in sum_op_characters() {
            assert!(large_op_characters().contains(ch));
        }
        // Integrals are large ops but not sum-class.
        assert!(!sum_op_characters().contains(&'\u{222B}'));
    }

    #[test]
    fn test_greek_classification() {
        assert!(is_greek_lowercase('\u{03C0}'));
        assert!(is_greek_uppercase('\u{03A3}'));
        assert!(!is_greek('x'));
    }

    #[test]
    fn test_script_exceptions() {
        assert_eq!(script_char('H'), '\u{210B}');
        assert_eq!(script_char('e'), '\u{212F}');
        assert_eq!(script_char('A'), '\u{1D49C}');
    }

    #[test]
    fn test_double_struck_exceptions() {
        assert_eq!(double_struck_char('R'), '\u{211D}');
        assert_eq!(double_struck_char('Z'), '\u{2124}');
        assert_eq!(double_struck_char('A'), '\u{1D538}');
        assert_eq!(double_struck_char('1'), '\u{1D7D9}');
    }

    #[test]
    fn test_non_letters_pass_through() {
        assert_eq!(script_char('+'), '+');
        assert_eq!(fraktur_char('3'), '3');
    }

    #[test]
    fn test_operator_classification() {
        assert!(is_operator_char('+'));
        assert!(is_operator_char('/'));
        assert!(is_operator_char('\u{2211}'));
        assert!(!is_operator_char('x'));
    }
}

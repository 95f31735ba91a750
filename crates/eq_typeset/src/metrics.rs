//! Font metrics provider contract and default implementation.
//!
//! The engine never touches font files; it consumes an opaque, read-only
//! metrics service. `TextFontMetrics` supplies em-derived defaults so the
//! engine is usable without a platform font stack.

use serde::{Deserialize, Serialize};

/// Base font size in points for a top-level equation line.
pub const DEFAULT_FONT_SIZE: f32 = 24.0;
/// Font size for first-level scripts (sub/superscripts, limits, n-root indices).
pub const DEFAULT_FONT_SIZE_SMALL: f32 = 18.0;
/// Font size for scripts nested beyond the first level.
pub const DEFAULT_FONT_SIZE_SMALLER: f32 = 14.0;
/// Font size for large operators rendered inline.
pub const DEFAULT_FONT_SIZE_LARGE: f32 = 28.0;
/// Font size for large integral glyphs.
pub const DEFAULT_FONT_SIZE_LARGE_INTEGRAL: f32 = 36.0;

/// Script scale cascade class, resolved by walking parent stems.
///
/// A node nested inside one script level uses `Smaller`; beyond that,
/// `Smallest`. The class is a query over the tree, never stored on nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SizeClass {
    #[default]
    Regular,
    Smaller,
    Smallest,
}

impl SizeClass {
    /// The point size this class maps to.
    pub fn font_size(self) -> f32 {
        match self {
            SizeClass::Regular => DEFAULT_FONT_SIZE,
            SizeClass::Smaller => DEFAULT_FONT_SIZE_SMALL,
            SizeClass::Smallest => DEFAULT_FONT_SIZE_SMALLER,
        }
    }

    /// The next class down the cascade. Bottoms out at `Smallest`.
    pub fn reduced(self) -> Self {
        match self {
            SizeClass::Regular => SizeClass::Smaller,
            SizeClass::Smaller | SizeClass::Smallest => SizeClass::Smallest,
        }
    }
}

/// Read-only font metrics service the engine consumes.
///
/// All values are in points for the requested font size. Implementations
/// must be pure: the same inputs always produce the same outputs, which is
/// what makes repeated layout passes idempotent.
pub trait FontMetrics {
    /// Height above the baseline.
    fn ascent(&self, font_size: f32) -> f32;

    /// Depth below the baseline (positive value).
    fn descent(&self, font_size: f32) -> f32;

    /// Height of a lowercase x; anchors script and fraction axis offsets.
    fn x_height(&self, font_size: f32) -> f32;

    /// Horizontal advance for a character.
    fn advance(&self, ch: char, font_size: f32) -> f32;

    /// Thickness for fraction bars, overlines, and supplemental lines.
    fn rule_thickness(&self, font_size: f32) -> f32;

    /// Italic-correction kern applied after a slanted character.
    fn italic_correction(&self, ch: char, font_size: f32) -> f32;

    /// Height covered by one stretchy-bracer piece glyph.
    fn bracer_piece_height(&self, font_size: f32) -> f32;

    /// Advance width of an assembled bracer stack for this character.
    fn bracer_piece_width(&self, ch: char, font_size: f32) -> f32;

    /// Full line height (ascent plus descent).
    fn line_height(&self, font_size: f32) -> f32 {
        self.ascent(font_size) + self.descent(font_size)
    }
}

/// Default metrics derived from em fractions of the requested size.
///
/// Calibrated against a typical serif math face. A host with a real font
/// stack substitutes its own `FontMetrics` implementation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TextFontMetrics;

impl FontMetrics for TextFontMetrics {
    fn ascent(&self, font_size: f32) -> f32 {
        font_size * 0.80
    }

    fn descent(&self, font_size: f32) -> f32 {
        font_size * 0.20
    }

    fn x_height(&self, font_size: f32) -> f32 {
        font_size * 0.45
    }

    fn advance(&self, ch: char, font_size: f32) -> f32 {
        // Narrow punctuation and wide operators get rough class widths.
        let em = match ch {
            '.' | ',' | ':' | ';' | '\'' | '|' => 0.28,
            'i' | 'j' | 'l' | '!' | '(' | ')' | '[' | ']' => 0.33,
            'm' | 'w' | 'M' | 'W' => 0.78,
            '\u{2211}' | '\u{220F}' | '\u{222B}' => 0.72,
            _ => 0.50,
        };
        font_size * em
    }

    fn rule_thickness(&self, font_size: f32) -> f32 {
        font_size * 0.04
    }

    fn italic_correction(&self, ch: char, font_size: f32) -> f32 {
        if ch.is_alphabetic() && ch.is_lowercase() {
            font_size * 0.03
        } else if ch.is_alphabetic() {
            font_size * 0.05
        } else {
            0.0
        }
    }

    fn bracer_piece_height(&self, font_size: f32) -> f32 {
        font_size * 0.90
    }

    fn bracer_piece_width(&self, ch: char, font_size: f32) -> f32 {
        let em = match ch {
            '{' | '}' => 0.48,
            '|' | '\u{2016}' => 0.30,
            _ => 0.40,
        };
        font_size * em
    }
}

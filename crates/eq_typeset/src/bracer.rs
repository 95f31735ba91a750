//! Stretchy bracer assembly.
//!
//! A bracket enclosing tall content is rendered as a stack of piece glyphs
//! from the Unicode bracket-pieces block rather than one scaled glyph. The
//! assembler picks the smallest assembly kind whose capacity covers the
//! target height, tiling extender pieces when no fixed kind is tall enough.

use crate::geometry::{Point, Rect};
use crate::metrics::FontMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Assembly kinds ordered by height capacity.
///
/// Selection is monotone per character: a taller target never picks an
/// earlier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BracerKind {
    /// Single plain glyph, no assembly.
    Empty,
    /// Top and bottom piece.
    TopBottom,
    /// Mid and bottom piece.
    MidBottom,
    /// Top, mid, and bottom piece.
    TopMidBottom,
    /// Fixed pieces plus tiled extenders covering the residual height.
    TopMidBottomExt,
}

/// Piece glyphs available for one logical bracket character.
#[derive(Debug, Clone, Copy)]
struct PieceSet {
    top: Option<char>,
    mid: Option<char>,
    bottom: Option<char>,
    ext: Option<char>,
}

fn piece_table() -> &'static HashMap<char, PieceSet> {
    static TABLE: OnceLock<HashMap<char, PieceSet>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert('(', PieceSet { top: Some('\u{239B}'), mid: None, bottom: Some('\u{239D}'), ext: Some('\u{239C}') });
        m.insert(')', PieceSet { top: Some('\u{239E}'), mid: None, bottom: Some('\u{23A0}'), ext: Some('\u{239F}') });
        m.insert('[', PieceSet { top: Some('\u{23A1}'), mid: None, bottom: Some('\u{23A3}'), ext: Some('\u{23A2}') });
        m.insert(']', PieceSet { top: Some('\u{23A4}'), mid: None, bottom: Some('\u{23A6}'), ext: Some('\u{23A5}') });
        m.insert('{', PieceSet { top: Some('\u{23A7}'), mid: Some('\u{23A8}'), bottom: Some('\u{23A9}'), ext: Some('\u{23AA}') });
        m.insert('}', PieceSet { top: Some('\u{23AB}'), mid: Some('\u{23AC}'), bottom: Some('\u{23AD}'), ext: Some('\u{23AA}') });
        m.insert('|', PieceSet { top: None, mid: None, bottom: None, ext: Some('\u{23D0}') });
        m.insert('\u{2016}', PieceSet { top: None, mid: None, bottom: None, ext: Some('\u{23D0}') });
        m
    })
}

/// Tallest height a single unassembled glyph may cover, as an em multiple.
const SINGLE_GLYPH_FACTOR: f32 = 1.4;
/// Capacity multiples of the piece height for each fixed assembly kind.
const TOP_BOTTOM_CAP: f32 = 2.0;
const MID_BOTTOM_CAP: f32 = 2.5;
const TOP_MID_BOTTOM_CAP: f32 = 3.0;

/// One glyph of an assembled stack, positioned in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionedGlyph {
    pub ch: char,
    pub origin: Point,
    pub font_size: f32,
}

/// A composed multi-glyph delimiter standing in for one logical character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchyBracer {
    pub character: char,
    pub kind: BracerKind,
    pub glyphs: Vec<PositionedGlyph>,
    pub target_height: f32,
    pub origin: Point,
    pub font_size: f32,
    advance_width: f32,
    kern_adjustment: f32,
    pub descender_point: Option<Point>,
    /// Height the glyph stack actually covers; at least `target_height`.
    covered_height: f32,
}

impl StretchyBracer {
    /// Horizontal advance consumed by the assembled stack. Generally wider
    /// than the plain glyph, which is why siblings re-flow afterwards.
    pub fn advance_width(&self) -> f32 {
        self.advance_width
    }

    /// Italic-correction-style kern against the previous character.
    pub fn kern_adjustment(&self) -> f32 {
        self.kern_adjustment
    }

    /// Ink bounding box of the full assembly, including any descender
    /// overshoot below the baseline.
    pub fn bounds(&self) -> Rect {
        let mut height = self.glyph_stack_height();
        if let Some(p) = self.descender_point {
            let overshoot = p.y - (self.origin.y + height);
            if overshoot > 0.0 {
                height += overshoot;
            }
        }
        Rect::new(self.origin.x, self.origin.y, self.advance_width, height)
    }

    fn glyph_stack_height(&self) -> f32 {
        match self.glyphs.last() {
            Some(_) => self.target_height.max(self.covered_height),
            None => 0.0,
        }
    }

    /// The plain placeholder form of the logical character, used before a
    /// recomputed assembly is attached.
    pub fn clear_character(&self) -> String {
        self.character.to_string()
    }

    /// Record the lowest ink point the bottom glyph reaches below the
    /// baseline, for descender-aware row adjustment.
    pub fn set_descender_point(&mut self, point: Point) {
        self.descender_point = Some(point);
    }

    /// Whether this assembly tiles extender glyphs.
    pub fn uses_extenders(&self) -> bool {
        self.kind == BracerKind::TopMidBottomExt
    }
}

/// Pick the assembly kind for a character and target height.
///
/// Exposed separately from `assemble` so the monotonicity property can be
/// checked without building glyph stacks.
pub fn kind_for_height(ch: char, target_height: f32, font_size: f32, metrics: &dyn FontMetrics) -> BracerKind {
    let single_max = font_size * SINGLE_GLYPH_FACTOR;
    if target_height <= single_max {
        return BracerKind::Empty;
    }
    let pieces = match piece_table().get(&ch) {
        Some(p) => p,
        // Unknown delimiter: nothing to assemble from, keep the plain glyph.
        None => return BracerKind::Empty,
    };
    let ph = metrics.bracer_piece_height(font_size);

    let has_top_bottom = pieces.top.is_some() && pieces.bottom.is_some();
    let has_mid_bottom = pieces.mid.is_some() && pieces.bottom.is_some();
    let has_all_three = has_top_bottom && pieces.mid.is_some();

    if has_top_bottom && target_height <= ph * TOP_BOTTOM_CAP {
        BracerKind::TopBottom
    } else if has_mid_bottom && target_height <= ph * MID_BOTTOM_CAP {
        BracerKind::MidBottom
    } else if has_all_three && target_height <= ph * TOP_MID_BOTTOM_CAP {
        BracerKind::TopMidBottom
    } else {
        BracerKind::TopMidBottomExt
    }
}

/// Build the glyph assembly for a logical bracket character.
///
/// `origin` is the top-left of the assembly box; glyph origins are computed
/// bottom-up so extender tiling always closes the gap to the bottom piece.
pub fn assemble(
    ch: char,
    target_height: f32,
    origin: Point,
    use_kern: bool,
    font_size: f32,
    metrics: &dyn FontMetrics,
) -> StretchyBracer {
    let kind = kind_for_height(ch, target_height, font_size, metrics);
    let ph = metrics.bracer_piece_height(font_size);
    let width = metrics.bracer_piece_width(ch, font_size);
    let kern_adjustment = if use_kern {
        metrics.italic_correction(ch, font_size).max(font_size * 0.04)
    } else {
        0.0
    };

    tracing::debug!(
        character = %ch,
        target_height,
        ?kind,
        "assembling stretchy bracer"
    );

    let pieces = piece_table().get(&ch).copied().unwrap_or(PieceSet {
        top: None,
        mid: None,
        bottom: None,
        ext: None,
    });

    // Names of the piece characters participating, top to bottom, with the
    // count of extenders to insert at each gap.
    let mut stack: Vec<char> = Vec::new();
    match kind {
        BracerKind::Empty => {
            stack.push(ch);
        }
        BracerKind::TopBottom => {
            stack.push(pieces.top.unwrap_or(ch));
            stack.push(pieces.bottom.unwrap_or(ch));
        }
        BracerKind::MidBottom => {
            stack.push(pieces.mid.unwrap_or(ch));
            stack.push(pieces.bottom.unwrap_or(ch));
        }
        BracerKind::TopMidBottom => {
            stack.push(pieces.top.unwrap_or(ch));
            stack.push(pieces.mid.unwrap_or(ch));
            stack.push(pieces.bottom.unwrap_or(ch));
        }
        BracerKind::TopMidBottomExt => {
            let ext = pieces.ext.unwrap_or(ch);
            let fixed_count = pieces.top.is_some() as usize
                + pieces.mid.is_some() as usize
                + pieces.bottom.is_some() as usize;
            let fixed_height = fixed_count as f32 * ph;
            let residual = (target_height - fixed_height).max(0.0);
            let ext_count = (residual / ph).ceil() as usize;
            let ext_count = ext_count.max(if fixed_count == 0 { 1 } else { 0 });

            if let Some(top) = pieces.top {
                stack.push(top);
            }
            if let Some(mid) = pieces.mid {
                // Split the extenders evenly around the mid piece; the lower
                // gap takes the odd one so the mid piece never rides high.
                let upper = ext_count / 2;
                let lower = ext_count - upper;
                stack.extend(std::iter::repeat(ext).take(upper));
                stack.push(mid);
                stack.extend(std::iter::repeat(ext).take(lower));
            } else {
                stack.extend(std::iter::repeat(ext).take(ext_count));
            }
            if let Some(bottom) = pieces.bottom {
                stack.push(bottom);
            }
        }
    }

    let piece_height = if kind == BracerKind::Empty { metrics.line_height(font_size) } else { ph };
    let covered_height = stack.len() as f32 * piece_height;
    let stack_bottom = origin.y + target_height.max(covered_height);

    // Origins bottom-up: the last glyph in the stack sits flush with the
    // bottom of the assembly box, each earlier glyph one piece above.
    let count = stack.len();
    let glyphs = stack
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let from_bottom = (count - 1 - i) as f32;
            PositionedGlyph {
                ch: piece,
                origin: Point::new(origin.x, stack_bottom - (from_bottom + 1.0) * piece_height),
                font_size,
            }
        })
        .collect();

    StretchyBracer {
        character: ch,
        kind,
        glyphs,
        target_height,
        origin,
        font_size,
        advance_width: width + font_size * 0.05,
        kern_adjustment,
        descender_point: None,
        covered_height,
    }
}

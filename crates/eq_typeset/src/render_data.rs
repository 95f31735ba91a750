//! Render data - the terminal "leaf" of the equation tree
//!
//! A leaf holds one styled text run plus its computed draw geometry and any
//! stretchy-character assemblies substituted into sub-ranges of the run.
//! Geometry is valid only after the most recent layout pass over the
//! owning stem; every mutation bumps the revision counter so a pass can
//! tell stale leaves from clean ones.

use crate::bracer::StretchyBracer;
use crate::geometry::{Point, Rect, Size};
use crate::metrics::FontMetrics;
use crate::parsed::{MathVariant, ParsedLeaf};
use crate::tables;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Per-run style attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub variant: MathVariant,
    pub font_size: f32,
    /// Kern applied after the run when packed into a row.
    pub kern: f32,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            variant: MathVariant::Normal,
            font_size: crate::metrics::DEFAULT_FONT_SIZE,
            kern: 0.0,
        }
    }
}

/// A stretchy assembly attached to a sub-range of the run.
///
/// At draw time the range is replaced by the composed glyph stack instead
/// of the plain character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchyRecord {
    pub range: Range<usize>,
    pub bracer: StretchyBracer,
}

/// A terminal typeset unit: styled text run plus computed draw geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderData {
    pub text: String,
    pub style: RunStyle,
    /// Source character range this run covers.
    pub parsed_range: Range<usize>,

    pub draw_origin: Point,
    pub baseline_origin: Point,
    pub draw_size: Size,
    /// Logical advance box used for cursor placement and sibling packing.
    pub bounding_rect_typographic: Rect,
    /// Ink box including stretchy-glyph and descender overshoot.
    pub bounding_rect_image: Rect,

    pub has_auto_replaced_space: bool,
    pub has_large_op_attr: bool,
    pub has_stretchy_attr: bool,
    /// Extra advance for explicit-space leaves, in points.
    pub width_space: f32,
    pub stored_kern: f32,
    pub stretchy_descender_point: Option<Point>,

    stretchy_records: Vec<StretchyRecord>,

    /// Bumped on every text/style mutation.
    revision: u64,
    /// Revision last observed by a layout pass.
    laid_out_revision: u64,
}

impl RenderData {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        Self {
            text,
            style: RunStyle::default(),
            parsed_range: 0..len,
            draw_origin: Point::origin(),
            baseline_origin: Point::origin(),
            draw_size: Size::zero(),
            bounding_rect_typographic: Rect::default(),
            bounding_rect_image: Rect::default(),
            has_auto_replaced_space: false,
            has_large_op_attr: false,
            has_stretchy_attr: false,
            width_space: 0.0,
            stored_kern: 0.0,
            stretchy_descender_point: None,
            stretchy_records: Vec::new(),
            revision: 1,
            laid_out_revision: 0,
        }
    }

    pub fn with_style(text: impl Into<String>, style: RunStyle) -> Self {
        let mut data = Self::new(text);
        data.style = style;
        data
    }

    /// Build a leaf from an input descriptor, carrying over its attributes.
    pub fn from_parsed(leaf: &ParsedLeaf, font_size: f32) -> Self {
        let mut data = Self::new(leaf.text.clone());
        data.style = RunStyle {
            variant: leaf.variant,
            font_size,
            kern: 0.0,
        };
        data.parsed_range = leaf.parsed_range.clone();
        data.has_stretchy_attr = leaf.has_stretchy_attr;
        data.has_large_op_attr = leaf.has_large_op_attr;
        data.width_space = leaf.width_space * font_size;
        data
    }

    // -- revision tracking ---------------------------------------------------

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether geometry is stale relative to the last layout pass.
    pub fn is_dirty(&self) -> bool {
        self.revision != self.laid_out_revision
    }

    pub fn mark_laid_out(&mut self) {
        self.laid_out_revision = self.revision;
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // -- run mutation --------------------------------------------------------

    pub fn append_str(&mut self, s: &str) {
        self.text.push_str(s);
        self.parsed_range.end += s.chars().count();
        self.bump();
    }

    /// Replace a character range (char indices) with new text.
    /// Out-of-range positions are clamped to the run length.
    pub fn replace_range(&mut self, range: Range<usize>, replacement: &str) {
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end);
        self.text.replace_range(start..end, replacement);
        self.parsed_range.end = self.parsed_range.start + self.text.chars().count();
        self.stretchy_records.clear();
        self.bump();
    }

    pub fn delete_range(&mut self, range: Range<usize>) {
        self.replace_range(range, "");
    }

    pub fn insert_text_at(&mut self, position: usize, text: &str) {
        let at = self.byte_offset(position);
        self.text.insert_str(at, text);
        self.parsed_range.end += text.chars().count();
        self.bump();
    }

    pub fn set_style(&mut self, style: RunStyle) {
        if self.style != style {
            self.style = style;
            self.bump();
        }
    }

    /// Fold a compatible adjacent leaf into this one, extending the parsed
    /// range and dropping the merged leaf's geometry (recomputed next pass).
    pub fn merge_with(&mut self, other: &RenderData) {
        self.text.push_str(&other.text);
        let start = self.parsed_range.start.min(other.parsed_range.start);
        let end = self.parsed_range.end.max(other.parsed_range.end);
        self.parsed_range = start..end;
        self.width_space += other.width_space;
        self.bump();
    }

    /// Whether `other` shares enough style to merge into this run.
    pub fn can_merge_with(&self, other: &RenderData) -> bool {
        self.style == other.style
            && !self.has_stretchy_attr
            && !other.has_stretchy_attr
            && !self.has_large_op_attr
            && !other.has_large_op_attr
            && self.stretchy_records.is_empty()
            && other.stretchy_records.is_empty()
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    // -- measuring -----------------------------------------------------------

    /// Recompute draw size and both bounding rects from the current run.
    /// Called by the layout pass; records the observed revision.
    pub fn measure(&mut self, metrics: &dyn FontMetrics) {
        let fs = self.style.font_size;
        let mut width: f32 = self.text.chars().map(|c| metrics.advance(c, fs)).sum();
        width += self.width_space;
        let height = metrics.line_height(fs);

        self.draw_size = Size::new(width, height);
        self.baseline_origin = Point::new(self.draw_origin.x, self.draw_origin.y + metrics.ascent(fs));
        self.bounding_rect_typographic =
            Rect::from_origin_size(self.draw_origin, self.draw_size);

        // Ink bounds: descender characters overshoot the typographic box.
        let mut image = self.bounding_rect_typographic;
        if self.text.chars().any(|c| tables::descender_characters().contains(&c)) {
            image.size.height += fs * 0.05;
        }
        self.bounding_rect_image = image;
        self.mark_laid_out();
    }

    /// Logical advance box.
    pub fn typographic_bounds(&self) -> Rect {
        self.bounding_rect_typographic
    }

    /// Logical advance box extended by attached stretchy assemblies.
    pub fn typographic_bounds_with_stretchy(&self) -> Rect {
        self.stretchy_records
            .iter()
            .fold(self.bounding_rect_typographic, |acc, r| acc.union(r.bracer.bounds()))
    }

    /// Ink box.
    pub fn image_bounds(&self) -> Rect {
        self.bounding_rect_image
    }

    /// Ink box extended by attached stretchy assemblies and any recorded
    /// descender point.
    pub fn image_bounds_with_stretchy(&self) -> Rect {
        let mut bounds = self
            .stretchy_records
            .iter()
            .fold(self.bounding_rect_image, |acc, r| acc.union(r.bracer.bounds()));
        if let Some(p) = self.stretchy_descender_point {
            if p.y > bounds.bottom() {
                bounds.size.height = p.y - bounds.y();
            }
        }
        bounds
    }

    // -- stretchy character data ---------------------------------------------

    /// Attach a computed bracer assembly to a sub-range of the run.
    pub fn add_stretchy_data(&mut self, bracer: StretchyBracer, range: Range<usize>) {
        if let Some(p) = bracer.descender_point {
            self.stretchy_descender_point = Some(p);
        }
        self.stretchy_records.push(StretchyRecord { range, bracer });
        self.bump();
    }

    /// Drop all attached assemblies; used before recomputing new ones.
    pub fn reset_stretchy_data(&mut self) {
        if !self.stretchy_records.is_empty() {
            self.stretchy_records.clear();
            self.stretchy_descender_point = None;
            self.bump();
        }
    }

    pub fn has_stretchy_data(&self) -> bool {
        !self.stretchy_records.is_empty()
    }

    /// The run with stretchy sub-ranges reset to plain placeholder form.
    pub fn clear_stretchy_string(&self) -> String {
        self.text.clone()
    }

    pub fn stretchy_ranges(&self) -> Vec<Range<usize>> {
        self.stretchy_records.iter().map(|r| r.range.clone()).collect()
    }

    pub fn stretchy_records(&self) -> &[StretchyRecord] {
        &self.stretchy_records
    }

    /// Assemblies that tile extender glyphs.
    pub fn stretchy_extenders(&self) -> Vec<&StretchyBracer> {
        self.stretchy_records
            .iter()
            .map(|r| &r.bracer)
            .filter(|b| b.uses_extenders())
            .collect()
    }

    /// Assemblies whose bottom glyph drops below the baseline.
    pub fn stretchy_descenders(&self) -> Vec<&StretchyBracer> {
        self.stretchy_records
            .iter()
            .map(|r| &r.bracer)
            .filter(|b| b.descender_point.is_some())
            .collect()
    }

    pub fn contains_stretchy_descenders(&self) -> bool {
        self.stretchy_records.iter().any(|r| r.bracer.descender_point.is_some())
    }

    /// Text pieces outside any stretchy range, with their char offsets.
    /// The renderer draws these as runs and the stretchy ranges as stacks.
    pub fn plain_segments(&self) -> Vec<(usize, String)> {
        if self.stretchy_records.is_empty() {
            return vec![(0, self.text.clone())];
        }
        let mut covered: Vec<Range<usize>> = self.stretchy_ranges();
        covered.sort_by_key(|r| r.start);
        let chars: Vec<char> = self.text.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0usize;
        for range in covered {
            if range.start > pos {
                segments.push((pos, chars[pos..range.start.min(chars.len())].iter().collect()));
            }
            pos = pos.max(range.end);
        }
        if pos < chars.len() {
            segments.push((pos, chars[pos..].iter().collect()));
        }
        segments
    }

    // -- layout adjustment ---------------------------------------------------

    /// Translate this leaf and its attached assemblies.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.draw_origin = self.draw_origin.offset(dx, dy);
        self.baseline_origin = self.baseline_origin.offset(dx, dy);
        self.bounding_rect_typographic = self.bounding_rect_typographic.translated(dx, dy);
        self.bounding_rect_image = self.bounding_rect_image.translated(dx, dy);
        for record in &mut self.stretchy_records {
            record.bracer.origin = record.bracer.origin.offset(dx, dy);
            for glyph in &mut record.bracer.glyphs {
                glyph.origin = glyph.origin.offset(dx, dy);
            }
        }
        if let Some(p) = &mut self.stretchy_descender_point {
            *p = p.offset(dx, dy);
        }
    }

    /// Translate this leaf and its attached assemblies horizontally.
    pub fn shift_layout_horizontally(&mut self, dx: f32) {
        self.translate(dx, 0.0);
    }

    /// Move the leaf so its draw origin lands at `origin`.
    pub fn move_to(&mut self, origin: Point) {
        let dx = origin.x - self.draw_origin.x;
        let dy = origin.y - self.draw_origin.y;
        if dx != 0.0 || dy != 0.0 {
            self.translate(dx, dy);
        }
    }
}

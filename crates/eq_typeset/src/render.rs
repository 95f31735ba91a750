//! Render output - positioned draw primitives for a host drawing surface.
//!
//! The renderer walks a laid-out tree and flattens it into absolute-
//! coordinate primitives. It draws nothing itself; the host maps text runs
//! onto its text API, lines onto stroked paths, and glyph stacks onto
//! individual glyph placements.

use crate::bracer::PositionedGlyph;
use crate::geometry::{Point, Rect};
use crate::layout::LayoutEngine;
use crate::metrics::FontMetrics;
use crate::render_data::{RenderData, RunStyle};
use crate::tree::{EqTree, Node, NodeId, StemType};
use serde::{Deserialize, Serialize};

/// One drawable unit in absolute equation coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawPrimitive {
    TextRun {
        text: String,
        origin: Point,
        style: RunStyle,
    },
    Line {
        start: Point,
        end: Point,
        thickness: f32,
    },
    /// An assembled stretchy bracket: pieces drawn at fixed positions.
    GlyphStack { glyphs: Vec<PositionedGlyph> },
}

impl DrawPrimitive {
    pub fn translated(self, dx: f32, dy: f32) -> Self {
        match self {
            DrawPrimitive::TextRun { text, origin, style } => DrawPrimitive::TextRun {
                text,
                origin: origin.offset(dx, dy),
                style,
            },
            DrawPrimitive::Line { start, end, thickness } => DrawPrimitive::Line {
                start: start.offset(dx, dy),
                end: end.offset(dx, dy),
                thickness,
            },
            DrawPrimitive::GlyphStack { mut glyphs } => {
                for glyph in &mut glyphs {
                    glyph.origin = glyph.origin.offset(dx, dy);
                }
                DrawPrimitive::GlyphStack { glyphs }
            }
        }
    }

    /// Uniform scale about the origin; font sizes and thickness scale too.
    pub fn scaled(self, factor: f32) -> Self {
        match self {
            DrawPrimitive::TextRun { text, origin, mut style } => {
                style.font_size *= factor;
                DrawPrimitive::TextRun {
                    text,
                    origin: Point::new(origin.x * factor, origin.y * factor),
                    style,
                }
            }
            DrawPrimitive::Line { start, end, thickness } => DrawPrimitive::Line {
                start: Point::new(start.x * factor, start.y * factor),
                end: Point::new(end.x * factor, end.y * factor),
                thickness: thickness * factor,
            },
            DrawPrimitive::GlyphStack { mut glyphs } => {
                for glyph in &mut glyphs {
                    glyph.origin = Point::new(glyph.origin.x * factor, glyph.origin.y * factor);
                    glyph.font_size *= factor;
                }
                DrawPrimitive::GlyphStack { glyphs }
            }
        }
    }

    /// Mirror vertically across `height`.
    pub fn flipped(self, height: f32) -> Self {
        match self {
            DrawPrimitive::TextRun { text, origin, style } => DrawPrimitive::TextRun {
                text,
                origin: Point::new(origin.x, height - origin.y),
                style,
            },
            DrawPrimitive::Line { start, end, thickness } => DrawPrimitive::Line {
                start: Point::new(start.x, height - start.y),
                end: Point::new(end.x, height - end.y),
                thickness,
            },
            DrawPrimitive::GlyphStack { mut glyphs } => {
                for glyph in &mut glyphs {
                    glyph.origin = Point::new(glyph.origin.x, height - glyph.origin.y);
                }
                DrawPrimitive::GlyphStack { glyphs }
            }
        }
    }
}

/// A flattened, ready-to-draw equation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderOutput {
    pub primitives: Vec<DrawPrimitive>,
    pub bounds: Rect,
    /// Distance from the top of the bounds to the first-line baseline.
    pub baseline: f32,
}

impl RenderOutput {
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// Walks a laid-out tree and emits draw primitives.
pub struct Renderer<'m> {
    metrics: &'m dyn FontMetrics,
}

impl<'m> Renderer<'m> {
    pub fn new(metrics: &'m dyn FontMetrics) -> Self {
        Self { metrics }
    }

    /// Flatten the subtree under `root`, which must already be laid out.
    pub fn render(&self, tree: &EqTree, root: NodeId) -> RenderOutput {
        let mut primitives = Vec::new();
        self.walk(tree, root, Point::origin(), &mut primitives);

        let bounds = match tree.node(root) {
            Some(Node::Stem(stem)) => Rect::from_origin_size(Point::origin(), stem.draw_size),
            Some(Node::Leaf(data)) => {
                Rect::from_origin_size(Point::origin(), data.draw_size)
            }
            None => Rect::default(),
        };
        let baseline = LayoutEngine::new(self.metrics).node_ascent(tree, root);

        RenderOutput {
            primitives,
            bounds,
            baseline,
        }
    }

    /// `parent_origin` is the absolute position of the node's parent box;
    /// child geometry is stored relative to it.
    fn walk(&self, tree: &EqTree, id: NodeId, parent_origin: Point, out: &mut Vec<DrawPrimitive>) {
        match tree.node(id) {
            Some(Node::Leaf(data)) => self.emit_leaf(data, parent_origin, out),
            Some(Node::Stem(stem)) => {
                let absolute = parent_origin.offset(stem.draw_origin.x, stem.draw_origin.y);
                let font_size = tree.size_class(id).font_size();

                if stem.has_supplemental_line {
                    out.push(DrawPrimitive::Line {
                        start: absolute
                            .offset(stem.supplemental_line_start.x, stem.supplemental_line_start.y),
                        end: absolute
                            .offset(stem.supplemental_line_end.x, stem.supplemental_line_end.y),
                        thickness: self.metrics.rule_thickness(font_size),
                    });
                }
                if stem.has_overline {
                    out.push(DrawPrimitive::Line {
                        start: absolute.offset(stem.overline_start.x, stem.overline_start.y),
                        end: absolute.offset(stem.overline_end.x, stem.overline_end.y),
                        thickness: self.metrics.rule_thickness(font_size),
                    });
                    if matches!(stem.stem_type, StemType::SqRoot | StemType::NRoot) {
                        let glyph_width = self.metrics.advance('\u{221A}', font_size);
                        out.push(DrawPrimitive::TextRun {
                            text: "\u{221A}".to_string(),
                            origin: absolute.offset(stem.overline_start.x - glyph_width, 0.0),
                            style: RunStyle {
                                font_size,
                                ..RunStyle::default()
                            },
                        });
                    }
                }
                if let Some(index) = &stem.supplementary_data {
                    self.emit_leaf(index, absolute, out);
                }

                for &child in &stem.children {
                    self.walk(tree, child, absolute, out);
                }
            }
            None => {}
        }
    }

    fn emit_leaf(&self, data: &RenderData, parent_origin: Point, out: &mut Vec<DrawPrimitive>) {
        // Plain text outside stretchy ranges; assembled stacks inside them.
        for (char_offset, segment) in data.plain_segments() {
            if segment.is_empty() {
                continue;
            }
            let x = data.draw_origin.x + self.segment_advance(data, char_offset);
            out.push(DrawPrimitive::TextRun {
                text: segment,
                origin: parent_origin.offset(x, data.draw_origin.y),
                style: data.style,
            });
        }
        for record in data.stretchy_records() {
            let glyphs = record
                .bracer
                .glyphs
                .iter()
                .map(|g| PositionedGlyph {
                    ch: g.ch,
                    origin: parent_origin.offset(g.origin.x, g.origin.y),
                    font_size: g.font_size,
                })
                .collect();
            out.push(DrawPrimitive::GlyphStack { glyphs });
        }
    }

    /// Advance from the leaf's left edge to the given character offset,
    /// counting assembled bracers at their stack width.
    fn segment_advance(&self, data: &RenderData, char_offset: usize) -> f32 {
        let font_size = data.style.font_size;
        let ranges = data.stretchy_ranges();
        let records = data.stretchy_records();
        let mut advance = 0.0;
        for (index, ch) in data.text.chars().enumerate() {
            if index >= char_offset {
                break;
            }
            match ranges.iter().position(|r| r.contains(&index)) {
                Some(record_index) => advance += records[record_index].bracer.advance_width(),
                None => advance += self.metrics.advance(ch, font_size),
            }
        }
        advance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutEngine;
    use crate::metrics::TextFontMetrics;
    use crate::tree::RenderStem;

    fn laid_out_tree(build: impl FnOnce(&mut EqTree, NodeId)) -> (EqTree, NodeId) {
        let (mut tree, root) = EqTree::with_root();
        build(&mut tree, root);
        let metrics = TextFontMetrics;
        LayoutEngine::new(&metrics).layout(&mut tree, root).unwrap();
        (tree, root)
    }

    fn text_runs(output: &RenderOutput) -> Vec<&str> {
        output
            .primitives
            .iter()
            .filter_map(|p| match p {
                DrawPrimitive::TextRun { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_row_emits_text_runs() {
        let (tree, root) = laid_out_tree(|tree, root| {
            let a = tree.insert_leaf(RenderData::new("ab"));
            tree.append_child(root, a);
        });
        let metrics = TextFontMetrics;
        let output = Renderer::new(&metrics).render(&tree, root);
        assert_eq!(text_runs(&output), vec!["ab"]);
        assert!(output.bounds.width() > 0.0);
        assert!(output.baseline > 0.0);
    }

    #[test]
    fn test_fraction_emits_bar_line() {
        let (tree, root) = laid_out_tree(|tree, root| {
            let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
            tree.append_child(root, frac);
            let num = tree.insert_leaf(RenderData::new("a"));
            let den = tree.insert_leaf(RenderData::new("b"));
            tree.append_child(frac, num);
            tree.append_child(frac, den);
        });
        let metrics = TextFontMetrics;
        let output = Renderer::new(&metrics).render(&tree, root);
        let lines: Vec<_> = output
            .primitives
            .iter()
            .filter(|p| matches!(p, DrawPrimitive::Line { .. }))
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(text_runs(&output), vec!["a", "b"]);
    }

    #[test]
    fn test_sqroot_emits_radical_glyph_and_overline() {
        let (tree, root) = laid_out_tree(|tree, root| {
            let sqroot = tree.insert_stem(RenderStem::new(StemType::SqRoot));
            tree.append_child(root, sqroot);
            let radicand = tree.insert_leaf(RenderData::new("x"));
            tree.append_child(sqroot, radicand);
        });
        let metrics = TextFontMetrics;
        let output = Renderer::new(&metrics).render(&tree, root);
        assert!(text_runs(&output).contains(&"\u{221A}"));
        assert!(output
            .primitives
            .iter()
            .any(|p| matches!(p, DrawPrimitive::Line { .. })));
    }

    #[test]
    fn test_stretchy_bracket_emits_glyph_stack_not_text() {
        let (tree, root) = laid_out_tree(|tree, root| {
            let mut open = RenderData::new("(");
            open.has_stretchy_attr = true;
            let open = tree.insert_leaf(open);
            tree.append_child(root, open);
            let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
            tree.append_child(root, frac);
            let num = tree.insert_leaf(RenderData::new("a"));
            let den = tree.insert_leaf(RenderData::new("b"));
            tree.append_child(frac, num);
            tree.append_child(frac, den);
        });
        let metrics = TextFontMetrics;
        let output = Renderer::new(&metrics).render(&tree, root);
        assert!(output
            .primitives
            .iter()
            .any(|p| matches!(p, DrawPrimitive::GlyphStack { .. })));
        assert!(!text_runs(&output).contains(&"("));
    }

    #[test]
    fn test_primitive_transforms() {
        let run = DrawPrimitive::TextRun {
            text: "x".to_string(),
            origin: Point::new(10.0, 20.0),
            style: RunStyle::default(),
        };
        match run.clone().translated(5.0, -5.0) {
            DrawPrimitive::TextRun { origin, .. } => assert_eq!(origin, Point::new(15.0, 15.0)),
            _ => unreachable!(),
        }
        match run.clone().scaled(2.0) {
            DrawPrimitive::TextRun { origin, style, .. } => {
                assert_eq!(origin, Point::new(20.0, 40.0));
                assert_eq!(style.font_size, 2.0 * RunStyle::default().font_size);
            }
            _ => unreachable!(),
        }
        match run.flipped(100.0) {
            DrawPrimitive::TextRun { origin, .. } => assert_eq!(origin, Point::new(10.0, 80.0)),
            _ => unreachable!(),
        }
    }
}

//! Equation composer - multi-line aggregation and output framing.
//!
//! Each line owns one tree. The composer lays the lines out top to bottom,
//! tracks the aggregate size, and flattens everything into one
//! `RenderOutput`, optionally scaled and vertically flipped for surfaces
//! whose y axis grows upward.

use crate::error::{EqError, EqResult};
use crate::geometry::Size;
use crate::metrics::{FontMetrics, DEFAULT_FONT_SIZE};
use crate::render::{RenderOutput, Renderer};
use crate::tree::{EqTree, NodeId};
use crate::typesetter::Typesetter;
use serde::{Deserialize, Serialize};

/// Vertical gap between equation lines, in em of the base size.
const LINE_SPACING_FACTOR: f32 = 0.35;

/// One equation line: a tree plus its root handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationLine {
    pub tree: EqTree,
    pub root: NodeId,
}

impl EquationLine {
    pub fn new() -> Self {
        let (tree, root) = EqTree::with_root();
        Self { tree, root }
    }

    pub fn is_empty(&self) -> bool {
        self.tree
            .stem(self.root)
            .map(|stem| stem.children.is_empty())
            .unwrap_or(true)
    }

    fn size(&self) -> Size {
        self.tree
            .stem(self.root)
            .map(|stem| stem.draw_size)
            .unwrap_or_else(Size::zero)
    }
}

impl Default for EquationLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregates equation lines into one drawable output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationComposer {
    pub lines: Vec<EquationLine>,
    /// When set, `compose` multiplies all coordinates by `pdf_scale`.
    pub pdf_mode: bool,
    pub pdf_scale: f32,
    /// Mirror output vertically for bottom-left-origin surfaces.
    pub flip_vertical: bool,
    /// Aggregate size of the laid-out lines, valid after layout.
    pub draw_size: Size,
}

impl EquationComposer {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            pdf_mode: false,
            pdf_scale: 1.0,
            flip_vertical: false,
            draw_size: Size::zero(),
        }
    }

    pub fn with_line(line: EquationLine) -> Self {
        let mut composer = Self::new();
        composer.lines.push(line);
        composer
    }

    pub fn add_line(&mut self, line: EquationLine) {
        self.lines.push(line);
    }

    /// Whether every line is empty of content.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(EquationLine::is_empty)
    }

    /// Lay out every line and record the aggregate size.
    pub fn layout_equation_lines(&mut self, metrics: &dyn FontMetrics) -> EqResult<()> {
        let typesetter = Typesetter::new(metrics);
        for line in &mut self.lines {
            typesetter.layout_render_stems_from_root(&mut line.tree, line.root)?;
        }
        self.draw_size = self.aggregate_size();
        Ok(())
    }

    /// Aggregate size of the laid-out lines including inter-line spacing.
    pub fn compute_inline_size(&self) -> Size {
        self.aggregate_size()
    }

    fn aggregate_size(&self) -> Size {
        let spacing = DEFAULT_FONT_SIZE * LINE_SPACING_FACTOR;
        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        let mut occupied = 0usize;
        for line in &self.lines {
            if line.is_empty() {
                continue;
            }
            let size = line.size();
            width = width.max(size.width);
            height += size.height;
            occupied += 1;
        }
        if occupied > 1 {
            height += spacing * (occupied - 1) as f32;
        }
        Size::new(width, height)
    }

    /// Lay out and flatten all lines into one output. An empty equation
    /// short-circuits to a zero-size output with no primitives.
    pub fn compose(&mut self, metrics: &dyn FontMetrics) -> EqResult<RenderOutput> {
        if self.is_empty() {
            self.draw_size = Size::zero();
            return Ok(RenderOutput::default());
        }
        self.layout_equation_lines(metrics)?;

        let renderer = Renderer::new(metrics);
        let spacing = DEFAULT_FONT_SIZE * LINE_SPACING_FACTOR;
        let mut output = RenderOutput::default();
        let mut y = 0.0;
        let mut first_baseline: Option<f32> = None;

        for line in &self.lines {
            if line.is_empty() {
                continue;
            }
            let line_output = renderer.render(&line.tree, line.root);
            if first_baseline.is_none() {
                first_baseline = Some(y + line_output.baseline);
            }
            for primitive in line_output.primitives {
                output.primitives.push(primitive.translated(0.0, y));
            }
            y += line.size().height + spacing;
        }

        output.bounds =
            crate::geometry::Rect::from_origin_size(crate::geometry::Point::origin(), self.draw_size);
        output.baseline = first_baseline.unwrap_or(0.0);

        let height = self.draw_size.height;
        if self.flip_vertical {
            output.primitives = output
                .primitives
                .into_iter()
                .map(|p| p.flipped(height))
                .collect();
        }
        if self.pdf_mode && self.pdf_scale != 1.0 {
            if self.pdf_scale <= 0.0 {
                return Err(EqError::Layout(format!(
                    "pdf scale must be positive, got {}",
                    self.pdf_scale
                )));
            }
            let scale = self.pdf_scale;
            output.primitives = output
                .primitives
                .into_iter()
                .map(|p| p.scaled(scale))
                .collect();
            output.bounds = crate::geometry::Rect::new(
                0.0,
                0.0,
                output.bounds.width() * scale,
                output.bounds.height() * scale,
            );
            output.baseline *= scale;
        }

        tracing::debug!(
            primitives = output.primitives.len(),
            width = output.bounds.width(),
            height = output.bounds.height(),
            "composed equation"
        );
        Ok(output)
    }
}

impl Default for EquationComposer {
    fn default() -> Self {
        Self::new()
    }
}

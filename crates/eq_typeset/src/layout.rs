//! Bottom-up layout pass over the equation tree.
//!
//! Children are laid out before their parent positions them, so every
//! placement rule works from finished child boxes. All child origins are
//! relative to the parent stem's box; y grows downward with the origin at
//! the top left. The pass is a pure function of tree content and metrics,
//! so repeating it without edits reproduces identical geometry.

use crate::bracer::{self, BracerKind};
use crate::error::EqResult;
use crate::geometry::{Point, Rect, Size};
use crate::metrics::{
    FontMetrics, SizeClass, DEFAULT_FONT_SIZE_LARGE, DEFAULT_FONT_SIZE_LARGE_INTEGRAL,
    DEFAULT_FONT_SIZE_SMALLER,
};
use crate::tables;
use crate::tree::{EqTree, Node, NodeId, StemType, ViewAlign};

/// Superscript raise above the baseline, as a fraction of x-height.
const SUPERSCRIPT_RAISE_FACTOR: f32 = 0.9;
/// Subscript baseline drop, as a fraction of x-height.
const SUBSCRIPT_DROP_FACTOR: f32 = 0.55;
/// Gap between fraction bar and numerator/denominator, in em.
const FRACTION_GAP_FACTOR: f32 = 0.15;
/// Horizontal padding inside a fraction box, in em.
const FRACTION_PAD_FACTOR: f32 = 0.10;
/// Gap between a base and its stacked limit, in em.
const LIMIT_GAP_FACTOR: f32 = 0.10;
/// Gap between radical overline and radicand, in em.
const RADICAL_GAP_FACTOR: f32 = 0.10;
/// Column gap inside a matrix, in em.
const MATRIX_COL_GAP_FACTOR: f32 = 0.40;
/// Row gap inside a matrix, in em.
const MATRIX_ROW_GAP_FACTOR: f32 = 0.30;

pub struct LayoutEngine<'m> {
    metrics: &'m dyn FontMetrics,
}

impl<'m> LayoutEngine<'m> {
    pub fn new(metrics: &'m dyn FontMetrics) -> Self {
        Self { metrics }
    }

    /// Full pass from the root: lay out the subtree, anchor the root at the
    /// origin, and record the observed revisions. Skips entirely when the
    /// root stem is clean.
    pub fn layout(&self, tree: &mut EqTree, root: NodeId) -> EqResult<()> {
        if let Some(stem) = tree.stem(root) {
            if !stem.is_dirty() {
                return Ok(());
            }
        }
        tracing::debug!(node_count = tree.len(), "layout pass started");
        self.layout_children(tree, root)?;
        self.place(tree, root, Point::origin());
        Ok(())
    }

    /// Lay out one node and its subtree. The node's size and the origins of
    /// its children are set; the node's own origin is left for the caller.
    pub fn layout_children(&self, tree: &mut EqTree, id: NodeId) -> EqResult<()> {
        let stem_type = match tree.node(id) {
            Some(Node::Stem(stem)) => stem.stem_type,
            Some(Node::Leaf(_)) => {
                self.layout_leaf(tree, id);
                return Ok(());
            }
            None => return Ok(()),
        };

        match stem_type {
            StemType::Root | StemType::Row | StemType::MatrixCell => {
                self.layout_row(tree, id)?;
            }
            StemType::Sup | StemType::Sub | StemType::SubSup => {
                self.layout_scripts(tree, id, stem_type)?;
            }
            StemType::Fraction | StemType::Binomial => {
                self.layout_fraction_like(tree, id, stem_type)?;
            }
            StemType::Under | StemType::Over | StemType::UnderOver => {
                self.layout_limits(tree, id, stem_type)?;
            }
            StemType::SqRoot | StemType::NRoot => {
                self.layout_radical(tree, id, stem_type)?;
            }
            StemType::Matrix => {
                self.layout_matrix(tree, id)?;
            }
            StemType::MatrixRow => {
                // Standalone rows pack like any other row; the enclosing
                // matrix overrides cell placement with grid alignment.
                self.layout_row(tree, id)?;
            }
        }

        if let Some(stem) = tree.stem_mut(id) {
            stem.mark_laid_out();
        }
        Ok(())
    }

    // -- leaf sizing ---------------------------------------------------------

    fn layout_leaf(&self, tree: &mut EqTree, id: NodeId) {
        let class = tree.size_class(id);
        let font_size = match tree.leaf(id) {
            Some(data) => self.leaf_font_size(class, data.has_large_op_attr, &data.text),
            None => return,
        };
        if let Some(data) = tree.leaf_mut(id) {
            let mut style = data.style;
            style.font_size = font_size;
            data.set_style(style);
            if data.has_stretchy_attr {
                // Assemblies are rebuilt by the enclosing row every pass.
                data.reset_stretchy_data();
            }
            if data.is_dirty() {
                data.measure(self.metrics);
            }
        }
    }

    /// Large operators render above the cascade size at the top level;
    /// integrals get the tallest glyph size.
    fn leaf_font_size(&self, class: SizeClass, has_large_op: bool, text: &str) -> f32 {
        if class == SizeClass::Regular && has_large_op {
            let is_integral = text
                .chars()
                .any(|c| tables::large_op_characters().contains(&c) && !tables::sum_op_characters().contains(&c));
            if is_integral {
                DEFAULT_FONT_SIZE_LARGE_INTEGRAL
            } else {
                DEFAULT_FONT_SIZE_LARGE
            }
        } else {
            class.font_size()
        }
    }

    // -- per-type placement --------------------------------------------------

    fn layout_row(&self, tree: &mut EqTree, id: NodeId) -> EqResult<()> {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.layout_children(tree, child)?;
        }

        let mut max_ascent: f32 = 0.0;
        let mut max_descent: f32 = 0.0;
        for &child in &children {
            let ascent = self.node_ascent(tree, child);
            let height = self.size_of(tree, child).height;
            max_ascent = max_ascent.max(ascent);
            max_descent = max_descent.max(height - ascent);
        }

        let mut x = 0.0;
        for &child in &children {
            let ascent = self.node_ascent(tree, child);
            self.place(tree, child, Point::new(x, max_ascent - ascent));
            x += self.size_of(tree, child).width + self.kern_after(tree, child);
        }

        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(x, max_ascent + max_descent);
        }

        self.nested_stretchy_bracer_check(tree, id);
        Ok(())
    }

    fn layout_scripts(&self, tree: &mut EqTree, id: NodeId, stem_type: StemType) -> EqResult<()> {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.layout_children(tree, child)?;
        }
        let Some(&base) = children.first() else {
            return Ok(());
        };

        let font_size = tree.size_class(id).font_size();
        let x_height = self.metrics.x_height(font_size);
        let raise = x_height * SUPERSCRIPT_RAISE_FACTOR;
        let drop = x_height * SUBSCRIPT_DROP_FACTOR;

        let base_size = self.size_of(tree, base);
        let base_ascent = self.node_ascent(tree, base);

        let sub = match stem_type {
            StemType::Sub => children.get(1).copied(),
            StemType::SubSup => children.get(1).copied(),
            _ => None,
        };
        let sup = match stem_type {
            StemType::Sup => children.get(1).copied(),
            StemType::SubSup => children.get(2).copied(),
            _ => None,
        };

        // The superscript box bottom sits `raise` above the base baseline;
        // if it pokes above the base top, the whole base shifts down.
        let sup_height = sup.map(|s| self.size_of(tree, s).height).unwrap_or(0.0);
        let top_offset = (sup_height + raise - base_ascent).max(0.0);

        self.place(tree, base, Point::new(0.0, top_offset));
        let baseline = top_offset + base_ascent;

        let mut script_width: f32 = 0.0;
        let mut bottom = top_offset + base_size.height;

        if let Some(sup) = sup {
            let size = self.size_of(tree, sup);
            self.place(tree, sup, Point::new(base_size.width, baseline - raise - size.height));
            script_width = script_width.max(size.width);
        }
        if let Some(sub) = sub {
            let size = self.size_of(tree, sub);
            let sub_ascent = self.node_ascent(tree, sub);
            let y = baseline + drop - sub_ascent;
            self.place(tree, sub, Point::new(base_size.width, y));
            script_width = script_width.max(size.width);
            bottom = bottom.max(y + size.height);
        }

        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(base_size.width + script_width, bottom);
        }
        Ok(())
    }

    fn layout_fraction_like(
        &self,
        tree: &mut EqTree,
        id: NodeId,
        stem_type: StemType,
    ) -> EqResult<()> {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.layout_children(tree, child)?;
        }
        let (Some(&num), Some(&den)) = (children.first(), children.get(1)) else {
            // Arity is a caller contract; degrade to row packing.
            return self.layout_row(tree, id);
        };

        let font_size = tree.size_class(id).font_size();
        let gap = font_size * FRACTION_GAP_FACTOR;
        let pad = font_size * FRACTION_PAD_FACTOR;
        let thickness = self.metrics.rule_thickness(font_size);

        let num_size = self.size_of(tree, num);
        let den_size = self.size_of(tree, den);
        let inner_width = num_size.width.max(den_size.width);
        let width = inner_width + 2.0 * pad;

        self.place(tree, num, Point::new(pad + (inner_width - num_size.width) / 2.0, 0.0));
        let bar_y = num_size.height + gap;
        let den_y = bar_y + thickness + gap;
        self.place(tree, den, Point::new(pad + (inner_width - den_size.width) / 2.0, den_y));

        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(width, den_y + den_size.height);
            if stem_type == StemType::Fraction {
                stem.has_supplemental_line = true;
                stem.supplemental_line_start = Point::new(0.0, bar_y + thickness / 2.0);
                stem.supplemental_line_end = Point::new(width, bar_y + thickness / 2.0);
            } else {
                stem.has_supplemental_line = false;
            }
        }
        Ok(())
    }

    fn layout_limits(&self, tree: &mut EqTree, id: NodeId, stem_type: StemType) -> EqResult<()> {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.layout_children(tree, child)?;
        }
        let Some(&base) = children.first() else {
            return Ok(());
        };

        let font_size = tree.size_class(id).font_size();
        // Accents sit flush on their base; ordinary limits keep a gap.
        let accent = tree.stem(id).map(|s| s.has_accent_char).unwrap_or(false);
        let gap = if accent { 0.0 } else { font_size * LIMIT_GAP_FACTOR };

        let under = match stem_type {
            StemType::Under | StemType::UnderOver => children.get(1).copied(),
            _ => None,
        };
        let over = match stem_type {
            StemType::Over => children.get(1).copied(),
            StemType::UnderOver => children.get(2).copied(),
            _ => None,
        };

        let mut width = self.size_of(tree, base).width;
        if let Some(n) = under {
            width = width.max(self.size_of(tree, n).width);
        }
        if let Some(n) = over {
            width = width.max(self.size_of(tree, n).width);
        }

        let mut y = 0.0;
        if let Some(over) = over {
            let size = self.size_of(tree, over);
            self.place(tree, over, Point::new((width - size.width) / 2.0, 0.0));
            y = size.height + gap;
        }

        let base_size = self.size_of(tree, base);
        self.place(tree, base, Point::new((width - base_size.width) / 2.0, y));
        y += base_size.height;

        if let Some(under) = under {
            let size = self.size_of(tree, under);
            y += gap;
            self.place(tree, under, Point::new((width - size.width) / 2.0, y));
            y += size.height;
        }

        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(width, y);
        }
        Ok(())
    }

    fn layout_radical(&self, tree: &mut EqTree, id: NodeId, stem_type: StemType) -> EqResult<()> {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.layout_children(tree, child)?;
        }
        let Some(&radicand) = children.first() else {
            return Ok(());
        };

        let font_size = tree.size_class(id).font_size();
        let thickness = self.metrics.rule_thickness(font_size);
        let mut gap = font_size * RADICAL_GAP_FACTOR;
        let glyph_width = self.metrics.advance('\u{221A}', font_size);

        // A nested radical with its own overline at the top needs extra
        // clearance so the two bars stay distinct.
        if let Some(point) = self.find_child_overline_point(tree, radicand) {
            if point.y <= thickness {
                gap += thickness;
            }
        }

        // NRoot draws its stored index above and left of the radical hook.
        let mut index_size = Size::zero();
        if stem_type == StemType::NRoot {
            if let Some(stem) = tree.stem_mut(id) {
                if let Some(index) = stem.supplementary_data.as_mut() {
                    let mut style = index.style;
                    style.font_size = DEFAULT_FONT_SIZE_SMALLER;
                    index.set_style(style);
                    if index.is_dirty() {
                        index.measure(self.metrics);
                    }
                    index.move_to(Point::origin());
                    index_size = index.draw_size;
                }
            }
        }
        let left_adjust = (index_size.width - glyph_width * 0.3).max(0.0);

        let content_x = left_adjust + glyph_width;
        let radicand_size = self.size_of(tree, radicand);
        self.place(tree, radicand, Point::new(content_x, gap + thickness));

        let height = (gap + thickness + radicand_size.height).max(index_size.height);
        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(content_x + radicand_size.width, height);
            stem.has_overline = true;
            stem.overline_start = Point::new(content_x, thickness / 2.0);
            stem.overline_end = Point::new(content_x + radicand_size.width, thickness / 2.0);
        }
        Ok(())
    }

    fn layout_matrix(&self, tree: &mut EqTree, id: NodeId) -> EqResult<()> {
        let rows = self.children_of(tree, id);
        let mut grid: Vec<Vec<NodeId>> = Vec::with_capacity(rows.len());
        for &row in &rows {
            let cells = self.children_of(tree, row);
            for &cell in &cells {
                self.layout_children(tree, cell)?;
            }
            grid.push(cells);
        }

        let column_count = grid.iter().map(Vec::len).max().unwrap_or(0);
        if column_count == 0 {
            if let Some(stem) = tree.stem_mut(id) {
                stem.draw_size = Size::zero();
            }
            return Ok(());
        }

        let font_size = tree.size_class(id).font_size();
        let col_gap = font_size * MATRIX_COL_GAP_FACTOR;
        let row_gap = font_size * MATRIX_ROW_GAP_FACTOR;

        let mut col_widths = vec![0.0f32; column_count];
        let mut row_heights = vec![0.0f32; grid.len()];
        for (row_index, cells) in grid.iter().enumerate() {
            for (col_index, &cell) in cells.iter().enumerate() {
                let size = self.size_of(tree, cell);
                col_widths[col_index] = col_widths[col_index].max(size.width);
                row_heights[row_index] = row_heights[row_index].max(size.height);
            }
        }

        let total_width = col_widths.iter().sum::<f32>() + col_gap * (column_count as f32 - 1.0);
        let mut y = 0.0;
        for (row_index, (cells, &row_id)) in grid.iter().zip(rows.iter()).enumerate() {
            let row_height = row_heights[row_index];
            let mut x = 0.0;
            for (col_index, &cell) in cells.iter().enumerate() {
                let size = self.size_of(tree, cell);
                let align = tree.stem(cell).map(|s| s.align).unwrap_or_default();
                let x_in_col = match align {
                    ViewAlign::Left => 0.0,
                    ViewAlign::Auto | ViewAlign::Center => {
                        (col_widths[col_index] - size.width) / 2.0
                    }
                };
                self.place(
                    tree,
                    cell,
                    Point::new(x + x_in_col, (row_height - size.height) / 2.0),
                );
                x += col_widths[col_index] + col_gap;
            }
            if let Some(stem) = tree.stem_mut(row_id) {
                stem.draw_size = Size::new(total_width, row_height);
                stem.mark_laid_out();
            }
            self.place(tree, row_id, Point::new(0.0, y));
            y += row_height + row_gap;
        }

        let total_height = (y - row_gap).max(0.0);
        if let Some(stem) = tree.stem_mut(id) {
            stem.draw_size = Size::new(total_width, total_height);
        }
        Ok(())
    }

    // -- stretchy bracer handling --------------------------------------------

    /// Scan a packed row for stretchy bracket leaves and grow each one to
    /// cover the tallest sibling content.
    pub fn nested_stretchy_bracer_check(&self, tree: &mut EqTree, row: NodeId) {
        let children = self.children_of(tree, row);

        let mut target: f32 = 0.0;
        let mut any_stretchy = false;
        for &child in &children {
            if self.is_stretchy_leaf(tree, child) {
                any_stretchy = true;
            } else {
                target = target.max(self.ink_height(tree, child));
            }
        }
        if !any_stretchy {
            return;
        }

        for (index, &child) in children.iter().enumerate() {
            if self.is_stretchy_leaf(tree, child) {
                self.adjust_layout_for_nested_stretchy(tree, row, index, target);
            }
        }

        // Assemblies can overshoot the target; re-derive the row box.
        let mut height = self.size_of(tree, row).height;
        for &child in &children {
            if let Some(data) = tree.leaf(child) {
                height = height.max(data.image_bounds_with_stretchy().bottom());
            }
        }
        if let Some(stem) = tree.stem_mut(row) {
            stem.draw_size.height = height;
        }
    }

    /// Replace one stretchy bracket character with an assembled glyph stack
    /// sized to `target`, then re-flow the following siblings around the
    /// wider advance.
    fn adjust_layout_for_nested_stretchy(
        &self,
        tree: &mut EqTree,
        row: NodeId,
        child_index: usize,
        target: f32,
    ) {
        let Some(&child) = self
            .children_of(tree, row)
            .get(child_index)
        else {
            return;
        };
        let Some(data) = tree.leaf(child) else {
            return;
        };

        let font_size = data.style.font_size;
        let origin_x = data.draw_origin.x;
        let chars: Vec<char> = data.text.chars().collect();

        let mut total_delta = 0.0;
        let mut prefix_advance = 0.0;
        for (char_index, &ch) in chars.iter().enumerate() {
            let plain_advance = self.metrics.advance(ch, font_size);
            if tables::stretchy_bracer_characters().contains(&ch) {
                let kind = bracer::kind_for_height(ch, target, font_size, self.metrics);
                if kind != BracerKind::Empty {
                    let use_kern = tables::left_stretchy_bracer_characters().contains(&ch);
                    let mut assembled = bracer::assemble(
                        ch,
                        target,
                        Point::new(origin_x + prefix_advance + total_delta, 0.0),
                        use_kern,
                        font_size,
                        self.metrics,
                    );
                    // A stack that overshoots the packed row hangs below the
                    // sibling baseline; record where its ink ends.
                    let row_height = self.size_of(tree, row).height;
                    let stack_bottom = assembled.bounds().bottom();
                    if stack_bottom > row_height {
                        assembled
                            .set_descender_point(Point::new(assembled.origin.x, stack_bottom));
                    }
                    tracing::debug!(character = %ch, ?kind, target, "assembled stretchy bracer");
                    // Opening-side assemblies carry a kern that clears the
                    // slanted stack from the content that follows.
                    let delta =
                        assembled.advance_width() + assembled.kern_adjustment() - plain_advance;
                    total_delta += delta;
                    prefix_advance += plain_advance;
                    if let Some(data) = tree.leaf_mut(child) {
                        data.add_stretchy_data(assembled, char_index..char_index + 1);
                        data.mark_laid_out();
                    }
                    continue;
                }
            }
            prefix_advance += plain_advance;
        }

        if total_delta != 0.0 {
            self.shift_children_after(tree, row, child_index, total_delta);
            if let Some(stem) = tree.stem_mut(row) {
                stem.draw_size.width += total_delta;
            }
        }

        if let Some(point) = self.find_child_descender_point(tree, child) {
            if let Some(data) = tree.leaf_mut(child) {
                data.stretchy_descender_point = Some(point);
                data.mark_laid_out();
            }
        }
    }

    fn is_stretchy_leaf(&self, tree: &EqTree, id: NodeId) -> bool {
        tree.leaf(id)
            .map(|data| {
                data.has_stretchy_attr
                    && data
                        .text
                        .chars()
                        .any(|c| tables::stretchy_bracer_characters().contains(&c))
            })
            .unwrap_or(false)
    }

    // -- geometry queries ----------------------------------------------------

    fn children_of(&self, tree: &EqTree, id: NodeId) -> Vec<NodeId> {
        tree.stem(id).map(|s| s.children.clone()).unwrap_or_default()
    }

    fn size_of(&self, tree: &EqTree, id: NodeId) -> Size {
        tree.node(id).map(Node::size).unwrap_or_else(Size::zero)
    }

    fn ink_height(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.node(id) {
            Some(Node::Leaf(data)) => data.image_bounds_with_stretchy().height(),
            Some(Node::Stem(stem)) => stem.draw_size.height,
            None => 0.0,
        }
    }

    fn kern_after(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.leaf(id) {
            Some(data) => data.stored_kern + data.style.kern,
            None => 0.0,
        }
    }

    /// Distance from a node's top to its baseline.
    pub fn node_ascent(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.node(id) {
            Some(Node::Leaf(data)) => self.metrics.ascent(data.style.font_size),
            Some(Node::Stem(stem)) => {
                let font_size = tree.size_class(id).font_size();
                match stem.stem_type {
                    StemType::Fraction | StemType::Binomial => {
                        let gap = font_size * FRACTION_GAP_FACTOR;
                        let numerator_height = stem
                            .children
                            .first()
                            .map(|&c| self.size_of(tree, c).height)
                            .unwrap_or(0.0);
                        numerator_height + gap + self.metrics.x_height(font_size) / 2.0
                    }
                    StemType::Matrix | StemType::MatrixRow => {
                        stem.draw_size.height / 2.0 + self.metrics.x_height(font_size) / 2.0
                    }
                    _ => match stem.children.first() {
                        Some(&base) => {
                            let base_origin = tree
                                .node(base)
                                .map(Node::origin)
                                .unwrap_or_else(Point::origin);
                            base_origin.y + self.node_ascent(tree, base)
                        }
                        None => self.metrics.ascent(font_size),
                    },
                }
            }
            None => 0.0,
        }
    }

    /// Position the first child takes inside this stem's box.
    pub fn initial_child_origin(&self, tree: &EqTree, id: NodeId) -> Point {
        tree.first_child(id)
            .and_then(|c| tree.node(c).map(Node::origin))
            .unwrap_or_else(Point::origin)
    }

    /// Horizontal offset content is pushed right by leading decorations,
    /// such as an n-root index overhanging the radical hook.
    pub fn compute_left_adjustment(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.stem(id) {
            Some(stem) if stem.has_overline => {
                let font_size = tree.size_class(id).font_size();
                let glyph_width = self.metrics.advance('\u{221A}', font_size);
                (stem.overline_start.x - glyph_width).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Bottom edge of a fraction's supplemental-line region.
    pub fn supplemental_lower_bounds(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.stem(id) {
            Some(stem) if stem.has_supplemental_line => {
                let font_size = tree.size_class(id).font_size();
                stem.supplemental_line_start.y + self.metrics.rule_thickness(font_size) / 2.0
            }
            _ => 0.0,
        }
    }

    /// Bottom edge of a radical's radicand region.
    pub fn radical_lower_bounds(&self, tree: &EqTree, id: NodeId) -> f32 {
        match tree.stem(id) {
            Some(stem) if stem.has_overline => stem.draw_size.height,
            _ => 0.0,
        }
    }

    /// Deepest stretchy descender point within a subtree, in the subtree
    /// root's coordinate space.
    pub fn find_child_descender_point(&self, tree: &EqTree, id: NodeId) -> Option<Point> {
        let mut deepest: Option<Point> = None;
        for node in tree.descendants(id) {
            if let Some(data) = tree.leaf(node) {
                for assembled in data.stretchy_descenders() {
                    if let Some(point) = assembled.descender_point {
                        if deepest.map(|d| point.y > d.y).unwrap_or(true) {
                            deepest = Some(point);
                        }
                    }
                }
            }
        }
        deepest
    }

    /// Highest overline start point among a subtree's stems, relative to
    /// the subtree root's box.
    pub fn find_child_overline_point(&self, tree: &EqTree, id: NodeId) -> Option<Point> {
        let mut highest: Option<Point> = None;
        for node in tree.descendants(id) {
            if let Some(stem) = tree.stem(node) {
                if stem.has_overline {
                    let point = stem.overline_start;
                    if highest.map(|h| point.y < h.y).unwrap_or(true) {
                        highest = Some(point);
                    }
                }
            }
        }
        highest
    }

    // -- post-layout adjustment ----------------------------------------------

    fn place(&self, tree: &mut EqTree, id: NodeId, origin: Point) {
        match tree.node_mut(id) {
            Some(Node::Leaf(data)) => data.move_to(origin),
            Some(Node::Stem(stem)) => {
                stem.draw_origin = origin;
                stem.draw_bounds = Rect::from_origin_size(origin, stem.draw_size);
            }
            None => {}
        }
    }

    /// Translate a node horizontally; children move with their parent since
    /// their origins are parent-relative.
    pub fn shift_layout_horizontally(&self, tree: &mut EqTree, id: NodeId, dx: f32) {
        match tree.node_mut(id) {
            Some(Node::Leaf(data)) => data.shift_layout_horizontally(dx),
            Some(Node::Stem(stem)) => {
                stem.draw_origin.x += dx;
                stem.draw_bounds = stem.draw_bounds.translated(dx, 0.0);
            }
            None => {}
        }
    }

    pub fn shift_children_horizontally(&self, tree: &mut EqTree, parent: NodeId, dx: f32) {
        for child in self.children_of(tree, parent) {
            self.shift_layout_horizontally(tree, child, dx);
        }
    }

    /// Shift only the siblings after `index`; used to re-flow a row around
    /// a widened stretchy assembly.
    pub fn shift_children_after(&self, tree: &mut EqTree, parent: NodeId, index: usize, dx: f32) {
        let children = self.children_of(tree, parent);
        for &child in children.iter().skip(index + 1) {
            self.shift_layout_horizontally(tree, child, dx);
        }
    }

    /// Recompute stem bounding rects from current child geometry without a
    /// full relayout.
    pub fn update_bounds(&self, tree: &mut EqTree, id: NodeId) {
        let children = self.children_of(tree, id);
        for &child in &children {
            self.update_bounds(tree, child);
        }
        if tree.stem(id).is_none() {
            return;
        }
        let mut local = Rect::default();
        for &child in &children {
            let child_rect = match tree.node(child) {
                Some(Node::Leaf(data)) => data.typographic_bounds_with_stretchy(),
                Some(Node::Stem(stem)) => stem.draw_bounds,
                None => Rect::default(),
            };
            local = local.union(child_rect);
        }
        if let Some(stem) = tree.stem_mut(id) {
            if !children.is_empty() {
                stem.draw_size = Size::new(local.right(), local.bottom());
            }
            stem.draw_bounds = Rect::from_origin_size(stem.draw_origin, stem.draw_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{TextFontMetrics, DEFAULT_FONT_SIZE, DEFAULT_FONT_SIZE_SMALL};
    use crate::render_data::RenderData;
    use crate::tree::RenderStem;
    use proptest::prelude::*;

    fn leaf(tree: &mut EqTree, text: &str) -> NodeId {
        tree.insert_leaf(RenderData::new(text))
    }

    fn stretchy_leaf(tree: &mut EqTree, text: &str) -> NodeId {
        let mut data = RenderData::new(text);
        data.has_stretchy_attr = true;
        tree.insert_leaf(data)
    }

    fn laid_out(tree: &mut EqTree, root: NodeId) {
        let metrics = TextFontMetrics;
        let engine = LayoutEngine::new(&metrics);
        engine.layout(tree, root).unwrap();
    }

    #[test]
    fn test_row_packs_left_to_right() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        tree.append_child(root, a);
        tree.append_child(root, b);
        laid_out(&mut tree, root);

        let a_rect = tree.leaf(a).unwrap().typographic_bounds();
        let b_rect = tree.leaf(b).unwrap().typographic_bounds();
        assert_eq!(a_rect.x(), 0.0);
        assert!((b_rect.x() - a_rect.right()).abs() < 0.001);
        let root_size = tree.stem(root).unwrap().draw_size;
        assert!((root_size.width - (a_rect.width() + b_rect.width())).abs() < 0.001);
    }

    #[test]
    fn test_row_respects_stored_kern() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        tree.leaf_mut(a).unwrap().stored_kern = 3.0;
        tree.append_child(root, a);
        tree.append_child(root, b);
        laid_out(&mut tree, root);

        let a_rect = tree.leaf(a).unwrap().typographic_bounds();
        let b_rect = tree.leaf(b).unwrap().typographic_bounds();
        assert!((b_rect.x() - (a_rect.right() + 3.0)).abs() < 0.001);
    }

    #[test]
    fn test_script_leaf_takes_smaller_size() {
        let (mut tree, root) = EqTree::with_root();
        let sup = tree.insert_stem(RenderStem::new(StemType::Sup));
        tree.append_child(root, sup);
        let base = leaf(&mut tree, "x");
        let script = leaf(&mut tree, "2");
        tree.append_child(sup, base);
        tree.append_child(sup, script);
        laid_out(&mut tree, root);

        assert_eq!(tree.leaf(base).unwrap().style.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(tree.leaf(script).unwrap().style.font_size, DEFAULT_FONT_SIZE_SMALL);
    }

    #[test]
    fn test_superscript_sits_above_subscript() {
        let (mut tree, root) = EqTree::with_root();
        let subsup = tree.insert_stem(RenderStem::new(StemType::SubSup));
        tree.append_child(root, subsup);
        let base = leaf(&mut tree, "x");
        let sub = leaf(&mut tree, "i");
        let sup = leaf(&mut tree, "2");
        tree.append_child(subsup, base);
        tree.append_child(subsup, sub);
        tree.append_child(subsup, sup);
        laid_out(&mut tree, root);

        let sup_rect = tree.leaf(sup).unwrap().typographic_bounds();
        let sub_rect = tree.leaf(sub).unwrap().typographic_bounds();
        let base_rect = tree.leaf(base).unwrap().typographic_bounds();
        assert!(sup_rect.y() < sub_rect.y());
        assert!(sup_rect.x() >= base_rect.right() - 0.001);
        assert!(sub_rect.x() >= base_rect.right() - 0.001);
    }

    #[test]
    fn test_fraction_centers_and_draws_bar_between() {
        let (mut tree, root) = EqTree::with_root();
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let num = leaf(&mut tree, "a");
        let den = leaf(&mut tree, "bcd");
        tree.append_child(frac, num);
        tree.append_child(frac, den);
        laid_out(&mut tree, root);

        let num_rect = tree.leaf(num).unwrap().typographic_bounds();
        let den_rect = tree.leaf(den).unwrap().typographic_bounds();
        assert!((num_rect.center_x() - den_rect.center_x()).abs() < 0.001);

        let stem = tree.stem(frac).unwrap();
        assert!(stem.has_supplemental_line);
        let bar_y = stem.supplemental_line_start.y;
        assert!(bar_y > num_rect.bottom());
        assert!(bar_y < den_rect.y());
    }

    #[test]
    fn test_binomial_has_no_bar() {
        let (mut tree, root) = EqTree::with_root();
        let binom = tree.insert_stem(RenderStem::new(StemType::Binomial));
        tree.append_child(root, binom);
        let n = leaf(&mut tree, "n");
        let k = leaf(&mut tree, "k");
        tree.append_child(binom, n);
        tree.append_child(binom, k);
        laid_out(&mut tree, root);
        assert!(!tree.stem(binom).unwrap().has_supplemental_line);
    }

    #[test]
    fn test_under_over_stacks_vertically() {
        let (mut tree, root) = EqTree::with_root();
        let underover = tree.insert_stem(RenderStem::new(StemType::UnderOver));
        tree.append_child(root, underover);
        let base = leaf(&mut tree, "\u{2211}");
        let under = leaf(&mut tree, "i=0");
        let over = leaf(&mut tree, "n");
        tree.append_child(underover, base);
        tree.append_child(underover, under);
        tree.append_child(underover, over);
        laid_out(&mut tree, root);

        let over_rect = tree.leaf(over).unwrap().typographic_bounds();
        let base_rect = tree.leaf(base).unwrap().typographic_bounds();
        let under_rect = tree.leaf(under).unwrap().typographic_bounds();
        assert!(over_rect.bottom() <= base_rect.y() + 0.001);
        assert!(base_rect.bottom() <= under_rect.y() + 0.001);
    }

    #[test]
    fn test_accent_sits_flush_on_base() {
        let build = |accent: bool| {
            let (mut tree, root) = EqTree::with_root();
            let mut stem = RenderStem::new(StemType::Over);
            stem.has_accent_char = accent;
            let over = tree.insert_stem(stem);
            tree.append_child(root, over);
            let base = leaf(&mut tree, "x");
            let hat = leaf(&mut tree, "\u{0302}");
            tree.append_child(over, base);
            tree.append_child(over, hat);
            laid_out(&mut tree, root);
            let base_rect = tree.leaf(base).unwrap().typographic_bounds();
            let hat_rect = tree.leaf(hat).unwrap().typographic_bounds();
            base_rect.y() - hat_rect.bottom()
        };
        assert!((build(true)).abs() < 0.001);
        assert!(build(false) > 0.0);
    }

    #[test]
    fn test_left_aligned_matrix_cell_starts_at_column() {
        let (mut tree, root) = EqTree::with_root();
        let matrix = tree.insert_stem(RenderStem::new(StemType::Matrix));
        tree.append_child(root, matrix);
        let row = tree.insert_stem(RenderStem::new(StemType::MatrixRow));
        tree.append_child(matrix, row);
        let mut narrow = RenderStem::new(StemType::MatrixCell);
        narrow.align = ViewAlign::Left;
        let narrow = tree.insert_stem(narrow);
        tree.append_child(row, narrow);
        let content = leaf(&mut tree, "1");
        tree.append_child(narrow, content);
        let wide = tree.insert_stem(RenderStem::new(StemType::MatrixCell));
        tree.append_child(row, wide);
        let wide_content = leaf(&mut tree, "123");
        tree.append_child(wide, wide_content);

        let row2 = tree.insert_stem(RenderStem::new(StemType::MatrixRow));
        tree.append_child(matrix, row2);
        for text in ["333", "4"] {
            let cell = tree.insert_stem(RenderStem::new(StemType::MatrixCell));
            tree.append_child(row2, cell);
            let c = leaf(&mut tree, text);
            tree.append_child(cell, c);
        }
        laid_out(&mut tree, root);

        // The narrow cell hugs the column start instead of centering.
        assert_eq!(tree.stem(narrow).unwrap().draw_origin.x, 0.0);
    }

    #[test]
    fn test_sqroot_overline_spans_radicand() {
        let (mut tree, root) = EqTree::with_root();
        let sqroot = tree.insert_stem(RenderStem::new(StemType::SqRoot));
        tree.append_child(root, sqroot);
        let radicand = leaf(&mut tree, "xy");
        tree.append_child(sqroot, radicand);
        laid_out(&mut tree, root);

        let stem = tree.stem(sqroot).unwrap();
        assert!(stem.has_overline);
        let rad_rect = tree.leaf(radicand).unwrap().typographic_bounds();
        assert!((stem.overline_start.x - rad_rect.x()).abs() < 0.001);
        assert!((stem.overline_end.x - rad_rect.right()).abs() < 0.001);
        assert!(stem.overline_start.y < rad_rect.y());
    }

    #[test]
    fn test_nroot_index_pushes_content_right() {
        let (mut tree, root) = EqTree::with_root();
        let nroot = tree.insert_stem(
            RenderStem::new(StemType::NRoot).with_supplementary_data(RenderData::new("3")),
        );
        tree.append_child(root, nroot);
        let radicand = leaf(&mut tree, "x");
        tree.append_child(nroot, radicand);

        let (mut plain_tree, plain_root) = EqTree::with_root();
        let sqroot = plain_tree.insert_stem(RenderStem::new(StemType::SqRoot));
        plain_tree.append_child(plain_root, sqroot);
        let plain_radicand = leaf(&mut plain_tree, "x");
        plain_tree.append_child(sqroot, plain_radicand);

        laid_out(&mut tree, root);
        laid_out(&mut plain_tree, plain_root);

        let nroot_start = tree.stem(nroot).unwrap().overline_start.x;
        let sqroot_start = plain_tree.stem(sqroot).unwrap().overline_start.x;
        assert!(nroot_start > sqroot_start);

        let metrics = TextFontMetrics;
        let engine = LayoutEngine::new(&metrics);
        assert!(engine.compute_left_adjustment(&tree, nroot) > 0.0);
    }

    #[test]
    fn test_matrix_columns_align() {
        let (mut tree, root) = EqTree::with_root();
        let matrix = tree.insert_stem(RenderStem::new(StemType::Matrix));
        tree.append_child(root, matrix);
        let mut cell_ids = Vec::new();
        for row_values in [["1", "22"], ["333", "4"]] {
            let row = tree.insert_stem(RenderStem::new(StemType::MatrixRow));
            tree.append_child(matrix, row);
            for value in row_values {
                let cell = tree.insert_stem(RenderStem::new(StemType::MatrixCell));
                tree.append_child(row, cell);
                let content = leaf(&mut tree, value);
                tree.append_child(cell, content);
                cell_ids.push(cell);
            }
        }
        laid_out(&mut tree, root);

        // Cells in the same column share a center x.
        let rect = |id: NodeId| tree.stem(id).unwrap().draw_bounds;
        assert!((rect(cell_ids[0]).center_x() - rect(cell_ids[2]).center_x()).abs() < 0.001);
        assert!((rect(cell_ids[1]).center_x() - rect(cell_ids[3]).center_x()).abs() < 0.001);
        // Rows stack downward.
        let row0 = tree.stem(tree.stem(matrix).unwrap().children[0]).unwrap().draw_origin.y;
        let row1 = tree.stem(tree.stem(matrix).unwrap().children[1]).unwrap().draw_origin.y;
        assert!(row1 > row0);
    }

    #[test]
    fn test_tall_content_stretches_brackets() {
        // A fraction between parens forces an assembled bracer and a wider
        // advance than the plain glyph.
        let (mut tree, root) = EqTree::with_root();
        let open = stretchy_leaf(&mut tree, "(");
        tree.append_child(root, open);
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let num = leaf(&mut tree, "a");
        let den = leaf(&mut tree, "b");
        tree.append_child(frac, num);
        tree.append_child(frac, den);
        let close = stretchy_leaf(&mut tree, ")");
        tree.append_child(root, close);
        laid_out(&mut tree, root);

        let open_leaf = tree.leaf(open).unwrap();
        assert!(open_leaf.has_stretchy_data());
        let assembled = &open_leaf.stretchy_records()[0].bracer;
        assert!(assembled.kind != BracerKind::Empty);
        let metrics = TextFontMetrics;
        assert!(assembled.advance_width() > metrics.advance('(', DEFAULT_FONT_SIZE));

        // The fraction was pushed right of the assembled bracer.
        let frac_x = tree.stem(frac).unwrap().draw_origin.x;
        assert!(frac_x >= assembled.advance_width() - 0.001);
    }

    #[test]
    fn test_opening_bracer_kern_clears_following_content() {
        let (mut tree, root) = EqTree::with_root();
        let open = stretchy_leaf(&mut tree, "(");
        tree.append_child(root, open);
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let num = leaf(&mut tree, "a");
        let den = leaf(&mut tree, "b");
        tree.append_child(frac, num);
        tree.append_child(frac, den);
        let close = stretchy_leaf(&mut tree, ")");
        tree.append_child(root, close);
        laid_out(&mut tree, root);

        let assembled = &tree.leaf(open).unwrap().stretchy_records()[0].bracer;
        assert!(assembled.kern_adjustment() > 0.0);
        // The content after the opening stack sits past advance plus kern.
        let frac_x = tree.stem(frac).unwrap().draw_origin.x;
        let expected = assembled.advance_width() + assembled.kern_adjustment();
        assert!((frac_x - expected).abs() < 0.001);

        // Closing-side assemblies carry no kern.
        let closing = &tree.leaf(close).unwrap().stretchy_records()[0].bracer;
        assert_eq!(closing.kern_adjustment(), 0.0);
    }

    #[test]
    fn test_short_content_keeps_plain_brackets() {
        let (mut tree, root) = EqTree::with_root();
        let open = stretchy_leaf(&mut tree, "(");
        let x = leaf(&mut tree, "x");
        let close = stretchy_leaf(&mut tree, ")");
        tree.append_child(root, open);
        tree.append_child(root, x);
        tree.append_child(root, close);
        laid_out(&mut tree, root);
        assert!(!tree.leaf(open).unwrap().has_stretchy_data());
    }

    #[test]
    fn test_relayout_is_idempotent() {
        let (mut tree, root) = EqTree::with_root();
        let open = stretchy_leaf(&mut tree, "(");
        tree.append_child(root, open);
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let num = leaf(&mut tree, "a");
        let den = leaf(&mut tree, "b");
        tree.append_child(frac, num);
        tree.append_child(frac, den);
        let close = stretchy_leaf(&mut tree, ")");
        tree.append_child(root, close);

        laid_out(&mut tree, root);
        let first = tree.clone();
        // Force a second full pass despite clean revisions.
        tree.mark_dirty(root);
        laid_out(&mut tree, root);

        assert_eq!(
            tree.leaf(open).unwrap().typographic_bounds(),
            first.leaf(open).unwrap().typographic_bounds()
        );
        assert_eq!(tree.stem(frac).unwrap().draw_bounds, first.stem(frac).unwrap().draw_bounds);
        assert_eq!(tree.stem(root).unwrap().draw_size, first.stem(root).unwrap().draw_size);
        assert_eq!(
            tree.leaf(open).unwrap().stretchy_records(),
            first.leaf(open).unwrap().stretchy_records()
        );
    }

    #[test]
    fn test_clean_root_skips_pass() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        laid_out(&mut tree, root);
        assert!(!tree.stem(root).unwrap().is_dirty());
        // A second call leaves geometry untouched.
        let before = tree.clone();
        laid_out(&mut tree, root);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_shift_children_after() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        let c = leaf(&mut tree, "c");
        tree.append_child(root, a);
        tree.append_child(root, b);
        tree.append_child(root, c);
        laid_out(&mut tree, root);

        let metrics = TextFontMetrics;
        let engine = LayoutEngine::new(&metrics);
        let b_before = tree.leaf(b).unwrap().draw_origin.x;
        let c_before = tree.leaf(c).unwrap().draw_origin.x;
        engine.shift_children_after(&mut tree, root, 1, 5.0);
        assert_eq!(tree.leaf(b).unwrap().draw_origin.x, b_before);
        assert_eq!(tree.leaf(c).unwrap().draw_origin.x, c_before + 5.0);
    }

    #[test]
    fn test_update_bounds_tracks_children() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "ab");
        tree.append_child(root, a);
        laid_out(&mut tree, root);

        let metrics = TextFontMetrics;
        let engine = LayoutEngine::new(&metrics);
        engine.shift_layout_horizontally(&mut tree, a, 7.0);
        engine.update_bounds(&mut tree, root);
        let size = tree.stem(root).unwrap().draw_size;
        let a_rect = tree.leaf(a).unwrap().typographic_bounds();
        assert!((size.width - a_rect.right()).abs() < 0.001);
    }

    proptest! {
        #[test]
        fn prop_relayout_reproduces_geometry(
            texts in proptest::collection::vec("[a-z0-9]{1,3}", 1..4),
            num in "[a-z]{1,2}",
            den in "[a-z0-9]{1,3}",
        ) {
            let (mut tree, root) = EqTree::with_root();
            let open = stretchy_leaf(&mut tree, "(");
            tree.append_child(root, open);
            let mut leaves = vec![open];
            for text in &texts {
                let id = leaf(&mut tree, text);
                tree.append_child(root, id);
                leaves.push(id);
            }
            let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
            tree.append_child(root, frac);
            let n = leaf(&mut tree, &num);
            let d = leaf(&mut tree, &den);
            tree.append_child(frac, n);
            tree.append_child(frac, d);
            let close = stretchy_leaf(&mut tree, ")");
            tree.append_child(root, close);
            leaves.extend([n, d, close]);

            laid_out(&mut tree, root);
            let first = tree.clone();
            tree.mark_dirty(root);
            laid_out(&mut tree, root);

            for &id in &leaves {
                prop_assert_eq!(
                    tree.leaf(id).unwrap().typographic_bounds_with_stretchy(),
                    first.leaf(id).unwrap().typographic_bounds_with_stretchy()
                );
            }
            prop_assert_eq!(
                tree.stem(root).unwrap().draw_size,
                first.stem(root).unwrap().draw_size
            );
        }
    }
}

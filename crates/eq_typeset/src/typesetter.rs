//! Typesetter - turns input events and edits into a laid-out equation tree.
//!
//! The typesetter owns the policy layer: leaf coalescing, math styling,
//! structural rewrites like the fraction-slash shortcut, and inter-run
//! kerning. Geometry itself is delegated to the layout engine.

use crate::error::EqResult;
use crate::layout::LayoutEngine;
use crate::metrics::{FontMetrics, DEFAULT_FONT_SIZE};
use crate::parsed::{InputEvent, MathVariant, ParsedLeafType};
use crate::render_data::RenderData;
use crate::tables;
use crate::tree::{EqTree, Node, NodeId, RenderStem, StemType};
use std::ops::Range;

/// Kern either side of a binary operator, in em.
const OPERATOR_KERN_FACTOR: f32 = 0.12;
/// Advance added for a typed space, in em.
const SPACE_ADVANCE_FACTOR: f32 = 0.20;

pub struct Typesetter<'m> {
    metrics: &'m dyn FontMetrics,
}

impl<'m> Typesetter<'m> {
    pub fn new(metrics: &'m dyn FontMetrics) -> Self {
        Self { metrics }
    }

    // -- tree construction ---------------------------------------------------

    /// Build a tree from a structural event stream. Compatible adjacent
    /// leaves coalesce into one run; unmatched close markers are ignored
    /// with a warning, and unclosed stems are treated as closed at the end
    /// of the stream.
    pub fn build_tree(
        &self,
        events: impl IntoIterator<Item = InputEvent>,
    ) -> EqResult<(EqTree, NodeId)> {
        let (mut tree, root) = EqTree::with_root();
        let mut stack = vec![root];

        for event in events {
            match event {
                InputEvent::Leaf(parsed) => {
                    let container = *stack.last().unwrap_or(&root);
                    let accent = parsed
                        .text
                        .chars()
                        .any(|c| tables::accent_op_characters().contains(&c));
                    if accent {
                        if let Some(stem) = tree.stem_mut(container) {
                            if matches!(stem.stem_type, StemType::Over | StemType::UnderOver) {
                                stem.has_accent_char = true;
                            }
                        }
                    }
                    let mut data = RenderData::from_parsed(&parsed, DEFAULT_FONT_SIZE);
                    Self::apply_math_style(&mut data, parsed.leaf_type);
                    self.append_or_merge(&mut tree, container, data);
                }
                InputEvent::Open(stem_type) => {
                    let container = *stack.last().unwrap_or(&root);
                    let stem = tree.insert_stem(RenderStem::new(stem_type));
                    tree.append_child(container, stem);
                    stack.push(stem);
                }
                InputEvent::Close => {
                    if stack.len() > 1 {
                        stack.pop();
                    } else {
                        tracing::warn!("unmatched close marker ignored");
                    }
                }
            }
        }
        if stack.len() > 1 {
            tracing::warn!(unclosed = stack.len() - 1, "input stream left stems open");
        }

        self.layout_render_stems_from_root(&mut tree, root)?;
        Ok((tree, root))
    }

    fn append_or_merge(&self, tree: &mut EqTree, container: NodeId, data: RenderData) {
        if let Some(last) = tree.last_child(container) {
            if let Some(existing) = tree.leaf(last) {
                if existing.can_merge_with(&data) {
                    if let Some(existing) = tree.leaf_mut(last) {
                        existing.merge_with(&data);
                    }
                    tree.mark_dirty(last);
                    return;
                }
            }
        }
        let leaf = tree.insert_leaf(data);
        tree.append_child(container, leaf);
    }

    // -- editing -------------------------------------------------------------

    /// Insert typed text at the current insertion row, character by
    /// character, then re-run layout.
    pub fn add_data(&self, tree: &mut EqTree, root: NodeId, text: &str) -> EqResult<()> {
        for ch in text.chars() {
            self.parse_text_for_operation(tree, root, ch);
        }
        self.layout_render_stems_from_root(tree, root)
    }

    /// Replace a character range inside one leaf, then re-run layout.
    pub fn replace_data_in_range(
        &self,
        tree: &mut EqTree,
        root: NodeId,
        leaf: NodeId,
        range: Range<usize>,
        text: &str,
    ) -> EqResult<()> {
        if let Some(data) = tree.leaf_mut(leaf) {
            data.replace_range(range, text);
        }
        tree.mark_dirty(leaf);
        self.layout_render_stems_from_root(tree, root)
    }

    /// Remove the last character of the trailing run; an emptied run is
    /// detached and destroyed.
    pub fn delete_backward(&self, tree: &mut EqTree, root: NodeId) -> EqResult<()> {
        let row = self.insertion_row(tree, root);
        let Some(last) = tree.last_child(row) else {
            return Ok(());
        };
        match tree.node(last) {
            Some(Node::Leaf(data)) => {
                let len = data.char_len();
                if len <= 1 {
                    tree.remove_child(row, last);
                    tree.release_subtree(last);
                } else if let Some(data) = tree.leaf_mut(last) {
                    data.delete_range(len - 1..len);
                }
                tree.mark_dirty(row);
            }
            Some(Node::Stem(_)) => {
                tree.remove_child(row, last);
                tree.release_subtree(last);
            }
            None => {}
        }
        self.layout_render_stems_from_root(tree, root)
    }

    /// Classify one typed character and apply the matching structural or
    /// textual operation.
    fn parse_text_for_operation(&self, tree: &mut EqTree, root: NodeId, ch: char) {
        let row = self.insertion_row(tree, root);
        if ch == '/' {
            self.wrap_trailing_run_in_fraction(tree, row);
            return;
        }
        if ch == ' ' {
            if let Some(last) = tree.last_child(row) {
                if let Some(data) = tree.leaf_mut(last) {
                    data.width_space += DEFAULT_FONT_SIZE * SPACE_ADVANCE_FACTOR;
                    data.has_auto_replaced_space = true;
                    tree.mark_dirty(last);
                }
            }
            return;
        }

        let mut data = RenderData::new(ch.to_string());
        if tables::stretchy_bracer_characters().contains(&ch) {
            data.has_stretchy_attr = true;
        } else if tables::large_op_characters().contains(&ch) {
            data.has_large_op_attr = true;
        }
        let is_bracket = tables::left_bracket_characters().contains(&ch)
            || tables::right_bracket_characters().contains(&ch);
        let leaf_type = if ch.is_ascii_digit() {
            ParsedLeafType::MN
        } else if is_bracket || tables::is_operator_char(ch) {
            ParsedLeafType::MO
        } else {
            ParsedLeafType::MI
        };
        Self::apply_math_style(&mut data, leaf_type);
        self.append_or_merge(tree, row, data);

        // A completed function name flips upright.
        if let Some(last) = tree.last_child(row) {
            if let Some(data) = tree.leaf_mut(last) {
                if tables::function_names().contains(data.text.as_str()) {
                    let mut style = data.style;
                    style.variant = MathVariant::Normal;
                    data.set_style(style);
                    tree.mark_dirty(last);
                }
            }
        }
    }

    /// The fraction-slash shortcut: the trailing run becomes the numerator
    /// of a new fraction, and typing continues in the denominator.
    fn wrap_trailing_run_in_fraction(&self, tree: &mut EqTree, row: NodeId) {
        let numerator_row = tree.insert_stem(RenderStem::new(StemType::Row));
        if let Some(last) = tree.last_child(row) {
            tree.remove_child(row, last);
            tree.append_child(numerator_row, last);
        }
        let denominator_row = tree.insert_stem(RenderStem::new(StemType::Row));
        let fraction = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(fraction, numerator_row);
        tree.append_child(fraction, denominator_row);
        tree.append_child(row, fraction);
        tracing::debug!("wrapped trailing run into a fraction");
    }

    /// Deepest row-like stem along the last-child chain; new input lands
    /// there. After a fraction rewrite this is the denominator row.
    fn insertion_row(&self, tree: &EqTree, root: NodeId) -> NodeId {
        let mut deepest = root;
        let mut current = root;
        while let Some(last) = tree.last_child(current) {
            if let Some(stem) = tree.stem(last) {
                if stem.stem_type.is_row_like() {
                    deepest = last;
                }
                current = last;
            } else {
                break;
            }
        }
        deepest
    }

    // -- styling -------------------------------------------------------------

    /// Apply default math styling to a run: italic single-letter
    /// identifiers, upright numbers and function names, and math-alphabet
    /// character substitution for script, fraktur, and double-struck
    /// variants.
    pub fn apply_math_style(data: &mut RenderData, leaf_type: ParsedLeafType) {
        let mut style = data.style;
        match style.variant {
            MathVariant::Script | MathVariant::BoldScript => {
                let mapped: String = data.text.chars().map(tables::script_char).collect();
                data.replace_range(0..data.char_len(), &mapped);
            }
            MathVariant::Fraktur | MathVariant::BoldFraktur => {
                let mapped: String = data.text.chars().map(tables::fraktur_char).collect();
                data.replace_range(0..data.char_len(), &mapped);
            }
            MathVariant::DoubleStruck => {
                let mapped: String = data.text.chars().map(tables::double_struck_char).collect();
                data.replace_range(0..data.char_len(), &mapped);
            }
            _ => {}
        }

        if style.variant == MathVariant::Normal {
            match leaf_type {
                ParsedLeafType::MI => {
                    let chars: Vec<char> = data.text.chars().collect();
                    let single_letter =
                        chars.len() == 1 && (chars[0].is_alphabetic() || tables::is_greek(chars[0]));
                    if single_letter && !tables::function_names().contains(data.text.as_str()) {
                        style.variant = MathVariant::Italic;
                    }
                }
                ParsedLeafType::MN
                | ParsedLeafType::MO
                | ParsedLeafType::MText
                | ParsedLeafType::MSpace
                | ParsedLeafType::Unknown => {}
            }
        }
        data.set_style(style);
    }

    // -- kerning -------------------------------------------------------------

    /// Recompute stored kerns between adjacent runs in every row: italic
    /// correction after slanted letters, plus symmetric padding around
    /// binary operators.
    pub fn kern_math(&self, tree: &mut EqTree, root: NodeId) {
        for node in tree.descendants(root) {
            let Some(stem) = tree.stem(node) else {
                continue;
            };
            if !stem.stem_type.is_row_like() {
                continue;
            }
            let children = stem.children.clone();
            for pair in children.windows(2) {
                let (first, second) = (pair[0], pair[1]);
                let kern = self.kern_between(tree, first, second);
                if let Some(data) = tree.leaf_mut(first) {
                    data.stored_kern = kern;
                }
            }
            // The trailing run carries no kern.
            if let Some(&last) = children.last() {
                if let Some(data) = tree.leaf_mut(last) {
                    data.stored_kern = 0.0;
                }
            }
        }
    }

    fn kern_between(&self, tree: &EqTree, first: NodeId, second: NodeId) -> f32 {
        let Some(a) = tree.leaf(first) else {
            return 0.0;
        };
        let font_size = a.style.font_size;
        let mut kern = 0.0;

        let trailing = a.text.chars().last();
        let leading = tree
            .leaf(second)
            .and_then(|b| b.text.chars().next())
            .or_else(|| Some('\0'));

        if let Some(last) = trailing {
            let slanted = a.style.variant.is_italic()
                || tables::italic_adjust_characters().contains(&last);
            if slanted {
                kern += self.metrics.italic_correction(last, font_size);
            }
            // No operator padding against an adjacent closing bracket.
            let before_close = leading
                .map(|c| tables::right_bracket_characters().contains(&c))
                .unwrap_or(false);
            if tables::is_operator_char(last) && !before_close {
                kern += font_size * OPERATOR_KERN_FACTOR;
            }
        }
        if let Some(first_char) = leading {
            // A unary operator binds tight after an opening bracket.
            let after_open = trailing
                .map(|c| tables::left_bracket_characters().contains(&c))
                .unwrap_or(false);
            if tables::is_operator_char(first_char) && !after_open {
                kern += font_size * OPERATOR_KERN_FACTOR;
            }
        }
        kern
    }

    // -- layout entry points -------------------------------------------------

    /// Size every leaf at its cascade font without re-placing anything.
    pub fn size_render_data(&self, tree: &mut EqTree, root: NodeId) {
        for node in tree.descendants(root) {
            let class = tree.size_class(node);
            if let Some(data) = tree.leaf_mut(node) {
                let mut style = data.style;
                style.font_size = class.font_size();
                data.set_style(style);
                if data.is_dirty() {
                    data.measure(self.metrics);
                }
            }
        }
    }

    /// Full pass: recompute kerns, then lay out the whole tree.
    pub fn layout_render_stems_from_root(&self, tree: &mut EqTree, root: NodeId) -> EqResult<()> {
        self.kern_math(tree, root);
        LayoutEngine::new(self.metrics).layout(tree, root)
    }
}

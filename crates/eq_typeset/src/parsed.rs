//! Parsed input leaves - the abstract token stream the engine consumes
//!
//! An external parser (TeX string or MathML) reduces markup to a flat
//! sequence of leaf descriptors plus structural boundary markers. The engine
//! reconstructs nesting from the markers and never sees markup syntax.

use crate::tree::StemType;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Leaf category derived from the source markup element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ParsedLeafType {
    #[default]
    Unknown,
    /// Identifier (variable, function name)
    MI,
    /// Operator
    MO,
    /// Number
    MN,
    /// Literal text, no math styling
    MText,
    /// Explicit spacing
    MSpace,
}

/// Math variant attribute carried by a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MathVariant {
    #[default]
    Normal,
    Bold,
    Italic,
    BoldItalic,
    DoubleStruck,
    BoldFraktur,
    Script,
    BoldScript,
    Fraktur,
    SansSerif,
    BoldSansSerif,
    SansSerifItalic,
    SansSerifBoldItalic,
    Monospace,
}

impl MathVariant {
    /// Parse a `mathvariant` attribute value. Unknown strings fall back to
    /// `Normal` rather than failing.
    pub fn from_attr(attr: &str) -> Self {
        match attr {
            "normal" => MathVariant::Normal,
            "bold" => MathVariant::Bold,
            "italic" => MathVariant::Italic,
            "bold-italic" => MathVariant::BoldItalic,
            "double-struck" => MathVariant::DoubleStruck,
            "bold-fraktur" => MathVariant::BoldFraktur,
            "script" => MathVariant::Script,
            "bold-script" => MathVariant::BoldScript,
            "fraktur" => MathVariant::Fraktur,
            "sans-serif" => MathVariant::SansSerif,
            "bold-sans-serif" => MathVariant::BoldSansSerif,
            "sans-serif-italic" => MathVariant::SansSerifItalic,
            "sans-serif-bold-italic" => MathVariant::SansSerifBoldItalic,
            "monospace" => MathVariant::Monospace,
            _ => MathVariant::Normal,
        }
    }

    /// Whether the variant renders slanted.
    pub fn is_italic(&self) -> bool {
        matches!(
            self,
            MathVariant::Italic
                | MathVariant::BoldItalic
                | MathVariant::SansSerifItalic
                | MathVariant::SansSerifBoldItalic
        )
    }
}

/// A terminal unit from the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLeaf {
    pub text: String,
    pub leaf_type: ParsedLeafType,
    pub variant: MathVariant,
    /// Character range in the source this leaf covers.
    pub parsed_range: Range<usize>,
    /// Delimiter that should stretch to enclosed content height.
    pub has_stretchy_attr: bool,
    /// Operator rendered at large-op size (sum, integral, ...).
    pub has_large_op_attr: bool,
    /// Explicit advance for MSpace leaves, in em units.
    pub width_space: f32,
}

impl ParsedLeaf {
    pub fn new(text: impl Into<String>, leaf_type: ParsedLeafType, parsed_range: Range<usize>) -> Self {
        Self {
            text: text.into(),
            leaf_type,
            variant: MathVariant::default(),
            parsed_range,
            has_stretchy_attr: false,
            has_large_op_attr: false,
            width_space: 0.0,
        }
    }

    pub fn with_variant(mut self, variant: MathVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn stretchy(mut self) -> Self {
        self.has_stretchy_attr = true;
        self
    }

    pub fn large_op(mut self) -> Self {
        self.has_large_op_attr = true;
        self
    }

    /// Whether `other` can be folded into this leaf.
    ///
    /// Requires identical type, variant, and attribute flags; stretchy and
    /// large-op leaves are never merged since they carry per-leaf geometry.
    pub fn can_merge_with(&self, other: &ParsedLeaf) -> bool {
        self.leaf_type == other.leaf_type
            && self.variant == other.variant
            && !self.has_stretchy_attr
            && !other.has_stretchy_attr
            && !self.has_large_op_attr
            && !other.has_large_op_attr
    }

    /// Concatenate a compatible adjacent leaf into this one, extending the
    /// parsed range to cover both. Order-preserving and associative for any
    /// sequence of compatible leaves.
    pub fn merge_with(&mut self, other: &ParsedLeaf) {
        self.text.push_str(&other.text);
        let start = self.parsed_range.start.min(other.parsed_range.start);
        let end = self.parsed_range.end.max(other.parsed_range.end);
        self.parsed_range = start..end;
        self.width_space += other.width_space;
    }
}

/// One element of the input stream: a leaf, or a structural boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Leaf(ParsedLeaf),
    /// Begin a structural stem; children follow until the matching `Close`.
    Open(StemType),
    Close,
}

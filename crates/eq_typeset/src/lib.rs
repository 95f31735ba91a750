//! Equation typesetting engine
//!
//! This crate lays out mathematical notation as a structural tree of stems
//! (fractions, scripts, radicals, matrices) and leaves (styled text runs):
//! - An arena-backed equation tree with parent back-references
//! - Bottom-up layout with script size cascading and baseline alignment
//! - Stretchy bracket assembly from Unicode bracket-piece glyphs
//! - A typesetter for event-stream construction and interactive edits
//! - Flattening into positioned draw primitives for a host surface
//! - Multi-line composition with optional scaling and vertical flip

pub mod bracer;
pub mod composer;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod metrics;
pub mod parsed;
pub mod render;
pub mod render_data;
pub mod tables;
pub mod tree;
pub mod typesetter;

pub use bracer::{BracerKind, PositionedGlyph, StretchyBracer};
pub use composer::{EquationComposer, EquationLine};
pub use error::{EqError, EqResult};
pub use geometry::{Point, Rect, Size};
pub use layout::LayoutEngine;
pub use metrics::{FontMetrics, SizeClass, TextFontMetrics, DEFAULT_FONT_SIZE};
pub use parsed::{InputEvent, MathVariant, ParsedLeaf, ParsedLeafType};
pub use render::{DrawPrimitive, RenderOutput, Renderer};
pub use render_data::{RenderData, RunStyle, StretchyRecord};
pub use tree::{EqTree, Node, NodeId, RenderStem, StemType, ViewAlign};
pub use typesetter::Typesetter;

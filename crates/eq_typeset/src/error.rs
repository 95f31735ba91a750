//! Error types for the typesetting engine

use thiserror::Error;

/// Errors that can occur in typesetting operations
///
/// Malformed markup-level input (unknown math variant, unmatched bracket)
/// never produces an error; those fall back to documented defaults. Errors
/// here are structural contract violations or serialization failures.
#[derive(Error, Debug)]
pub enum EqError {
    /// Invalid stem/leaf tree structure
    #[error("invalid equation structure: {0}")]
    InvalidStructure(String),

    /// Error during layout calculation
    #[error("layout error: {0}")]
    Layout(String),

    /// The equation has no content to lay out or draw
    #[error("equation is empty")]
    EmptyEquation,

    /// Serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for typesetting operations
pub type EqResult<T> = Result<T, EqError>;

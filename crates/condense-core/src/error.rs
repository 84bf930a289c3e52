//! Error types for the document model and configuration

use thiserror::Error;

/// Markup could not be turned into a [`crate::ContextDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("expected {expected} at byte {pos}")]
    Unexpected { pos: usize, expected: &'static str },

    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedTag { expected: String, found: String },

    #[error("root element must be <context>, found <{0}>")]
    UnknownRoot(String),

    #[error("unsupported entity &{0};")]
    BadEntity(String),

    #[error("trailing content after root element at byte {0}")]
    TrailingContent(usize),

    #[error("no section boundaries found")]
    NoSections,
}

/// Configuration values outside their documented domain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown section name: {0}")]
    UnknownSection(String),

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("max_features must be at least 1")]
    ZeroFeatures,
}

//! Error types for compression stages

use condense_core::ParseError;
use thiserror::Error;

/// Generative collaborator failures. Every variant is recoverable: the
/// caller falls back to a deterministic stage.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("no generative compressor configured")]
    NotConfigured,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned an empty completion")]
    EmptyResponse,

    #[error("could not start request runtime: {0}")]
    Runtime(String),
}

/// Terminal failure of [`crate::Orchestrator::compress_markup`]
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("input is not recoverable: {source}")]
    Unrecoverable {
        #[source]
        source: ParseError,
    },
}

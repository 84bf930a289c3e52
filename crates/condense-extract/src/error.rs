//! Error types for segmentation and vectorization

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("segmenter {0} is not available")]
    Unavailable(String),

    #[error("segmenter {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Sentences could not be turned into a usable term-weight matrix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VectorizationError {
    #[error("no documents to vectorize")]
    NoDocuments,

    #[error("vocabulary is empty")]
    EmptyVocabulary,

    #[error("need at least 2 distinct terms, found {0}")]
    TooFewTerms(usize),
}

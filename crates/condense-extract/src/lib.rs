//! Sentence segmentation and TF-IDF extractive summarization

mod error;
pub mod segment;
mod summarizer;
mod tfidf;

pub use error::{SegmentError, VectorizationError};
pub use segment::{detect_language, Language, RegexSegmenter, Segmentation, SegmentationService, Segmenter};
pub use summarizer::{target_count, ExtractiveSummarizer, SelectionMethod, Summary, TextSummary};
pub use tfidf::{TfIdfMatrix, TfIdfVectorizer};

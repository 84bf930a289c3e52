//! Budgeted context compression: staged pipeline, history compaction,
//! line packing, generative collaborator and on-disk persistence

pub mod compressor;
mod error;
mod history;
mod packer;
mod pipeline;
mod storage;
mod store;

pub use compressor::{
    ChatCompletionsCompressor, CollaboratorSettings, CompressionPrompt, GenerativeCompressor,
};
pub use error::{CollaboratorError, CompressError};
pub use history::{HistoryCompressor, HistoryMethod, HistoryOutcome, HistoryReport};
pub use packer::{pack, PackOptions, PackResult};
pub use pipeline::{
    CompressionMethod, CompressionOutcome, CompressionReport, ExtractiveReport, MarkupOutcome,
    MarkupStatus, Orchestrator, OutcomeFlag, PackResultSummary,
};
pub use storage::{RunLog, RunRecord, RunStats};
pub use store::{validate_owner, ContextStore};

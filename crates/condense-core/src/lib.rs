//! Context document model, markup codec and compression configuration

mod append;
mod config;
mod error;
pub mod markup;
mod types;

pub use config::{CompressionConfig, PrioritySections};
pub use error::{ConfigError, ParseError};
pub use markup::{parse, parse_best_effort, render, ParseStatus};
pub use types::{
    parse_timestamp, AgentRecord, BackgroundEntry, BackgroundFields, ContextDocument, HistoryEntry,
    PlanIteration, Role, SectionKind,
};

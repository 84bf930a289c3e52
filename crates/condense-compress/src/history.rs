//! Sectional history compression
//!
//! The most recent turns are kept verbatim. The split point is moved to a
//! `user` turn near the token boundary so the kept tail opens with a request
//! rather than a dangling reply. The older head is summarized by the
//! generative collaborator when one is available, otherwise truncated.

use crate::compressor::{history_prompt, GenerativeCompressor};
use condense_core::markup::{parse_history_fragment, render_history};
use condense_core::{HistoryEntry, Role};
use condense_telemetry::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMethod {
    Unchanged,
    Generative,
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReport {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub ratio: f64,
    /// Index where backward accumulation of preserved tokens stopped
    pub tentative_boundary: usize,
    pub split: usize,
    pub head_len: usize,
    pub tail_len: usize,
    pub method: HistoryMethod,
    pub collaborator_error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryOutcome {
    pub entries: Vec<HistoryEntry>,
    pub report: HistoryReport,
}

pub struct HistoryCompressor {
    estimator: Arc<dyn TokenEstimator>,
    collaborator: Option<Arc<dyn GenerativeCompressor>>,
}

impl HistoryCompressor {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            collaborator: None,
        }
    }

    pub fn with_collaborator(mut self, collaborator: Option<Arc<dyn GenerativeCompressor>>) -> Self {
        self.collaborator = collaborator;
        self
    }

    fn cost(&self, entries: &[HistoryEntry]) -> usize {
        entries.iter().map(|e| self.estimator.estimate(&e.message)).sum()
    }

    /// Compress `entries`, keeping roughly `preserve_tokens` of recent turns
    /// verbatim and shrinking the rest towards `old_ratio` of its size
    pub fn compress(&self, entries: &[HistoryEntry], preserve_tokens: usize, old_ratio: f64) -> HistoryOutcome {
        let costs: Vec<usize> = entries.iter().map(|e| self.estimator.estimate(&e.message)).collect();
        let original_tokens: usize = costs.iter().sum();
        let n = entries.len();

        if original_tokens <= preserve_tokens {
            tracing::debug!(original_tokens, preserve_tokens, "history within preserve window");
            return unchanged(entries, original_tokens, n, n);
        }

        let boundary = tentative_boundary(&costs, preserve_tokens);
        let split = user_split(entries, boundary);
        let (head, tail) = entries.split_at(split);
        if head.is_empty() {
            tracing::debug!(boundary, "no older turns to compress");
            return unchanged(entries, original_tokens, boundary, split);
        }

        let head_tokens: usize = costs[..split].iter().sum();
        let target_head_tokens = (head_tokens as f64 * old_ratio).floor() as usize;

        let mut collaborator_error = None;
        let mut compressed_head = None;
        if let Some(collaborator) = &self.collaborator {
            let prompt = history_prompt(&render_history(head), head_tokens, target_head_tokens);
            match collaborator.compress(&prompt, target_head_tokens) {
                Ok(summary) => compressed_head = Some(vec![HistoryEntry::new(Role::System, summary)]),
                Err(err) => {
                    tracing::warn!(error = %err, "history summarization failed, truncating head");
                    collaborator_error = Some(err.to_string());
                }
            }
        }

        let (head_entries, method) = match compressed_head {
            Some(summary) => (summary, HistoryMethod::Generative),
            None => {
                let keep = ((head.len() as f64 * old_ratio) - 1e-9).ceil().max(1.0) as usize;
                (head[..keep.min(head.len())].to_vec(), HistoryMethod::Truncated)
            }
        };

        let mut result = head_entries;
        result.extend_from_slice(tail);
        let compressed_tokens = self.cost(&result);

        tracing::info!(
            original_tokens,
            compressed_tokens,
            split,
            method = ?method,
            "history compressed"
        );

        let report = HistoryReport {
            original_tokens,
            compressed_tokens,
            ratio: ratio(compressed_tokens, original_tokens),
            tentative_boundary: boundary,
            split,
            head_len: split,
            tail_len: tail.len(),
            method,
            success: compressed_tokens <= original_tokens && collaborator_error.is_none(),
            collaborator_error,
        };
        HistoryOutcome { entries: result, report }
    }

    /// Compress history given as `<entry role=..>` markup
    pub fn compress_fragment(&self, text: &str, preserve_tokens: usize, old_ratio: f64) -> (String, HistoryReport) {
        let entries = parse_history_fragment(text);
        let outcome = self.compress(&entries, preserve_tokens, old_ratio);
        (render_history(&outcome.entries), outcome.report)
    }
}

/// Walk backwards accumulating costs while they fit in `preserve_tokens`
fn tentative_boundary(costs: &[usize], preserve_tokens: usize) -> usize {
    let mut running = 0usize;
    let mut boundary = costs.len();
    for (idx, &cost) in costs.iter().enumerate().rev() {
        if running + cost > preserve_tokens {
            break;
        }
        running += cost;
        boundary = idx;
    }
    boundary
}

/// First `user` turn at or after `boundary`, else the last one before it,
/// else `boundary` itself
fn user_split(entries: &[HistoryEntry], boundary: usize) -> usize {
    entries[boundary..]
        .iter()
        .position(|e| e.role.is_user())
        .map(|offset| boundary + offset)
        .or_else(|| entries[..boundary].iter().rposition(|e| e.role.is_user()))
        .unwrap_or(boundary)
}

fn ratio(compressed: usize, original: usize) -> f64 {
    if original == 0 {
        1.0
    } else {
        compressed as f64 / original as f64
    }
}

fn unchanged(entries: &[HistoryEntry], tokens: usize, boundary: usize, split: usize) -> HistoryOutcome {
    HistoryOutcome {
        entries: entries.to_vec(),
        report: HistoryReport {
            original_tokens: tokens,
            compressed_tokens: tokens,
            ratio: 1.0,
            tentative_boundary: boundary,
            split,
            head_len: 0,
            tail_len: entries.len(),
            method: HistoryMethod::Unchanged,
            collaborator_error: None,
            success: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::CompressionPrompt;
    use crate::error::CollaboratorError;
    use condense_telemetry::HeuristicEstimator;

    /// Every non-empty message costs 50 tokens
    struct FlatEstimator;

    impl TokenEstimator for FlatEstimator {
        fn estimate(&self, text: &str) -> usize {
            if text.is_empty() {
                0
            } else {
                50
            }
        }
    }

    struct Summarizer(&'static str);

    impl GenerativeCompressor for Summarizer {
        fn compress(&self, _prompt: &CompressionPrompt, _target: usize) -> Result<String, CollaboratorError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl GenerativeCompressor for Broken {
        fn compress(&self, _prompt: &CompressionPrompt, _target: usize) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::EmptyResponse)
        }
    }

    fn conversation(roles: &[&str]) -> Vec<HistoryEntry> {
        roles
            .iter()
            .enumerate()
            .map(|(i, role)| HistoryEntry::new(*role, format!("turn {i}")))
            .collect()
    }

    fn flat() -> HistoryCompressor {
        HistoryCompressor::new(Arc::new(FlatEstimator))
    }

    #[test]
    fn test_within_preserve_window_is_unchanged() {
        let entries = conversation(&["user", "assistant"]);
        let outcome = flat().compress(&entries, 100, 0.5);
        assert_eq!(outcome.entries, entries);
        assert_eq!(outcome.report.method, HistoryMethod::Unchanged);
        assert_eq!(outcome.report.ratio, 1.0);
        assert!(outcome.report.success);
    }

    #[test]
    fn test_split_moves_forward_to_user_turn() {
        let entries = conversation(&["user", "assistant", "user", "assistant", "assistant", "user"]);
        let outcome = flat().compress(&entries, 120, 0.5);
        let report = &outcome.report;

        assert_eq!(report.tentative_boundary, 4);
        assert_eq!(report.split, 5);
        assert_eq!(report.head_len, 5);
        assert_eq!(report.tail_len, 1);
        assert_eq!(report.method, HistoryMethod::Truncated);

        // ceil(5 * 0.5) head turns, then the verbatim tail
        assert_eq!(outcome.entries.len(), 4);
        assert_eq!(&outcome.entries[..3], &entries[..3]);
        assert_eq!(outcome.entries[3], entries[5]);
        assert!(outcome.entries[3].role.is_user());
        assert!(report.success);
        assert_eq!(report.compressed_tokens, 200);
    }

    #[test]
    fn test_system_opened_conversation_splits_at_last_user() {
        let entries = conversation(&["system", "user", "assistant", "user", "assistant", "user"]);
        let outcome = flat().compress(&entries, 120, 0.5);
        let report = &outcome.report;

        // Entries 4 and 5 fit in 120, entry 3 would not
        assert_eq!(report.tentative_boundary, 4);
        assert_eq!(report.split, 5);
        assert_eq!(report.head_len, 5);
        assert_eq!(report.tail_len, 1);
        assert_eq!(report.original_tokens, 300);
        assert_eq!(report.method, HistoryMethod::Truncated);

        assert_eq!(outcome.entries.len(), 4);
        assert_eq!(&outcome.entries[..3], &entries[..3]);
        assert_eq!(outcome.entries[0].role, Role::System);
        let tail = &outcome.entries[outcome.entries.len() - report.tail_len..];
        assert!(tail[0].role.is_user());
        assert_eq!(tail, &entries[5..]);
        assert_eq!(report.compressed_tokens, 200);
    }

    #[test]
    fn test_user_at_boundary_is_split_point() {
        let entries = conversation(&["assistant", "user", "assistant", "user", "assistant"]);
        // Boundary lands on index 3, which is already a user turn
        let outcome = flat().compress(&entries, 100, 0.5);
        assert_eq!(outcome.report.tentative_boundary, 3);
        assert_eq!(outcome.report.split, 3);
        assert_eq!(&outcome.entries[outcome.entries.len() - 2..], &entries[3..]);
    }

    #[test]
    fn test_split_searches_backward_when_no_user_follows() {
        let entries = conversation(&["user", "assistant", "user", "assistant", "assistant", "assistant"]);
        let outcome = flat().compress(&entries, 100, 0.5);
        assert_eq!(outcome.report.tentative_boundary, 4);
        assert_eq!(outcome.report.split, 2);
        assert_eq!(outcome.report.tail_len, 4);
        assert_eq!(outcome.entries[1].role, Role::User);
    }

    #[test]
    fn test_no_user_keeps_raw_boundary() {
        let entries = conversation(&["system", "assistant", "assistant", "assistant"]);
        let outcome = flat().compress(&entries, 100, 0.3);
        assert_eq!(outcome.report.split, 2);
        // max(1, ceil(2 * 0.3)) = 1 head turn survives
        assert_eq!(outcome.entries.len(), 3);
        assert_eq!(outcome.entries[0], entries[0]);
    }

    #[test]
    fn test_empty_head_is_unchanged() {
        let entries = conversation(&["user", "assistant", "assistant"]);
        let outcome = flat().compress(&entries, 100, 0.5);
        // Boundary 1, no user after it, backward search finds index 0
        assert_eq!(outcome.report.split, 0);
        assert_eq!(outcome.report.method, HistoryMethod::Unchanged);
        assert_eq!(outcome.entries, entries);
    }

    #[test]
    fn test_generative_head_becomes_system_entry() {
        let entries = conversation(&["user", "assistant", "user", "assistant", "assistant", "user"]);
        let compressor = flat().with_collaborator(Some(Arc::new(Summarizer("earlier: setup done"))));
        let outcome = compressor.compress(&entries, 120, 0.5);
        assert_eq!(outcome.report.method, HistoryMethod::Generative);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].role, Role::System);
        assert_eq!(outcome.entries[0].message, "earlier: setup done");
        assert_eq!(outcome.entries[1], entries[5]);
    }

    #[test]
    fn test_failed_collaborator_falls_back_to_truncation() {
        let entries = conversation(&["user", "assistant", "user", "assistant", "assistant", "user"]);
        let compressor = flat().with_collaborator(Some(Arc::new(Broken)));
        let outcome = compressor.compress(&entries, 120, 0.5);
        assert_eq!(outcome.report.method, HistoryMethod::Truncated);
        assert!(outcome.report.collaborator_error.is_some());
        assert!(!outcome.report.success);
        assert_eq!(outcome.entries.len(), 4);
    }

    #[test]
    fn test_compress_fragment_round_trips_markup() {
        let compressor = HistoryCompressor::new(Arc::new(HeuristicEstimator));
        let text = "<HISTORY>\n<entry role=\"user\">first question about the build</entry>\n\
                    <entry role=\"assistant\">a long answer about linker flags and caching</entry>\n\
                    <entry role=\"user\">follow up</entry>\n</HISTORY>";
        let (rendered, report) = compressor.compress_fragment(text, 3, 0.5);
        assert_eq!(report.split, 2);
        let entries = parse_history_fragment(&rendered);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "follow up");
        assert!(report.compressed_tokens <= report.original_tokens);
    }
}

//! Token estimation utilities
//!
//! Every budget decision in the pipeline goes through a single
//! [`TokenEstimator`] so that ratios computed by different stages agree.

use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

static LATIN_WORD_RE: OnceLock<Regex> = OnceLock::new();

/// Approximates the serialized cost of text in tokens.
///
/// Implementations must be deterministic and side-effect free.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Returns true for characters in the CJK Unified Ideographs block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Heuristic estimator used when no subword tokenizer is configured
///
/// `cjk * 1.5 + latin_words * 1.0 + rest * 0.5`, rounded down, where `rest`
/// is every character that is neither CJK nor part of a latin word
/// (whitespace included).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let word_re = LATIN_WORD_RE.get_or_init(|| Regex::new(r"\b[a-zA-Z]+\b").unwrap());

        let total_chars = text.chars().count();
        let cjk_chars = text.chars().filter(|&c| is_cjk(c)).count();

        let mut latin_words = 0usize;
        let mut latin_chars = 0usize;
        for m in word_re.find_iter(text) {
            latin_words += 1;
            // Matches are ASCII letters only, so bytes == chars.
            latin_chars += m.as_str().len();
        }

        let other_chars = total_chars.saturating_sub(cjk_chars + latin_chars);

        (cjk_chars as f64 * 1.5 + latin_words as f64 + other_chars as f64 * 0.5) as usize
    }
}

/// External subword tokenizer (BPE or similar) consumed through a narrow
/// counting interface.
pub trait SubwordTokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Exact-mode estimator delegating to a configured [`SubwordTokenizer`].
#[derive(Clone)]
pub struct SubwordEstimator {
    tokenizer: Arc<dyn SubwordTokenizer>,
}

impl SubwordEstimator {
    pub fn new(tokenizer: Arc<dyn SubwordTokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl fmt::Debug for SubwordEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubwordEstimator").finish_non_exhaustive()
    }
}

impl TokenEstimator for SubwordEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.tokenizer.count(text)
    }
}

/// Select the estimator for a process: exact mode when a tokenizer is
/// configured, heuristic otherwise.
pub fn estimator_for(tokenizer: Option<Arc<dyn SubwordTokenizer>>) -> Arc<dyn TokenEstimator> {
    match tokenizer {
        Some(t) => Arc::new(SubwordEstimator::new(t)),
        None => Arc::new(HeuristicEstimator::new()),
    }
}

/// Estimate tokens with the heuristic estimator
pub fn estimate_tokens(text: &str) -> usize {
    HeuristicEstimator.estimate(text)
}

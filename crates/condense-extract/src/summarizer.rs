//! Extractive summarization: keep the most salient sentences in their
//! original order

use crate::segment::{terms, Language, SegmentationService};
use crate::tfidf::TfIdfVectorizer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Nothing to select; input returned as is
    Passthrough,
    TfIdf,
    /// Longest sentences, used when vectorization is not possible
    Length,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub sentences: Vec<String>,
    pub kept: usize,
    pub total: usize,
    pub method: SelectionMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSummary {
    pub text: String,
    pub language: Language,
    pub summary: Summary,
}

#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    vectorizer: TfIdfVectorizer,
}

/// Number of sentences kept for `n` inputs at `ratio`
pub fn target_count(n: usize, ratio: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 1.0 };
    let raw = (n as f64 * ratio + 1e-9).floor() as usize;
    raw.clamp(1, n)
}

impl ExtractiveSummarizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            vectorizer: TfIdfVectorizer::new(max_features),
        }
    }

    pub fn summarize(&self, sentences: &[String], ratio: f64) -> Summary {
        let total = sentences.len();
        let target = target_count(total, ratio);
        if target == total {
            return Summary {
                sentences: sentences.to_vec(),
                kept: total,
                total,
                method: SelectionMethod::Passthrough,
            };
        }

        let documents: Vec<Vec<String>> = sentences.iter().map(|s| terms(s)).collect();
        let (scores, method) = match self.vectorizer.fit_transform(&documents) {
            Ok(matrix) => (matrix.row_sums(), SelectionMethod::TfIdf),
            Err(err) => {
                tracing::debug!(error = %err, "vectorization failed, ranking by length");
                let lengths = sentences.iter().map(|s| s.chars().count() as f64).collect();
                (lengths, SelectionMethod::Length)
            }
        };

        let mut order: Vec<usize> = (0..total).collect();
        // Stable: equal scores keep index order
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
        let mut selected: Vec<usize> = order.into_iter().take(target).collect();
        selected.sort_unstable();

        Summary {
            sentences: selected.iter().map(|&i| sentences[i].clone()).collect(),
            kept: target,
            total,
            method,
        }
    }

    /// Segment `text`, summarize, and rejoin with the language's joiner
    pub fn summarize_text(&self, segmentation: &SegmentationService, text: &str, ratio: f64) -> TextSummary {
        let seg = segmentation.segment(text);
        let summary = self.summarize(&seg.sentences, ratio);
        TextSummary {
            text: summary.sentences.join(seg.language.joiner()),
            language: seg.language,
            summary,
        }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_target_count() {
        assert_eq!(target_count(0, 0.5), 0);
        assert_eq!(target_count(1, 0.1), 1);
        assert_eq!(target_count(10, 0.3), 3);
        assert_eq!(target_count(10, 0.05), 1);
        assert_eq!(target_count(100, 0.29), 29);
        assert_eq!(target_count(7, 1.0), 7);
        assert_eq!(target_count(7, 4.0), 7);
    }

    #[test]
    fn test_keeps_exact_count_in_order() {
        let summarizer = ExtractiveSummarizer::default();
        let sentences: Vec<String> = (0..10)
            .map(|i| format!("Sentence number {i} mentions topic{i} and detail{} here.", i * 7))
            .collect();
        for ratio in [0.1, 0.25, 0.5, 0.6, 0.99, 1.0] {
            let summary = summarizer.summarize(&sentences, ratio);
            assert_eq!(summary.kept, target_count(10, ratio));
            assert_eq!(summary.sentences.len(), summary.kept);
            let positions: Vec<usize> = summary
                .sentences
                .iter()
                .map(|s| sentences.iter().position(|x| x == s).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_tfidf_prefers_informative_sentence() {
        let summarizer = ExtractiveSummarizer::default();
        let sentences = strings(&[
            "Okay.",
            "The borrow checker rejects aliasing mutable references at compile time.",
            "Okay okay.",
            "Sure.",
        ]);
        let summary = summarizer.summarize(&sentences, 0.25);
        assert_eq!(summary.method, SelectionMethod::TfIdf);
        assert_eq!(summary.sentences, vec![sentences[1].clone()]);
    }

    #[test]
    fn test_length_fallback_with_single_term() {
        let summarizer = ExtractiveSummarizer::default();
        let sentences = strings(&["spam.", "spam spam spam.", "spam spam."]);
        let summary = summarizer.summarize(&sentences, 0.5);
        assert_eq!(summary.method, SelectionMethod::Length);
        assert_eq!(summary.sentences, vec!["spam spam spam."]);
    }

    #[test]
    fn test_single_and_empty_input() {
        let summarizer = ExtractiveSummarizer::default();
        let one = strings(&["Only sentence."]);
        let summary = summarizer.summarize(&one, 0.1);
        assert_eq!(summary.sentences, one);
        assert_eq!(summary.method, SelectionMethod::Passthrough);

        let empty = summarizer.summarize(&[], 0.5);
        assert!(empty.sentences.is_empty());
        assert_eq!((empty.kept, empty.total), (0, 0));
    }

    #[test]
    fn test_summarize_text_rejoins_by_language() {
        let summarizer = ExtractiveSummarizer::default();
        let service = SegmentationService::new();

        let english = summarizer.summarize_text(&service, "Alpha beta gamma. Delta epsilon.", 1.0);
        assert_eq!(english.text, "Alpha beta gamma. Delta epsilon.");
        assert_eq!(english.language, Language::Other);

        let chinese = summarizer.summarize_text(&service, "今天天气很好。我们去公园散步。", 1.0);
        assert_eq!(chinese.text, "今天天气很好。我们去公园散步。");
        assert_eq!(chinese.language, Language::Cjk);
    }
}

//! TF-IDF term weighting over a small document set (sentences)

use crate::error::VectorizationError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    max_features: usize,
}

/// Row-normalized term weights, one row per document
#[derive(Debug, Clone)]
pub struct TfIdfMatrix {
    vocab: Vec<String>,
    idf: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl TfIdfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features: max_features.max(1),
        }
    }

    pub fn fit_transform(&self, documents: &[Vec<String>]) -> Result<TfIdfMatrix, VectorizationError> {
        if documents.is_empty() {
            return Err(VectorizationError::NoDocuments);
        }

        // Corpus frequency decides which terms make the cut
        let mut corpus_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in documents {
            for token in tokens {
                *corpus_freq.entry(token.as_str()).or_insert(0) += 1;
            }
        }
        if corpus_freq.is_empty() {
            return Err(VectorizationError::EmptyVocabulary);
        }
        if corpus_freq.len() < 2 {
            return Err(VectorizationError::TooFewTerms(corpus_freq.len()));
        }

        let mut ranked: Vec<(&str, usize)> = corpus_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut vocab: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        vocab.sort();
        let index: HashMap<&str, usize> = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        // Smooth IDF: ln((1 + n) / (1 + df)) + 1
        let doc_count = documents.len();
        let mut doc_freq = vec![0usize; vocab.len()];
        for tokens in documents {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for token in unique {
                if let Some(&idx) = index.get(token) {
                    doc_freq[idx] += 1;
                }
            }
        }
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1 + doc_count) as f64 / (1 + df) as f64).ln() + 1.0)
            .collect();

        let rows = documents
            .iter()
            .map(|tokens| {
                let mut row = vec![0.0; vocab.len()];
                for token in tokens {
                    if let Some(&idx) = index.get(token.as_str()) {
                        row[idx] += 1.0;
                    }
                }
                for (weight, idf_val) in row.iter_mut().zip(&idf) {
                    *weight *= idf_val;
                }
                let norm = norm(&row);
                if norm > 0.0 {
                    row.iter_mut().for_each(|w| *w /= norm);
                }
                row
            })
            .collect();

        Ok(TfIdfMatrix { vocab, idf, rows })
    }
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TfIdfMatrix {
    pub fn vocabulary(&self) -> &[String] {
        &self.vocab
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocab
            .binary_search_by(|t| t.as_str().cmp(term))
            .ok()
            .map(|idx| self.idf[idx])
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Sum of term weights per document
    pub fn row_sums(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.iter().sum()).collect()
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

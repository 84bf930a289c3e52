//! Compression orchestrator
//!
//! Stages run in a fixed order and the pipeline stops at the first one that
//! brings the document within budget:
//!
//! 1. extractive summarization of long SUB_APP agent records
//! 2. sectional history compression
//! 3. generative compression of the whole document
//! 4. the line packer, which always produces a result

use crate::compressor::{context_prompt, GenerativeCompressor};
use crate::error::CompressError;
use crate::history::{HistoryCompressor, HistoryReport};
use crate::packer::{pack, PackOptions, PackResult};
use condense_core::markup::{parse_best_effort, render};
use condense_core::{CompressionConfig, ContextDocument, ParseStatus, SectionKind};
use condense_extract::{ExtractiveSummarizer, SegmentationService};
use condense_telemetry::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    Unchanged,
    Extractive,
    History,
    Generative,
    Packer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeFlag {
    /// Result is still larger than the budget
    BudgetUnmet,
    CollaboratorFailed,
    /// Markup was malformed and recovered by pattern extraction
    ParseRecovered,
    /// Packer had to cut text mid-line
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractiveReport {
    pub agents_summarized: usize,
    pub agents_skipped: usize,
    pub sentences_kept: usize,
    pub sentences_total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub budget: usize,
    pub method: CompressionMethod,
    pub flags: Vec<OutcomeFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractive: Option<ExtractiveReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packer: Option<PackResultSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator_error: Option<String>,
}

/// Packer statistics without the packed text itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackResultSummary {
    pub kept_lines: usize,
    pub dropped_lines: usize,
    pub truncated: bool,
}

impl From<&PackResult> for PackResultSummary {
    fn from(result: &PackResult) -> Self {
        Self {
            kept_lines: result.kept_lines,
            dropped_lines: result.dropped_lines,
            truncated: result.truncated,
        }
    }
}

impl CompressionReport {
    fn new(original_tokens: usize, budget: usize) -> Self {
        Self {
            original_tokens,
            compressed_tokens: original_tokens,
            budget,
            method: CompressionMethod::Unchanged,
            flags: Vec::new(),
            extractive: None,
            history: None,
            packer: None,
            collaborator_error: None,
        }
    }

    pub fn has_flag(&self, flag: OutcomeFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn budget_met(&self) -> bool {
        self.compressed_tokens <= self.budget
    }

    fn flag(&mut self, flag: OutcomeFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub document: ContextDocument,
    /// Exact output text; `report.compressed_tokens` measures this
    pub text: String,
    pub report: CompressionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupStatus {
    Clean,
    Recovered,
    /// No section structure found; raw text was packed as lines
    Unstructured,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupOutcome {
    pub text: String,
    pub status: MarkupStatus,
    /// Absent for unstructured input
    pub document: Option<ContextDocument>,
    pub report: CompressionReport,
}

pub struct Orchestrator {
    estimator: Arc<dyn TokenEstimator>,
    segmentation: Arc<SegmentationService>,
    collaborator: Option<Arc<dyn GenerativeCompressor>>,
}

impl Orchestrator {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            segmentation: Arc::new(SegmentationService::new()),
            collaborator: None,
        }
    }

    pub fn with_segmentation(mut self, segmentation: Arc<SegmentationService>) -> Self {
        self.segmentation = segmentation;
        self
    }

    pub fn with_collaborator(mut self, collaborator: Arc<dyn GenerativeCompressor>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Compress a document towards `config.target_token_budget`. Never fails;
    /// an over-budget result is flagged instead.
    pub fn compress(&self, document: &ContextDocument, config: &CompressionConfig) -> CompressionOutcome {
        let config = config.sanitized();
        let budget = config.target_token_budget;
        let mut doc = document.clone();
        let text = render(&doc);
        let mut report = CompressionReport::new(self.estimator.estimate(&text), budget);

        if report.original_tokens <= budget {
            tracing::debug!(tokens = report.original_tokens, budget, "document within budget");
            return self.finish(doc, text, report);
        }

        if config.enable_extractive_summarization {
            report.extractive = Some(self.extractive_stage(&mut doc, &config));
            let text = render(&doc);
            if self.estimator.estimate(&text) <= budget {
                report.method = CompressionMethod::Extractive;
                return self.finish(doc, text, report);
            }
        }

        if config.enable_history_compression && !doc.history.is_empty() {
            let outcome = HistoryCompressor::new(Arc::clone(&self.estimator))
                .with_collaborator(self.collaborator.clone())
                .compress(
                    &doc.history,
                    config.history_preserve_tokens,
                    config.history_old_compression_ratio,
                );
            if let Some(err) = &outcome.report.collaborator_error {
                report.flag(OutcomeFlag::CollaboratorFailed);
                report.collaborator_error = Some(err.clone());
            }
            doc.history = outcome.entries;
            report.history = Some(outcome.report);
            let text = render(&doc);
            if self.estimator.estimate(&text) <= budget {
                report.method = CompressionMethod::History;
                return self.finish(doc, text, report);
            }
        }

        if let Some(collaborator) = &self.collaborator {
            let current = render(&doc);
            let prompt = context_prompt(
                &current,
                self.estimator.estimate(&current),
                budget,
                &config.priority_sections,
            );
            match collaborator.compress(&prompt, budget) {
                Ok(response) => match parse_best_effort(&response) {
                    Ok((compressed, status)) => {
                        if status == ParseStatus::Recovered {
                            report.flag(OutcomeFlag::ParseRecovered);
                        }
                        report.method = CompressionMethod::Generative;
                        let text = render(&compressed);
                        return self.finish(compressed, text, report);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "generative output unparseable, packing instead");
                        report.flag(OutcomeFlag::CollaboratorFailed);
                        report.collaborator_error = Some(err.to_string());
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "generative compression failed, packing instead");
                    report.flag(OutcomeFlag::CollaboratorFailed);
                    report.collaborator_error = Some(err.to_string());
                }
            }
        }

        self.pack_stage(doc, &config, report)
    }

    /// Agent records longer than the threshold are summarized one by one
    fn extractive_stage(&self, doc: &mut ContextDocument, config: &CompressionConfig) -> ExtractiveReport {
        let summarizer = ExtractiveSummarizer::new(config.max_features);
        let mut report = ExtractiveReport {
            agents_summarized: 0,
            agents_skipped: 0,
            sentences_kept: 0,
            sentences_total: 0,
        };
        for agent in &mut doc.sub_app {
            if agent.content.chars().count() <= config.min_agent_content_chars {
                report.agents_skipped += 1;
                continue;
            }
            let summary =
                summarizer.summarize_text(&self.segmentation, &agent.content, config.extractive_retention_ratio);
            report.sentences_kept += summary.summary.kept;
            report.sentences_total += summary.summary.total;
            if !summary.text.is_empty() && summary.text.len() < agent.content.len() {
                agent.content = summary.text;
            }
            report.agents_summarized += 1;
        }
        tracing::info!(
            summarized = report.agents_summarized,
            skipped = report.agents_skipped,
            "extractive stage done"
        );
        report
    }

    fn pack_stage(&self, doc: ContextDocument, config: &CompressionConfig, mut report: CompressionReport) -> CompressionOutcome {
        let options = pack_options(config);
        let mut packed = pack(&render(&doc), &options, self.estimator.as_ref());
        if packed.truncated {
            let tail_len = report.history.as_ref().map_or(0, |h| h.tail_len);
            if let Some(kept) = self.pack_keeping_tail(&doc, tail_len, &options) {
                packed = kept;
            }
        }
        if packed.truncated {
            report.flag(OutcomeFlag::Truncated);
        }
        report.packer = Some(PackResultSummary::from(&packed));
        report.method = CompressionMethod::Packer;

        let document = match parse_best_effort(&packed.text) {
            Ok((document, status)) => {
                if status == ParseStatus::Recovered {
                    report.flag(OutcomeFlag::ParseRecovered);
                }
                document
            }
            Err(err) => {
                tracing::debug!(error = %err, "packed text has no sections left");
                ContextDocument::new()
            }
        };
        self.finish(document, packed.text, report)
    }

    /// Hard truncation keeps a prefix of the text, which would cut away the
    /// history turns the history stage preserved. Pack everything in front of
    /// those turns against the budget they leave, drop the partial last line
    /// and re-append them under a `<HISTORY>` opener.
    ///
    /// `None` when there is no preserved tail or it alone does not fit.
    fn pack_keeping_tail(&self, doc: &ContextDocument, tail_len: usize, options: &PackOptions) -> Option<PackResult> {
        if tail_len == 0 || tail_len > doc.history.len() {
            return None;
        }
        let rendered = render(doc);
        let lines: Vec<&str> = rendered.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        // Tail entries render one per line, followed by `</HISTORY>` and `</context>`
        let pinned = tail_len + 2;
        if lines.len() < pinned {
            return None;
        }
        let (front, tail) = lines.split_at(lines.len() - pinned);
        let opener = format!("<{}>", SectionKind::History.tag());
        let reserved = self
            .estimator
            .estimate(&format!("\n{opener}\n{}", tail.join("\n")));
        if reserved >= options.budget {
            return None;
        }

        let front_options = PackOptions {
            budget: options.budget - reserved,
            ..options.clone()
        };
        let front_packed = pack(&front.join("\n"), &front_options, self.estimator.as_ref());
        let front_text = if front_packed.truncated {
            front_packed
                .text
                .rfind('\n')
                .map_or("", |end| &front_packed.text[..end])
        } else {
            front_packed.text.as_str()
        };

        let mut kept: Vec<&str> = front_text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if !kept.contains(&opener.as_str()) {
            kept.push(&opener);
        }
        kept.extend_from_slice(tail);
        let text = kept.join("\n");
        let tokens = self.estimator.estimate(&text);
        tracing::debug!(tail_len, tokens, "packed with preserved history tail");
        Some(PackResult {
            kept_lines: kept.len(),
            dropped_lines: lines.len().saturating_sub(kept.len()),
            text,
            tokens,
            truncated: true,
        })
    }

    fn finish(&self, document: ContextDocument, text: String, mut report: CompressionReport) -> CompressionOutcome {
        report.compressed_tokens = self.estimator.estimate(&text);
        if !report.budget_met() {
            report.flag(OutcomeFlag::BudgetUnmet);
        }
        tracing::info!(
            original = report.original_tokens,
            compressed = report.compressed_tokens,
            budget = report.budget,
            method = ?report.method,
            "compression finished"
        );
        CompressionOutcome {
            document,
            text,
            report,
        }
    }

    /// Text in, text out. Malformed markup is recovered where possible;
    /// text with no section structure at all is packed line by line.
    pub fn compress_markup(&self, text: &str, config: &CompressionConfig) -> Result<MarkupOutcome, CompressError> {
        match parse_best_effort(text) {
            Ok((doc, status)) => {
                let mut outcome = self.compress(&doc, config);
                let status = match status {
                    ParseStatus::Clean => MarkupStatus::Clean,
                    ParseStatus::Recovered => {
                        outcome.report.flag(OutcomeFlag::ParseRecovered);
                        MarkupStatus::Recovered
                    }
                };
                Ok(MarkupOutcome {
                    text: outcome.text,
                    status,
                    document: Some(outcome.document),
                    report: outcome.report,
                })
            }
            Err(err) => {
                let config = config.sanitized();
                let mut report =
                    CompressionReport::new(self.estimator.estimate(text), config.target_token_budget);
                let packed = pack(text, &pack_options(&config), self.estimator.as_ref());
                if packed.text.trim().is_empty() && !text.trim().is_empty() {
                    return Err(CompressError::Unrecoverable { source: err });
                }
                if packed.truncated {
                    report.flag(OutcomeFlag::Truncated);
                }
                if packed.text != text {
                    report.method = CompressionMethod::Packer;
                    report.packer = Some(PackResultSummary::from(&packed));
                }
                report.compressed_tokens = packed.tokens;
                if !report.budget_met() {
                    report.flag(OutcomeFlag::BudgetUnmet);
                }
                Ok(MarkupOutcome {
                    text: packed.text,
                    status: MarkupStatus::Unstructured,
                    document: None,
                    report,
                })
            }
        }
    }
}

fn pack_options(config: &CompressionConfig) -> PackOptions {
    PackOptions {
        budget: config.target_token_budget,
        priority: config.priority_sections.clone(),
        short_line_chars: config.short_line_chars,
    }
}

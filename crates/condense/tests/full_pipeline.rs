mod common;

use common::{conversation, sample_config, sample_document};
use condense_compress::{
    CompressionMethod, HistoryCompressor, HistoryMethod, MarkupStatus, Orchestrator, OutcomeFlag,
};
use condense_core::render;
use condense_telemetry::{estimate_tokens, HeuristicEstimator};
use std::sync::Arc;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(Arc::new(HeuristicEstimator))
}

#[test]
fn test_history_heavy_document_shrinks() {
    let doc = sample_document(100);
    let original = estimate_tokens(&render(&doc));
    assert!(original > 1500, "fixture should be large: {}", original);

    let mut config = sample_config(500);
    config.enable_history_compression = true;
    config.history_preserve_tokens = 300;

    let outcome = orchestrator().compress(&doc, &config);
    let report = &outcome.report;
    assert_eq!(report.original_tokens, original);
    assert!(report.compressed_tokens < report.original_tokens);
    assert_eq!(report.budget_met(), !report.has_flag(OutcomeFlag::BudgetUnmet));

    let history = report.history.as_ref().expect("history stage should run");
    assert_eq!(history.method, HistoryMethod::Truncated);
    assert!(history.compressed_tokens < history.original_tokens);
    assert_eq!(estimate_tokens(&outcome.text), report.compressed_tokens);

    // The preserved turns reach the final document intact
    let kept = &outcome.document.history;
    assert!(history.tail_len > 0);
    assert!(kept.len() >= history.tail_len);
    let tail = &kept[kept.len() - history.tail_len..];
    assert!(tail[0].role.is_user());
    assert_eq!(tail, &doc.history[history.split..]);
    assert!(kept.iter().all(|e| !e.message.is_empty()));
}

#[test]
fn test_history_stage_alone_meets_budget() {
    let doc = sample_document(100);
    let mut config = sample_config(2000);
    config.enable_history_compression = true;
    config.history_preserve_tokens = 300;

    let outcome = orchestrator().compress(&doc, &config);
    let report = &outcome.report;
    assert!(report.original_tokens > 2000);
    assert_eq!(report.method, CompressionMethod::History);
    assert!(report.budget_met());
    assert!(!report.has_flag(OutcomeFlag::Truncated));
    assert!(report.flags.is_empty());
    assert_eq!(outcome.text, render(&outcome.document));

    let history = report.history.as_ref().expect("history stage should run");
    let kept = &outcome.document.history;
    let tail = &kept[kept.len() - history.tail_len..];
    assert!(tail[0].role.is_user());
    assert_eq!(tail, &doc.history[history.split..]);
    assert_eq!(outcome.document.background, doc.background);
    assert_eq!(outcome.document.sub_app, doc.sub_app);
}

#[test]
fn test_packer_drops_lines_without_truncating_when_short_lines_fit() {
    let mut lines = vec!["Release notes".to_string()];
    lines.extend((0..20).map(|i| {
        format!("Item {i:02} tracks the rollout of the payments service across every region.")
    }));
    let text = lines.join("\n");

    let outcome = orchestrator().compress_markup(&text, &sample_config(150)).unwrap();
    let report = &outcome.report;
    assert_eq!(outcome.status, MarkupStatus::Unstructured);
    assert_eq!(report.method, CompressionMethod::Packer);
    assert!(!report.has_flag(OutcomeFlag::Truncated));
    assert!(report.budget_met());
    assert!(outcome.text.starts_with("Release notes\n"));
    let packer = report.packer.as_ref().expect("packer should run");
    assert!(!packer.truncated);
    assert!(packer.dropped_lines > 0);
}

#[test]
fn test_history_tail_opens_with_user_turn() {
    let entries = conversation(100);
    let compressor = HistoryCompressor::new(Arc::new(HeuristicEstimator));
    let outcome = compressor.compress(&entries, 300, 0.3);
    let report = &outcome.report;

    assert!(report.split >= report.tentative_boundary);
    let tail = &outcome.entries[outcome.entries.len() - report.tail_len..];
    assert!(tail[0].role.is_user());
    assert_eq!(tail, &entries[report.split..]);

    let tail_tokens: usize = tail.iter().map(|e| estimate_tokens(&e.message)).sum();
    assert!(tail_tokens <= 300);
    assert!(report.compressed_tokens <= report.original_tokens);
}

#[test]
fn test_extractive_stage_reports_sentence_selection() {
    let doc = sample_document(4);
    let mut config = sample_config(120);
    config.enable_extractive_summarization = true;
    config.extractive_retention_ratio = 0.5;

    let outcome = orchestrator().compress(&doc, &config);
    let extractive = outcome.report.extractive.expect("extractive stage should run");
    assert_eq!(extractive.agents_summarized, 1);
    assert_eq!(extractive.sentences_total, 10);
    assert_eq!(extractive.sentences_kept, 5);
}

#[test]
fn test_small_document_passes_through() {
    let doc = sample_document(2);
    let outcome = orchestrator().compress(&doc, &sample_config(5000));
    assert_eq!(outcome.report.method, CompressionMethod::Unchanged);
    assert_eq!(outcome.document, doc);
    assert_eq!(outcome.text, render(&doc));
    assert!(outcome.report.flags.is_empty());
}

#[test]
fn test_truncated_markup_is_recovered_and_compressed() {
    let rendered = render(&sample_document(40));
    let cut = &rendered[..rendered.len() - 25];

    let outcome = orchestrator().compress_markup(cut, &sample_config(250)).unwrap();
    assert_eq!(outcome.status, MarkupStatus::Recovered);
    assert!(outcome.report.has_flag(OutcomeFlag::ParseRecovered));
    assert!(outcome.report.compressed_tokens < estimate_tokens(cut));
}

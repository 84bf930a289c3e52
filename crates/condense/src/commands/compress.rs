use super::read_text_arg;
use crate::cli::{CollaboratorArgs, CompressArgs};
use anyhow::{anyhow, Context};
use condense_compress::{
    ChatCompletionsCompressor, CollaboratorSettings, ContextStore, GenerativeCompressor,
    MarkupOutcome, Orchestrator, RunLog, RunRecord,
};
use condense_core::{CompressionConfig, PrioritySections};
use condense_extract::SegmentationService;
use condense_telemetry::{atomic_write, estimator_for, Paths};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

pub fn run(args: &CompressArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;

    let mut segmentation = SegmentationService::new();
    if let Err(err) = segmentation.init() {
        tracing::warn!(error = %err, "segmenter unavailable, using regex splitting");
    }
    let segmentation = Arc::new(segmentation);

    let mut orchestrator =
        Orchestrator::new(estimator_for(None)).with_segmentation(Arc::clone(&segmentation));
    if let Some(collaborator) = collaborator(&args.collaborator)? {
        orchestrator = orchestrator.with_collaborator(collaborator);
    }

    let result = match (&args.owner, &args.file) {
        (Some(owner), _) => compress_owner(&Paths::new()?, owner, &orchestrator, &config),
        (None, Some(file)) => compress_file(file, args.output.as_deref(), &orchestrator, &config),
        (None, None) => Err(anyhow!("either --owner or --file is required")),
    };

    drop(orchestrator);
    if let Ok(mut segmentation) = Arc::try_unwrap(segmentation) {
        segmentation.shutdown();
    }

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

/// Defaults, then `--config`, then individual flags
fn build_config(args: &CompressArgs) -> anyhow::Result<CompressionConfig> {
    let mut config = match &args.config {
        Some(value) => serde_json::from_str(&read_text_arg(value)?).context("parsing --config")?,
        None => CompressionConfig::new(),
    };

    if let Some(max_token) = args.max_token {
        config.target_token_budget = max_token;
    }
    if let Some(modules) = &args.target_modules {
        config.priority_sections = PrioritySections::try_from(modules.clone())?;
    }
    if args.use_tf_idf {
        config.enable_extractive_summarization = true;
    }
    if let Some(ratio) = args.tf_idf_compression_ratio {
        config.extractive_retention_ratio = ratio;
    }
    if args.use_history_compression {
        config.enable_history_compression = true;
    }
    if let Some(tokens) = args.history_preserve_tokens {
        config.history_preserve_tokens = tokens;
    }
    if let Some(ratio) = args.history_compression_ratio {
        config.history_old_compression_ratio = ratio;
    }

    config.validate()?;
    Ok(config)
}

fn collaborator(args: &CollaboratorArgs) -> anyhow::Result<Option<Arc<dyn GenerativeCompressor>>> {
    let Some(api_key) = args.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        tracing::debug!("no API key, generative stage disabled");
        return Ok(None);
    };
    let settings = CollaboratorSettings {
        api_key: Some(api_key.to_string()),
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        timeout_secs: args.timeout_secs,
    };
    let compressor = ChatCompletionsCompressor::from_settings(&settings)?;
    tracing::info!(endpoint = compressor.endpoint(), model = %args.model, "generative stage enabled");
    Ok(Some(Arc::new(compressor)))
}

/// Back up, compress, save and log an owner's stored document
fn compress_owner(
    paths: &Paths,
    owner: &str,
    orchestrator: &Orchestrator,
    config: &CompressionConfig,
) -> anyhow::Result<Value> {
    let store = ContextStore::new(paths.clone());
    let text = store
        .load(owner)?
        .ok_or_else(|| anyhow!("no context stored for {owner}; run `condense init --owner {owner}`"))?;

    let outcome = orchestrator.compress_markup(&text, config)?;
    store.backup(owner, &text)?;
    store.save(owner, &outcome.text)?;

    let log = RunLog::new(&paths.runs_db())?;
    log.insert(&RunRecord::from_report(owner, &outcome.report))?;

    Ok(json!({
        "owner": owner,
        "status": outcome.status,
        "report": outcome.report,
    }))
}

fn compress_file(
    file: &Path,
    output: Option<&Path>,
    orchestrator: &Orchestrator,
    config: &CompressionConfig,
) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let MarkupOutcome {
        text: compressed,
        status,
        report,
        ..
    } = orchestrator.compress_markup(&text, config)?;

    match output {
        Some(path) => {
            atomic_write(path, compressed.as_bytes())?;
            Ok(json!({
                "file": file,
                "output": path,
                "status": status,
                "report": report,
            }))
        }
        None => Ok(json!({
            "file": file,
            "status": status,
            "report": report,
            "text": compressed,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use condense_core::{parse_best_effort, render, ContextDocument, HistoryEntry, SectionKind};
    use condense_telemetry::{estimate_tokens, HeuristicEstimator};
    use tempfile::TempDir;

    fn compress_args(extra: &[&str]) -> CompressArgs {
        let mut argv = vec!["condense", "compress", "--file", "ctx.xml"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Compress(args) => args,
            _ => panic!("Expected Compress command"),
        }
    }

    fn long_history(turns: usize) -> String {
        let mut doc = ContextDocument::new();
        for i in 0..turns {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            doc.push_history(HistoryEntry::new(
                role,
                format!("Message {i} walks through the database migration plan and its rollback steps."),
            ));
        }
        render(&doc)
    }

    #[test]
    fn test_build_config_flags_override_json() {
        let args = compress_args(&[
            "--config",
            r#"{"max_token": 800, "use_tf_idf": false, "target_modules": ["PLAN"]}"#,
            "--max-token",
            "300",
            "--use-tf-idf",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.target_token_budget, 300);
        assert!(config.enable_extractive_summarization);
        assert!(config.priority_sections.contains(SectionKind::Plan));
        assert!(!config.priority_sections.contains(SectionKind::History));
    }

    #[test]
    fn test_build_config_rejects_invalid_values() {
        assert!(build_config(&compress_args(&["--history-compression-ratio", "1.5"])).is_err());
        assert!(build_config(&compress_args(&["--target-modules", "NOTES"])).is_err());
        assert!(build_config(&compress_args(&["--config", "{not json"])).is_err());
    }

    #[test]
    fn test_collaborator_disabled_without_key() {
        let args = compress_args(&["--api-key", ""]);
        assert!(collaborator(&args.collaborator).unwrap().is_none());
        let args = compress_args(&["--api-key", "sk-test"]);
        assert!(collaborator(&args.collaborator).unwrap().is_some());
    }

    #[test]
    fn test_compress_owner_backs_up_saves_and_logs() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_root(temp.path());
        let store = ContextStore::new(paths.clone());
        let original = long_history(30);
        store.save("alice", &original).unwrap();

        let config = CompressionConfig {
            target_token_budget: 300,
            enable_history_compression: true,
            history_preserve_tokens: 100,
            ..CompressionConfig::new()
        };
        let orchestrator = Orchestrator::new(Arc::new(HeuristicEstimator));
        let value = compress_owner(&paths, "alice", &orchestrator, &config).unwrap();

        assert_eq!(store.load_backup("alice").unwrap().as_deref(), Some(original.as_str()));
        let saved = store.load("alice").unwrap().unwrap();
        assert!(estimate_tokens(&saved) < estimate_tokens(&original));
        assert!(parse_best_effort(&saved).is_ok());

        let runs = RunLog::new(&paths.runs_db()).unwrap().recent("alice", 5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(value["report"]["compressed_tokens"], json!(runs[0].compressed_tokens));
        assert_eq!(value["status"], json!("clean"));
    }

    #[test]
    fn test_compress_owner_without_document_fails() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_root(temp.path());
        let orchestrator = Orchestrator::new(Arc::new(HeuristicEstimator));
        let err = compress_owner(&paths, "ghost", &orchestrator, &CompressionConfig::new()).unwrap_err();
        assert!(err.to_string().contains("condense init"));
    }

    #[test]
    fn test_compress_file_to_output() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("ctx.xml");
        let output = temp.path().join("out").join("ctx.min.xml");
        let original = long_history(30);
        std::fs::write(&input, &original).unwrap();

        let config = CompressionConfig {
            target_token_budget: 200,
            ..CompressionConfig::new()
        };
        let orchestrator = Orchestrator::new(Arc::new(HeuristicEstimator));
        let value = compress_file(&input, Some(&output), &orchestrator, &config).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(estimate_tokens(&written) < estimate_tokens(&original));
        assert!(value.get("text").is_none());
        assert_eq!(value["report"]["method"], json!("packer"));
    }
}

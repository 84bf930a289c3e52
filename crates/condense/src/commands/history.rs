use condense_compress::{validate_owner, RunLog, RunRecord, RunStats};
use condense_telemetry::Paths;

fn format_stats(stats: &RunStats) -> String {
    if stats.runs == 0 {
        return "No runs to analyze.".to_string();
    }
    format!(
        "Total runs: {}\n\
         Budget met: {}/{}\n\
         Tokens saved: {}\n\
         Avg ratio: {:.1}%",
        stats.runs,
        stats.budget_met_runs,
        stats.runs,
        stats.tokens_saved,
        stats.mean_ratio * 100.0,
    )
}

fn format_run(run: &RunRecord) -> String {
    let flags = if run.flags.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = run
            .flags
            .iter()
            .filter_map(|f| serde_json::to_value(f).ok())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        format!(" [{}]", names.join(","))
    };
    format!(
        "  {} | {:?} {} -> {} (budget {}){}",
        run.timestamp.format("%Y-%m-%d %H:%M"),
        run.method,
        run.original_tokens,
        run.compressed_tokens,
        run.budget,
        flags,
    )
}

pub fn run(owner: &str, stats: bool, limit: usize) -> anyhow::Result<()> {
    validate_owner(owner)?;
    let paths = Paths::new()?;
    let db_path = paths.runs_db();

    if !db_path.exists() {
        println!("No compression runs recorded yet.");
        return Ok(());
    }

    let log = RunLog::new(&db_path)?;
    if stats {
        println!("{}", format_stats(&log.stats(owner)?));
        return Ok(());
    }

    let runs = log.recent(owner, limit)?;
    if runs.is_empty() {
        println!("No runs for {}", owner);
        return Ok(());
    }

    println!("Recent Runs (last {})", runs.len());
    println!("=====================");
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use condense_compress::{CompressionMethod, OutcomeFlag};

    fn sample_run() -> RunRecord {
        RunRecord {
            owner: "alice".to_string(),
            timestamp: Utc::now(),
            method: CompressionMethod::History,
            original_tokens: 2000,
            compressed_tokens: 650,
            budget: 500,
            budget_met: false,
            flags: vec![OutcomeFlag::BudgetUnmet],
        }
    }

    #[test]
    fn test_format_run_lists_flags() {
        let line = format_run(&sample_run());
        assert!(line.contains("History 2000 -> 650"));
        assert!(line.contains("[budget_unmet]"));
    }

    #[test]
    fn test_stats_output() {
        let log = RunLog::in_memory().unwrap();
        assert_eq!(format_stats(&log.stats("alice").unwrap()), "No runs to analyze.");

        log.insert(&sample_run()).unwrap();
        let out = format_stats(&log.stats("alice").unwrap());
        assert!(out.contains("Total runs: 1"));
        assert!(out.contains("Budget met: 0/1"));
        assert!(out.contains("Tokens saved: 1350"));
        assert!(out.contains("Avg ratio: 32.5%"));
    }
}

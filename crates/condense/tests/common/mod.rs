use condense_core::{
    AgentRecord, BackgroundEntry, BackgroundFields, CompressionConfig, ContextDocument,
    HistoryEntry,
};

pub fn turn_message(i: usize) -> String {
    format!(
        "Turn {i} covers the rollout checklist, canary metrics and the rollback plan for service {i}."
    )
}

/// Alternating user/assistant turns without timestamps, so token counts are stable
pub fn conversation(turns: usize) -> Vec<HistoryEntry> {
    (0..turns)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            HistoryEntry::new(role, turn_message(i))
        })
        .collect()
}

pub fn sample_document(turns: usize) -> ContextDocument {
    let mut doc = ContextDocument::new();
    doc.push_background(BackgroundEntry::Structured {
        fields: BackgroundFields {
            task: Some("roll out the billing service".to_string()),
            knowledge: Some("canary runs in eu-west first".to_string()),
            ..BackgroundFields::default()
        },
        timestamp: None,
    });
    doc.push_plan(
        "planner",
        vec!["deploy canary".to_string(), "watch error rate".to_string()],
        None,
        None,
    );
    doc.push_agent(AgentRecord::new("monitor", agent_report(10)));
    for entry in conversation(turns) {
        doc.push_history(entry);
    }
    doc
}

pub fn agent_report(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Check {i} found latency on node{i} rising by {} percent.", i * 2 + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn sample_config(budget: usize) -> CompressionConfig {
    CompressionConfig {
        target_token_budget: budget,
        ..CompressionConfig::new()
    }
}

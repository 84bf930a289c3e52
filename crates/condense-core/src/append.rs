//! Appending raw caller content to a document section
//!
//! Incoming content is either a JSON object carrying structured fields or
//! plain text. Each section interprets it differently; anything that does not
//! match the structured shape is stored as text.

use crate::markup;
use crate::types::{AgentRecord, BackgroundEntry, BackgroundFields, ContextDocument, HistoryEntry, SectionKind};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    steps: Vec<Value>,
    #[serde(default)]
    call_ask: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AgentPayload {
    app_name: String,
    content: Value,
}

fn json_object(content: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Render a JSON scalar as plain text; nested values keep their JSON form
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ContextDocument {
    /// Append `content` to `section` on behalf of `role`
    pub fn append(&mut self, section: SectionKind, content: &str, role: &str) {
        let timestamp = Some(Utc::now());
        match section {
            SectionKind::Background => {
                let entry = match background_fields(content) {
                    Some(fields) => BackgroundEntry::Structured { fields, timestamp },
                    None => BackgroundEntry::Raw {
                        role: role.to_string(),
                        text: content.to_string(),
                        timestamp,
                    },
                };
                self.push_background(entry);
            }
            SectionKind::Plan => {
                let (steps, call_ask) = plan_payload(content)
                    .unwrap_or_else(|| (vec![content.to_string()], None));
                let number = self.push_plan(role, steps, call_ask, timestamp);
                tracing::debug!(number, "appended plan iteration");
            }
            SectionKind::SubApp => {
                let mut record = agent_payload(content).unwrap_or_else(|| {
                    AgentRecord::new(
                        format!("agent_{}_{}", role, self.sub_app.len() + 1),
                        content,
                    )
                });
                if record.timestamp.is_none() {
                    record.timestamp = timestamp;
                }
                self.push_agent(record);
            }
            SectionKind::History => {
                let mut entry = HistoryEntry::new(role, content);
                entry.timestamp = timestamp;
                self.push_history(entry);
            }
        }
    }
}

fn background_fields(content: &str) -> Option<BackgroundFields> {
    let map = json_object(content)?;
    let mut fields = BackgroundFields::default();
    let mut found = false;
    for name in BackgroundFields::NAMES {
        if let Some(text) = map.get(name).and_then(value_text) {
            found |= fields.set(name, text);
        }
    }
    found.then_some(fields)
}

fn plan_payload(content: &str) -> Option<(Vec<String>, Option<String>)> {
    let map = json_object(content)?;
    if !map.contains_key("steps") {
        return None;
    }
    let payload: PlanPayload = serde_json::from_value(Value::Object(map)).ok()?;
    let steps = payload
        .steps
        .iter()
        .filter_map(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let call_ask = payload
        .call_ask
        .as_ref()
        .and_then(value_text)
        .filter(|s| !s.trim().is_empty());
    Some((steps, call_ask))
}

fn agent_payload(content: &str) -> Option<AgentRecord> {
    if let Some(map) = json_object(content) {
        let payload: AgentPayload = serde_json::from_value(Value::Object(map)).ok()?;
        return Some(AgentRecord::new(
            payload.app_name,
            value_text(&payload.content).unwrap_or_default(),
        ));
    }
    if content.trim_start().starts_with("<agent") {
        return markup::parse_agent_fragment(content);
    }
    None
}

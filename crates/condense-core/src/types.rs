//! Core types for the sectioned context document

use crate::error::ConfigError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four fixed sections of a context document, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    #[serde(rename = "BACKGROUND")]
    Background,
    #[serde(rename = "PLAN")]
    Plan,
    #[serde(rename = "SUB_APP")]
    SubApp,
    #[serde(rename = "HISTORY")]
    History,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Background,
        SectionKind::Plan,
        SectionKind::SubApp,
        SectionKind::History,
    ];

    /// Element name used in the wire format
    pub fn tag(self) -> &'static str {
        match self {
            SectionKind::Background => "BACKGROUND",
            SectionKind::Plan => "PLAN",
            SectionKind::SubApp => "SUB_APP",
            SectionKind::History => "HISTORY",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SectionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKind::ALL
            .into_iter()
            .find(|k| k.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownSection(s.to_string()))
    }
}

/// Speaker of a history entry. Open set: unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(tag) => tag,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Role::User)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an ISO 8601 timestamp, accepting offset-less values as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Structured BACKGROUND subfields; each may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundFields {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub knowledge: Option<String>,
    #[serde(default)]
    pub external_knowledge: Option<String>,
}

impl BackgroundFields {
    pub const NAMES: [&'static str; 4] =
        ["system_prompt", "task", "knowledge", "external_knowledge"];

    /// Fields in wire order, paired with their element names
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> {
        [
            ("system_prompt", self.system_prompt.as_deref()),
            ("task", self.task.as_deref()),
            ("knowledge", self.knowledge.as_deref()),
            ("external_knowledge", self.external_knowledge.as_deref()),
        ]
        .into_iter()
    }

    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "system_prompt" => &mut self.system_prompt,
            "task" => &mut self.task,
            "knowledge" => &mut self.knowledge,
            "external_knowledge" => &mut self.external_knowledge,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// A BACKGROUND entry: structured fields or an opaque role/text pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackgroundEntry {
    Structured {
        fields: BackgroundFields,
        timestamp: Option<DateTime<Utc>>,
    },
    Raw {
        role: String,
        text: String,
        timestamp: Option<DateTime<Utc>>,
    },
}

/// A PLAN iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanIteration {
    /// 1-based iteration number
    pub number: u32,
    pub role: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub call_ask: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A SUB_APP agent record. Names are not required to be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            timestamp: None,
        }
    }
}

/// A HISTORY conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn new(role: impl Into<Role>, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            message: message.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Four-section context document.
///
/// Every section is always present (possibly empty) and the order is fixed
/// by [`SectionKind::ALL`]; only section contents change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    #[serde(default)]
    pub background: Vec<BackgroundEntry>,
    #[serde(default)]
    pub plan: Vec<PlanIteration>,
    #[serde(default)]
    pub sub_app: Vec<AgentRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ContextDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_len(&self, kind: SectionKind) -> usize {
        match kind {
            SectionKind::Background => self.background.len(),
            SectionKind::Plan => self.plan.len(),
            SectionKind::SubApp => self.sub_app.len(),
            SectionKind::History => self.history.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        SectionKind::ALL.iter().all(|&k| self.section_len(k) == 0)
    }

    /// Number the next PLAN iteration would receive
    pub fn next_plan_number(&self) -> u32 {
        self.plan.len() as u32 + 1
    }

    pub fn push_background(&mut self, entry: BackgroundEntry) {
        self.background.push(entry);
    }

    /// Append an iteration, numbering it after the existing ones
    pub fn push_plan(
        &mut self,
        role: impl Into<String>,
        steps: Vec<String>,
        call_ask: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> u32 {
        let number = self.next_plan_number();
        self.plan.push(PlanIteration {
            number,
            role: role.into(),
            steps,
            call_ask,
            timestamp,
        });
        number
    }

    pub fn push_agent(&mut self, record: AgentRecord) {
        self.sub_app.push(record);
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }
}

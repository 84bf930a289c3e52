//! Configuration for a compression run

use crate::error::ConfigError;
use crate::types::SectionKind;
use serde::{Deserialize, Serialize};

/// Sections the caller wants compressed most aggressively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub enum PrioritySections {
    All,
    Only(Vec<SectionKind>),
}

impl PrioritySections {
    pub fn is_all(&self) -> bool {
        matches!(self, PrioritySections::All)
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        match self {
            PrioritySections::All => true,
            PrioritySections::Only(kinds) => kinds.contains(&kind),
        }
    }

    /// Section names as shown to the generative collaborator
    pub fn names(&self) -> Vec<String> {
        self.clone().into()
    }
}

impl Default for PrioritySections {
    fn default() -> Self {
        PrioritySections::All
    }
}

impl TryFrom<Vec<String>> for PrioritySections {
    type Error = ConfigError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        if names.is_empty() || names.iter().any(|n| n.trim().eq_ignore_ascii_case("all")) {
            return Ok(PrioritySections::All);
        }
        let mut kinds = Vec::new();
        for name in &names {
            let kind: SectionKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(PrioritySections::Only(kinds))
    }
}

impl From<PrioritySections> for Vec<String> {
    fn from(sections: PrioritySections) -> Self {
        match sections {
            PrioritySections::All => vec!["all".to_string()],
            PrioritySections::Only(kinds) => kinds.iter().map(|k| k.tag().to_string()).collect(),
        }
    }
}

fn default_budget() -> usize {
    1000
}

fn default_retention_ratio() -> f64 {
    0.6
}

fn default_preserve_tokens() -> usize {
    500
}

fn default_history_ratio() -> f64 {
    0.3
}

fn default_min_chars() -> usize {
    50
}

fn default_max_features() -> usize {
    1000
}

/// Compression configuration
///
/// Field names on the wire follow the request surface (`max_token`,
/// `target_modules`, `use_tf_idf`, ...); the descriptive names are accepted
/// as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Token budget for the whole document
    #[serde(rename = "max_token", alias = "target_token_budget", default = "default_budget")]
    pub target_token_budget: usize,

    #[serde(rename = "target_modules", alias = "priority_sections", default)]
    pub priority_sections: PrioritySections,

    #[serde(rename = "use_tf_idf", alias = "enable_extractive_summarization", default)]
    pub enable_extractive_summarization: bool,

    /// Fraction of sentences kept per agent record
    #[serde(
        rename = "tf_idf_compression_ratio",
        alias = "extractive_retention_ratio",
        default = "default_retention_ratio"
    )]
    pub extractive_retention_ratio: f64,

    #[serde(rename = "use_history_compression", alias = "enable_history_compression", default)]
    pub enable_history_compression: bool,

    /// Most recent history tokens kept verbatim
    #[serde(default = "default_preserve_tokens")]
    pub history_preserve_tokens: usize,

    /// Target size of the compressed history head relative to its original
    #[serde(
        rename = "history_compression_ratio",
        alias = "history_old_compression_ratio",
        default = "default_history_ratio"
    )]
    pub history_old_compression_ratio: f64,

    /// Agent records at or below this many chars skip extractive summarization
    #[serde(default = "default_min_chars")]
    pub min_agent_content_chars: usize,

    /// Lines shorter than this are always kept by the fallback packer
    #[serde(default = "default_min_chars")]
    pub short_line_chars: usize,

    /// Vocabulary cap for TF-IDF scoring
    #[serde(default = "default_max_features")]
    pub max_features: usize,
}

impl CompressionConfig {
    pub fn new() -> Self {
        Self {
            target_token_budget: default_budget(),
            priority_sections: PrioritySections::All,
            enable_extractive_summarization: false,
            extractive_retention_ratio: default_retention_ratio(),
            enable_history_compression: false,
            history_preserve_tokens: default_preserve_tokens(),
            history_old_compression_ratio: default_history_ratio(),
            min_agent_content_chars: default_min_chars(),
            short_line_chars: default_min_chars(),
            max_features: default_max_features(),
        }
    }

    /// Check ratios against the request domain (0.1..=1.0)
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("tf_idf_compression_ratio", self.extractive_retention_ratio)?;
        check_ratio("history_compression_ratio", self.history_old_compression_ratio)?;
        if self.max_features == 0 {
            return Err(ConfigError::ZeroFeatures);
        }
        Ok(())
    }

    /// Copy with ratios clamped into (0, 1] and a non-zero vocabulary cap
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        config.extractive_retention_ratio = clamp_ratio(config.extractive_retention_ratio);
        config.history_old_compression_ratio = clamp_ratio(config.history_old_compression_ratio);
        config.max_features = config.max_features.max(1);
        config
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.1..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            min: 0.1,
            max: 1.0,
            value,
        })
    }
}

fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        f64::EPSILON
    } else {
        value.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CompressionConfig::new();
        assert_eq!(config.target_token_budget, 1000);
        assert_eq!(config.extractive_retention_ratio, 0.6);
        assert_eq!(config.history_preserve_tokens, 500);
        assert_eq!(config.history_old_compression_ratio, 0.3);
        assert!(config.priority_sections.is_all());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_request_json() {
        let json = r#"{
            "target_modules": ["HISTORY", "sub_app"],
            "use_tf_idf": true,
            "max_token": 800,
            "history_preserve_tokens": 300
        }"#;
        let config: CompressionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.target_token_budget, 800);
        assert!(config.enable_extractive_summarization);
        assert!(!config.enable_history_compression);
        assert_eq!(config.history_preserve_tokens, 300);
        assert_eq!(
            config.priority_sections,
            PrioritySections::Only(vec![SectionKind::History, SectionKind::SubApp])
        );
        assert_eq!(config.min_agent_content_chars, 50);
    }

    #[test]
    fn test_config_accepts_descriptive_aliases() {
        let json = r#"{"target_token_budget": 42, "enable_history_compression": true}"#;
        let config: CompressionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.target_token_budget, 42);
        assert!(config.enable_history_compression);
    }

    #[test]
    fn test_priority_all_wins() {
        let sections = PrioritySections::try_from(vec!["PLAN".to_string(), "all".to_string()]).unwrap();
        assert!(sections.is_all());
        assert!(sections.contains(SectionKind::Background));
    }

    #[test]
    fn test_unknown_priority_section_rejected() {
        let json = r#"{"target_modules": ["MEMORY"]}"#;
        assert!(serde_json::from_str::<CompressionConfig>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_domain_ratio() {
        let mut config = CompressionConfig::new();
        config.history_old_compression_ratio = 0.05;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "history_compression_ratio", .. })
        ));
    }

    #[test]
    fn test_sanitized_clamps() {
        let mut config = CompressionConfig::new();
        config.extractive_retention_ratio = 3.0;
        config.history_old_compression_ratio = -1.0;
        config.max_features = 0;
        let clean = config.sanitized();
        assert_eq!(clean.extractive_retention_ratio, 1.0);
        assert!(clean.history_old_compression_ratio > 0.0);
        assert_eq!(clean.max_features, 1);
    }
}

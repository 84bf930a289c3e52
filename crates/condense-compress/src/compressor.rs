//! Generative compression collaborator and its prompts

use crate::error::CollaboratorError;
use condense_core::{PrioritySections, SectionKind};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const MAX_COMPLETION_TOKENS: usize = 4096;
const TEMPERATURE: f64 = 0.1;

/// System and user message for one collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPrompt {
    pub system: String,
    pub user: String,
}

/// A service that rewrites text into a shorter form
pub trait GenerativeCompressor: Send + Sync {
    fn compress(&self, prompt: &CompressionPrompt, target_tokens: usize) -> Result<String, CollaboratorError>;
}

/// Completion cap requested from the service: target plus headroom
pub fn max_completion_tokens(target_tokens: usize) -> usize {
    (target_tokens + 1000).min(MAX_COMPLETION_TOKENS)
}

/// Prompt for compressing a whole context document
pub fn context_prompt(
    document: &str,
    original_tokens: usize,
    target_tokens: usize,
    priority: &PrioritySections,
) -> CompressionPrompt {
    let ratio = if original_tokens > 0 {
        target_tokens as f64 / original_tokens as f64
    } else {
        1.0
    };
    let names = priority.names().join(", ");
    let mark = |kind: SectionKind| if priority.contains(kind) { "priority" } else { "keep" };

    let system = format!(
        "You compress multi-agent context documents. Reply with a complete <context> \
         document of at most {target_tokens} tokens and nothing else."
    );
    let user = format!(
        "Compress the context document below.\n\n\
         Original tokens: {original_tokens}\n\
         Token limit: {target_tokens} (hard limit)\n\
         Target ratio: {ratio:.2}\n\
         Priority sections: {names}\n\n\
         Output a <context> element containing all four sections in this order:\n\
         <BACKGROUND> ({bg}): keep system_prompt and task, condense knowledge to key facts.\n\
         <PLAN> ({plan}): keep <plan_iteration number=..> elements with key steps only.\n\
         <SUB_APP> ({sub}): one <agent name=..><content> per agent with its findings and results.\n\
         <HISTORY> ({hist}): <entry role=..> elements for decisions and open questions.\n\n\
         Compress priority sections hardest. Keep every section, even if empty.\n\n\
         Document:\n```\n{document}\n```\n",
        bg = mark(SectionKind::Background),
        plan = mark(SectionKind::Plan),
        sub = mark(SectionKind::SubApp),
        hist = mark(SectionKind::History),
    );
    CompressionPrompt { system, user }
}

/// Prompt for summarizing the older part of a conversation
pub fn history_prompt(head: &str, original_tokens: usize, target_tokens: usize) -> CompressionPrompt {
    let system = "You summarize conversation history into dense notes that keep decisions, \
                  technical details, problems with their solutions, and progress."
        .to_string();
    let user = format!(
        "Summarize the conversation excerpt below.\n\n\
         Original tokens: {original_tokens}\n\
         Token limit: {target_tokens} (hard limit)\n\n\
         Excerpt:\n```\n{head}\n```\n\n\
         Reply with the summary text only."
    );
    CompressionPrompt { system, user }
}

/// Connection settings for [`ChatCompletionsCompressor`]
#[derive(Debug, Clone)]
pub struct CollaboratorSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible `/chat/completions` client
#[derive(Debug, Clone)]
pub struct ChatCompletionsCompressor {
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsCompressor {
    /// Build a client; fails with `NotConfigured` when no API key is set
    pub fn from_settings(settings: &CollaboratorSettings) -> Result<Self, CollaboratorError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(CollaboratorError::NotConfigured)?;
        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, prompt: &CompressionPrompt, target_tokens: usize) -> Result<String, CollaboratorError> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": prompt.system},
                    {"role": "user", "content": prompt.user}
                ],
                "temperature": TEMPERATURE,
                "max_tokens": max_completion_tokens(target_tokens)
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| strip_code_fence(&c))
            .unwrap_or_default();
        if text.is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(text)
    }
}

impl GenerativeCompressor for ChatCompletionsCompressor {
    fn compress(&self, prompt: &CompressionPrompt, target_tokens: usize) -> Result<String, CollaboratorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CollaboratorError::Runtime(e.to_string()))?;

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, target_tokens, "calling generative compressor");
        runtime.block_on(async {
            match tokio::time::timeout(self.timeout, self.request(prompt, target_tokens)).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout(self.timeout.as_secs())),
            }
        })
    }
}

/// Remove a surrounding markdown code fence (```xml ... ```) if present
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_completion_tokens() {
        assert_eq!(max_completion_tokens(500), 1500);
        assert_eq!(max_completion_tokens(5000), 4096);
    }

    #[test]
    fn test_context_prompt_mentions_limits_and_priorities() {
        let priority = PrioritySections::Only(vec![SectionKind::History]);
        let prompt = context_prompt("<context/>", 2000, 500, &priority);
        assert!(prompt.user.contains("Token limit: 500"));
        assert!(prompt.user.contains("Priority sections: HISTORY"));
        assert!(prompt.user.contains("<HISTORY> (priority)"));
        assert!(prompt.user.contains("<PLAN> (keep)"));
        assert!(prompt.user.contains("Target ratio: 0.25"));
        assert!(prompt.system.contains("500 tokens"));
    }

    #[test]
    fn test_history_prompt_embeds_excerpt() {
        let prompt = history_prompt("<entry role=\"user\">hi</entry>", 40, 12);
        assert!(prompt.user.contains("<entry role=\"user\">hi</entry>"));
        assert!(prompt.user.contains("Token limit: 12"));
    }

    #[test]
    fn test_requires_api_key() {
        let settings = CollaboratorSettings::default();
        assert!(matches!(
            ChatCompletionsCompressor::from_settings(&settings),
            Err(CollaboratorError::NotConfigured)
        ));

        let settings = CollaboratorSettings {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:8080/v1/".to_string(),
            ..CollaboratorSettings::default()
        };
        let client = ChatCompletionsCompressor::from_settings(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```xml\n<context/>\n```"), "<context/>");
        assert_eq!(strip_code_fence("  plain  "), "plain");
        assert_eq!(strip_code_fence("```\nbody"), "body");
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use todd_core::Settings;

use crate::{ClaudeClient, Error, OpenAiClient, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    Claude,
    OpenAi,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Claude => write!(f, "anthropic"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Claude),
            "openai" | "gpt" => Ok(LlmProvider::OpenAi),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

/// "Send system + user text, receive JSON-shaped text back."
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> LlmProvider;

    /// Ask for a completion that should contain a single JSON document.
    /// The text is returned as-is; parsing is the caller's job.
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the configured client, or `None` when the fallback is disabled.
pub fn build_client(settings: &Settings) -> Result<Option<Arc<dyn LlmClient>>> {
    if settings.llm_provider.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let provider: LlmProvider = settings
        .llm_provider
        .parse()
        .map_err(Error::ConfigError)?;

    let client: Arc<dyn LlmClient> = match provider {
        LlmProvider::Claude => match &settings.anthropic_api_key {
            Some(key) => Arc::new(ClaudeClient::new(key.clone()).with_model(settings.llm_model.clone())),
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set; LLM fallback disabled");
                return Ok(None);
            }
        },
        LlmProvider::OpenAi => match &settings.openai_api_key {
            Some(key) => Arc::new(OpenAiClient::new(key.clone()).with_model(settings.llm_model.clone())),
            None => {
                tracing::warn!("OPENAI_API_KEY not set; LLM fallback disabled");
                return Ok(None);
            }
        },
    };

    tracing::info!("LLM fallback enabled ({})", client.provider());
    Ok(Some(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("claude".parse::<LlmProvider>().unwrap(), LlmProvider::Claude);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert!("bard".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_build_client_disabled() {
        let mut settings = Settings::load(None).unwrap();
        settings.llm_provider = "none".to_string();
        assert!(build_client(&settings).unwrap().is_none());

        settings.llm_provider = "anthropic".to_string();
        settings.anthropic_api_key = None;
        assert!(build_client(&settings).unwrap().is_none());

        settings.anthropic_api_key = Some("key".to_string());
        let client = build_client(&settings).unwrap().unwrap();
        assert_eq!(client.provider(), LlmProvider::Claude);
    }
}

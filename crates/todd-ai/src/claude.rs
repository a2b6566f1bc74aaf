use crate::{client::LlmClient, Error, LlmProvider, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: "https://api.anthropic.com/v1".to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        self
    }

    async fn call_api(&self, system: &str, messages: Vec<Message>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&json!({
                "model": &self.model,
                "system": system,
                "messages": messages,
                "max_tokens": 1024,
                "temperature": 0.0,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let result: ClaudeResponse = response.json().await?;
        result
            .content
            .into_iter()
            .find_map(|c| c.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(Error::EmptyCompletion)
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Claude
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        tracing::debug!("Claude completion ({} chars of user text)", user.len());

        let messages = vec![Message {
            role: "user".to_string(),
            content: user.to_string(),
        }];

        self.call_api(system, messages).await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    text: Option<String>,
}

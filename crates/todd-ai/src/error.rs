use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Empty completion")]
    EmptyCompletion,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        match response.status().as_u16() {
            401 | 403 => Error::InvalidApiKey,
            429 => Error::RateLimitExceeded,
            status => {
                let body = response.text().await.unwrap_or_default();
                Error::ApiError(format!("{}: {}", status, body))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

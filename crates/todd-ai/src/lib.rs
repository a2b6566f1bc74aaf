pub mod client;
pub mod claude;
pub mod openai;
pub mod error;

// Re-exports
pub use client::{build_client, LlmClient, LlmProvider};
pub use claude::ClaudeClient;
pub use openai::OpenAiClient;
pub use error::{Error, Result};

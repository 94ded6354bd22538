//! Text generation for reply bodies.

pub mod openai;

pub use openai::ChatCompletionsClient;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("text generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("text generation provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode text generation response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("text generation response contained no text")]
    EmptyResponse,
}

/// Produces a reply body from a system prompt and a user prompt.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GeneratorError>;
}

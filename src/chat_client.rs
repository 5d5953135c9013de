use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationResult;

/// Who authored a turn of history sent back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior turn of a conversation, in the shape a provider needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Anything that can turn a prompt plus prior history into model text.
///
/// `Ok(None)` means the call succeeded but the model produced no text.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Send `prompt` after `history` and wait for the full response
    async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult;

    /// Get the name of the client (for display purposes)
    fn client_name(&self) -> &str;

    /// Model identifier the client was built with
    fn model(&self) -> &str;
}

/// Wrapper enum that implements GenerativeClient for the supported providers
pub enum AnyGenerativeClient {
    Gemini(crate::gemini::GeminiClient),
    Mock(crate::mock_llm::MockGenerativeClient),
}

#[async_trait]
impl GenerativeClient for AnyGenerativeClient {
    async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult {
        match self {
            AnyGenerativeClient::Gemini(client) => client.generate(prompt, history).await,
            AnyGenerativeClient::Mock(client) => client.generate(prompt, history).await,
        }
    }

    fn client_name(&self) -> &str {
        match self {
            AnyGenerativeClient::Gemini(_) => "Gemini",
            AnyGenerativeClient::Mock(_) => "MockLLM",
        }
    }

    fn model(&self) -> &str {
        match self {
            AnyGenerativeClient::Gemini(client) => client.model(),
            AnyGenerativeClient::Mock(client) => client.model(),
        }
    }
}

impl AnyGenerativeClient {
    /// Create a Gemini client from loaded configuration
    pub fn new_gemini(config: &crate::config::AppConfig) -> anyhow::Result<Self> {
        Ok(AnyGenerativeClient::Gemini(
            crate::gemini::GeminiClient::from_config(config)?,
        ))
    }

    /// Create a mock client with its canned replies, each taking `delay_ms`
    pub fn new_mock(delay_ms: u64) -> Self {
        AnyGenerativeClient::Mock(crate::mock_llm::MockGenerativeClient::new().with_delay(delay_ms))
    }
}

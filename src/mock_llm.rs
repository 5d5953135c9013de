use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use crate::chat_client::{GenerativeClient, HistoryTurn};
use crate::error::{GenerationError, GenerationResult};

/// One scripted outcome for the mock to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    Empty,
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        MockReply::Fail(message.into())
    }
}

/// A call the mock received, kept for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub history: Vec<HistoryTurn>,
}

/// Holds every mock call until released. Cloning shares the same gate.
#[derive(Clone)]
pub struct MockGate {
    permits: Arc<Semaphore>,
}

impl MockGate {
    /// Let one waiting (or future) call through
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

pub struct MockGenerativeClient {
    script: Mutex<VecDeque<MockReply>>,
    canned: Vec<String>,
    canned_index: Mutex<usize>,
    calls: Mutex<Vec<RecordedCall>>,
    delay_ms: u64,
    gate: Option<MockGate>,
}

impl MockGenerativeClient {
    /// Create a new mock client with default responses
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            canned: vec![
                "Hello! I'm a mock LLM for testing purposes.".to_string(),
                "This is a simulated response from the mock LLM.".to_string(),
                "I can help you test your application without making real API calls.".to_string(),
                "Mock response: Your request has been processed successfully.".to_string(),
            ],
            canned_index: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
            delay_ms: 0,
            gate: None,
        }
    }

    /// Create a mock that answers with `replies` in order before falling back
    /// to the canned responses
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        let mut client = Self::new();
        client.script = Mutex::new(replies.into());
        client
    }

    /// Simulate network latency on every call
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Hold every call until the returned gate releases it
    pub fn gated(mut self) -> (Self, MockGate) {
        let gate = MockGate {
            permits: Arc::new(Semaphore::new(0)),
        };
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    async fn next_reply(&self, prompt: &str) -> MockReply {
        if let Some(reply) = self.script.lock().await.pop_front() {
            return reply;
        }
        if self.canned.is_empty() {
            return MockReply::text("Mock LLM: No responses configured");
        }
        let mut index = self.canned_index.lock().await;
        let response = &self.canned[*index % self.canned.len()];
        *index += 1;

        if prompt.to_lowercase().contains("test") {
            MockReply::Text(format!("Mock LLM (Test Mode): {}", response))
        } else {
            MockReply::Text(format!("Mock LLM: {}", response))
        }
    }

    pub async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult {
        self.calls.lock().await.push(RecordedCall {
            prompt: prompt.to_string(),
            history: history.to_vec(),
        });

        if let Some(gate) = &self.gate {
            match gate.permits.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(GenerationError::new("mock gate closed")),
            }
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match self.next_reply(prompt).await {
            MockReply::Text(text) => Ok(Some(text)),
            MockReply::Empty => Ok(None),
            MockReply::Fail(message) => Err(GenerationError::new(message)),
        }
    }
}

impl Default for MockGenerativeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult {
        self.generate(prompt, history).await
    }

    fn client_name(&self) -> &str {
        "MockLLM"
    }

    fn model(&self) -> &str {
        "mock"
    }
}

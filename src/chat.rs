use std::sync::Arc;

use crate::chat_client::{GenerativeClient, HistoryTurn};
use crate::config::EmptyResponse;
use crate::error::{GenerationResult, Rejected};
use crate::session::{Session, TurnHandle, TurnPolicy};
use crate::store::{ChatMessage, MessageStore, Transcript};

pub const EMPTY_RESPONSE_MESSAGE: &str = "The model returned an empty response";

/// Multi-turn policy: every turn grows the transcript.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    store: MessageStore,
    empty_response: EmptyResponse,
}

impl ChatLog {
    pub fn new(empty_response: EmptyResponse) -> Self {
        Self {
            store: MessageStore::new(),
            empty_response,
        }
    }

    fn settle_placeholder(&mut self) {
        self.store.resolve_pending(ChatMessage::model(""));
    }
}

impl TurnPolicy for ChatLog {
    type Snapshot = Transcript;

    fn begin(&mut self, prompt: &str) -> Result<Vec<HistoryTurn>, Rejected> {
        if prompt.trim().is_empty() {
            return Err(Rejected::Blank);
        }
        let history = self.store.history();
        self.store.append(ChatMessage::user(prompt));
        self.store.append(ChatMessage::placeholder());
        Ok(history)
    }

    fn complete(&mut self, outcome: GenerationResult) {
        match outcome {
            Ok(Some(text)) if !text.is_empty() => {
                self.store.resolve_pending(ChatMessage::model(text));
            }
            Ok(_) => {
                self.settle_placeholder();
                if self.empty_response == EmptyResponse::Error {
                    self.store.append(ChatMessage::error(EMPTY_RESPONSE_MESSAGE));
                }
            }
            Err(err) => {
                self.settle_placeholder();
                self.store.append(ChatMessage::error(err.message));
            }
        }
    }

    fn snapshot(&self) -> Transcript {
        self.store.snapshot()
    }
}

pub type ChatSession = Session<ChatLog>;

impl Session<ChatLog> {
    pub fn chat(client: Arc<dyn GenerativeClient>, empty_response: EmptyResponse) -> Self {
        Session::new(client, ChatLog::new(empty_response))
    }

    /// Send `text` as the next user turn.
    ///
    /// Blank input is refused without touching the transcript. Otherwise the
    /// user message and a pending model placeholder are visible before this
    /// returns.
    pub fn submit(&self, text: &str) -> Result<TurnHandle, Rejected> {
        self.start(text)
    }
}

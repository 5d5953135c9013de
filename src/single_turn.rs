use serde::Serialize;
use std::sync::Arc;

use crate::chat_client::{GenerativeClient, HistoryTurn};
use crate::config::EmptyResponse;
use crate::error::{GenerationResult, Rejected};
use crate::session::{Session, TurnHandle, TurnPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "output", rename_all = "lowercase")]
pub enum SingleTurnState {
    #[default]
    Idle,
    Loading,
    Success(String),
    Error,
}

/// One question, one answer, no history.
#[derive(Debug, Clone, Default)]
pub struct SingleTurn {
    state: SingleTurnState,
    empty_response: EmptyResponse,
}

impl SingleTurn {
    pub fn new(empty_response: EmptyResponse) -> Self {
        Self {
            state: SingleTurnState::Idle,
            empty_response,
        }
    }
}

impl TurnPolicy for SingleTurn {
    type Snapshot = SingleTurnState;

    fn begin(&mut self, _prompt: &str) -> Result<Vec<HistoryTurn>, Rejected> {
        self.state = SingleTurnState::Loading;
        Ok(Vec::new())
    }

    fn complete(&mut self, outcome: GenerationResult) {
        match outcome {
            Ok(Some(text)) if !text.is_empty() => self.state = SingleTurnState::Success(text),
            // Stays Loading under EmptyResponse::Keep
            Ok(_) => {
                if self.empty_response == EmptyResponse::Error {
                    self.state = SingleTurnState::Error;
                }
            }
            Err(_) => self.state = SingleTurnState::Error,
        }
    }

    fn snapshot(&self) -> SingleTurnState {
        self.state.clone()
    }
}

pub type SingleTurnSession = Session<SingleTurn>;

impl Session<SingleTurn> {
    pub fn single_turn(client: Arc<dyn GenerativeClient>, empty_response: EmptyResponse) -> Self {
        Session::new(client, SingleTurn::new(empty_response))
    }

    /// State is `Loading` by the time this returns.
    pub fn ask(&self, prompt: &str) -> Result<TurnHandle, Rejected> {
        self.start(prompt)
    }

    /// Ask again after an error. The session keeps no record of prompts, so
    /// the caller passes the one it showed the user.
    pub fn retry(&self, prompt: &str) -> Result<TurnHandle, Rejected> {
        self.ask(prompt)
    }
}

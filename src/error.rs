use thiserror::Error;

/// The one failure kind a generative client reports.
///
/// Network, auth, quota and decode failures all collapse into this, carrying
/// only a message that is fit to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL can carry credentials; never let it reach the message.
        let err = err.without_url();
        if err.is_timeout() {
            Self::new("Request timed out")
        } else if err.is_decode() {
            Self::new(format!("Malformed response: {}", err))
        } else {
            Self::new(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Malformed response: {}", err))
    }
}

/// Why a session refused to start a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("input is blank")]
    Blank,
    #[error("a turn is already in flight")]
    Busy,
    #[error("session is closed")]
    Closed,
}

pub type GenerationResult = Result<Option<String>, GenerationError>;

pub mod chat;
pub mod chat_client;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod mock_llm;
pub mod response_card;
pub mod session;
pub mod single_turn;
pub mod store;

// Re-export commonly used types
pub use chat::{ChatLog, ChatSession};
pub use chat_client::{AnyGenerativeClient, GenerativeClient, HistoryTurn, Role};
pub use error::{GenerationError, Rejected};
pub use mock_llm::{MockGenerativeClient, MockReply};
pub use session::{Session, SessionView, TurnHandle, TurnPolicy};
pub use single_turn::{SingleTurn, SingleTurnSession, SingleTurnState};
pub use store::{ChatMessage, MessageStore, Sender, Transcript};

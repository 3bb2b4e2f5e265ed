//! Client for Google's Gemini generative-language API
//!
//! One-shot questions (optionally with prior turns and image attachments),
//! stateful multi-turn chats, token counting and embeddings. Streamed answers
//! are decoded incrementally and delivered as growing snapshots.

pub mod ai;
pub mod error;
pub mod models;

pub use ai::gemini::types::{parse_message_pairs, Message, Role};
pub use ai::gemini::{AskResponse, Chat, Gemini, Snapshot, StreamDecoder};
pub use ai::{MockTransport, ReqwestTransport, Transport};
pub use error::{Error, Result};
pub use models::{AskOptions, ChatConfig, Config, OutputShape};

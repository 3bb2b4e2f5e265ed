//! Error handling and custom error types
//!
//! Provides unified error handling across the client using thiserror.

use crate::ai::gemini::types::PromptFeedback;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Chat messages must be sent one at a time: a turn is already awaiting a response")]
    TurnViolation,

    #[error(
        "Prompt was blocked by Gemini (reason: {})",
        .feedback.block_reason.as_deref().unwrap_or("unspecified")
    )]
    BlockedPrompt { feedback: PromptFeedback },

    #[error("Gemini API error (status {status}): {body}")]
    Transport { status: StatusCode, body: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("'{0}' is not a valid output shape, expected 'text' or 'json'")]
    InvalidOutputShape(String),

    #[error("Stream ended without producing a response")]
    EmptyStream,

    #[error("Unknown file type, expected a png, gif or jpeg image")]
    UnknownFileType,

    #[error("Invalid message pair: {0}")]
    InvalidMessagePair(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of a failed request, when the service answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            Error::Http(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_prompt_message_names_reason() {
        let err = Error::BlockedPrompt {
            feedback: PromptFeedback {
                block_reason: Some("SAFETY".to_string()),
                safety_ratings: Vec::new(),
            },
        };
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_blocked_prompt_without_reason() {
        let err = Error::BlockedPrompt {
            feedback: PromptFeedback::default(),
        };
        assert!(err.to_string().contains("unspecified"));
    }

    #[test]
    fn test_transport_error_exposes_status() {
        let err = Error::Transport {
            status: StatusCode::FORBIDDEN,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert!(err.to_string().contains("403"));
        assert_eq!(Error::TurnViolation.status(), None);
    }
}

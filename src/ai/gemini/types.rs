//! Shared Gemini payload types used across ask, chat, count and embed calls.

use crate::{models, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Untagged union of text and inline media content parts.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        }
    }
}

/// Base64 inline payload used for image attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

/// One turn of a conversation as sent in `contents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

/// Expand a `(user, model)` text pair into its two messages.
pub fn answer_pair_to_messages((user, model): &(String, String)) -> [Message; 2] {
    [Message::user(user.as_str()), Message::model(model.as_str())]
}

/// Parse a JSON array of `[user, model]` string pairs.
pub fn parse_message_pairs(json: &str) -> Result<Vec<(String, String)>> {
    let raw: Vec<Value> = serde_json::from_str(json)?;

    raw.into_iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::Array(items) => match items.as_slice() {
                [Value::String(user), Value::String(model)] => Ok((user.clone(), model.clone())),
                _ => Err(Error::InvalidMessagePair(format!(
                    "entry {} must hold exactly two strings [user, model]",
                    i
                ))),
            },
            other => Err(Error::InvalidMessagePair(format!(
                "entry {} must be a [user, model] array, got {}",
                i, other
            ))),
        })
        .collect()
}

/// Response-side content. The role is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    /// Record this content as the model's turn, whatever role the wire carried.
    pub fn into_model_message(self) -> Message {
        Message {
            role: Role::Model,
            parts: self.parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

/// Candidate completion item returned by Gemini.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

/// Top-level `generateContent` response envelope.
///
/// Fields this crate does not model (`usageMetadata`, `modelVersion`, ...) are
/// kept in `extra` so the structured output shape stays lossless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerateContentResponse {
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }

    /// Text of the first candidate's first text part.
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(Content::first_text)
    }

    /// Fail with [`Error::BlockedPrompt`] when the service flagged the prompt.
    pub fn ensure_not_blocked(&self) -> Result<()> {
        match &self.prompt_feedback {
            Some(feedback) if feedback.block_reason.is_some() => Err(Error::BlockedPrompt {
                feedback: feedback.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// The first candidate's content as the model's history entry.
    pub fn reply(&self) -> Result<Message> {
        self.candidates
            .first()
            .and_then(|c| c.content.clone())
            .map(Content::into_model_message)
            .ok_or_else(|| Error::UnexpectedResponse("No candidate content in response".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: models::DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: models::DEFAULT_TEMPERATURE,
            top_p: models::DEFAULT_TOP_P,
            top_k: models::DEFAULT_TOP_K,
        }
    }
}

/// Body for `generateContent` and `streamGenerateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub contents: &'a [Message],
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct CountTokensRequest {
    pub contents: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    pub total_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct EmbedContentRequest {
    pub model: String,
    pub content: Message,
}

#[derive(Debug, Deserialize)]
pub struct EmbedContentResponse {
    pub embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
pub struct ContentEmbedding {
    pub values: Vec<f32>,
}

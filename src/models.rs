//! Configuration and per-call option structures
//!
//! Environment configuration for the HTTP transport, per-chat defaults and the
//! statically enumerated options accepted by every `ask` call.

use crate::ai::gemini::types::GenerationConfig;
use crate::ai::gemini::AskResponse;
use crate::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-pro";
pub const DEFAULT_VISION_MODEL: &str = "gemini-pro-vision";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";

pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TOP_P: f32 = 0.8;
pub const DEFAULT_TOP_K: u32 = 10;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 800;

/// Shape of the value an `ask` call resolves to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputShape {
    /// First candidate's first text part.
    #[default]
    Text,
    /// The full decoded response object.
    Json,
}

impl FromStr for OutputShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "markdown" => Ok(OutputShape::Text),
            "json" => Ok(OutputShape::Json),
            other => Err(Error::InvalidOutputShape(other.to_string())),
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputShape::Text => f.write_str("text"),
            OutputShape::Json => f.write_str("json"),
        }
    }
}

/// Receives each streamed partial result, already reformatted.
pub type ChunkCallback<'a> = Box<dyn FnMut(AskResponse) + Send + 'a>;

/// Options for a single `ask` call. Unset generation fields fall back to the
/// chat's configuration, then to the crate defaults.
#[derive(Default)]
pub struct AskOptions<'a> {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub model: Option<String>,
    pub output: OutputShape,
    /// Raw image bytes. Only one-shot asks send them; chats ignore them.
    pub attachments: Vec<Vec<u8>>,
    /// Prior `(user, model)` turns for a one-shot ask. Chats carry their own
    /// history and ignore this.
    pub messages: Vec<(String, String)>,
    /// Streams the response when set.
    pub on_chunk: Option<ChunkCallback<'a>>,
}

impl<'a> AskOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn output(mut self, output: OutputShape) -> Self {
        self.output = output;
        self
    }

    pub fn attachment(mut self, data: Vec<u8>) -> Self {
        self.attachments.push(data);
        self
    }

    pub fn messages(mut self, messages: Vec<(String, String)>) -> Self {
        self.messages = messages;
        self
    }

    pub fn on_chunk(mut self, callback: impl FnMut(AskResponse) + Send + 'a) -> Self {
        self.on_chunk = Some(Box::new(callback));
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.on_chunk.is_some()
    }

    /// Overlay the fields set on this call onto `base`.
    pub fn generation_config(&self, base: GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_output_tokens.unwrap_or(base.max_output_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
            top_p: self.top_p.unwrap_or(base.top_p),
            top_k: self.top_k.unwrap_or(base.top_k),
        }
    }
}

impl fmt::Debug for AskOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskOptions")
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("model", &self.model)
            .field("output", &self.output)
            .field("attachments", &self.attachments.len())
            .field("messages", &self.messages.len())
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// Defaults for every turn of a chat, plus the turns it starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub messages: Vec<(String, String)>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub model: String,
    pub max_output_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl ChatConfig {
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let timeout_secs = match std::env::var("GEMINI_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("GEMINI_TIMEOUT_SECS must be a number, got '{}'", raw))
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| Error::Config("GEMINI_API_KEY not set".to_string()))?,
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_from_str() {
        assert_eq!("text".parse::<OutputShape>().unwrap(), OutputShape::Text);
        assert_eq!("markdown".parse::<OutputShape>().unwrap(), OutputShape::Text);
        assert_eq!("json".parse::<OutputShape>().unwrap(), OutputShape::Json);

        let err = "yaml".parse::<OutputShape>().unwrap_err();
        assert!(matches!(err, Error::InvalidOutputShape(ref s) if s == "yaml"));
    }

    #[test]
    fn test_ask_options_overlay_only_set_fields() {
        let base = ChatConfig {
            temperature: 0.2,
            ..ChatConfig::default()
        }
        .generation_config();

        let resolved = AskOptions::new().top_k(3).generation_config(base);

        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.top_k, 3);
        assert_eq!(resolved.top_p, DEFAULT_TOP_P);
        assert_eq!(resolved.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_ask_options_streaming_flag() {
        assert!(!AskOptions::new().is_streaming());
        assert!(AskOptions::new().on_chunk(|_| {}).is_streaming());
    }

    #[test]
    fn test_generation_config_serializes_camel_case() {
        let json = serde_json::to_value(GenerationConfig::default()).unwrap();
        assert_eq!(json["maxOutputTokens"], 800);
        assert_eq!(json["topK"], 10);
        assert!(json.get("topP").is_some());
    }
}

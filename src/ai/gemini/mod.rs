//! Gemini client: one-shot asks, chats, token counting and embeddings on top
//! of an injected [`Transport`].

pub mod chat;
pub mod client;
pub mod stream;
pub mod types;

pub use chat::Chat;
pub use client::ReqwestTransport;
pub use stream::{decode_stream, Snapshot, StreamDecoder};

use super::mime::detect_image_mime;
use super::{Command, Transport, TransportResponse};
use crate::models::{
    AskOptions, ChatConfig, ChunkCallback, Config, OutputShape, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MODEL, DEFAULT_VISION_MODEL,
};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use types::{
    answer_pair_to_messages, Candidate, Content, CountTokensRequest, CountTokensResponse,
    EmbedContentRequest, EmbedContentResponse, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, InlineData, Message, Part, Role,
};

/// Result of an `ask`, shaped per [`OutputShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    Text(String),
    Json(GenerateContentResponse),
}

impl AskResponse {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AskResponse::Text(text) => Some(text),
            AskResponse::Json(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            AskResponse::Text(text) => Some(text),
            AskResponse::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<GenerateContentResponse> {
        match self {
            AskResponse::Json(response) => Some(response),
            AskResponse::Text(_) => None,
        }
    }
}

impl fmt::Display for AskResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AskResponse::Text(text) => f.write_str(text),
            AskResponse::Json(response) => {
                let json = serde_json::to_string_pretty(response).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Gemini API client. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Gemini {
    transport: Arc<dyn Transport>,
}

impl Gemini {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Build a client talking to the real API, as configured by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::from_config(config)?)))
    }

    pub fn format_response(
        shape: OutputShape,
        response: GenerateContentResponse,
    ) -> Result<AskResponse> {
        match shape {
            OutputShape::Text => response
                .text()
                .map(|text| AskResponse::Text(text.to_string()))
                .ok_or_else(|| Error::UnexpectedResponse("No text in Gemini response".to_string())),
            OutputShape::Json => Ok(AskResponse::Json(response)),
        }
    }

    /// Send a request and fail with [`Error::Transport`] on a non-success status.
    pub async fn query<B: Serialize + ?Sized>(
        &self,
        model: &str,
        command: Command,
        body: &B,
    ) -> Result<TransportResponse> {
        let body = serde_json::to_value(body)?;
        let response = self.transport.send_request(model, command, &body).await?;

        if !response.is_success() {
            let status = response.status();
            let body = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, body);
            return Err(Error::Transport { status, body });
        }

        Ok(response)
    }

    pub async fn query_json<B, T>(&self, model: &str, command: Command, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.query(model, command, body).await?.json().await
    }

    /// Stream a response through a [`StreamDecoder`]; see [`decode_stream`].
    pub async fn query_stream<B, F>(
        &self,
        model: &str,
        command: Command,
        body: &B,
        on_snapshot: F,
    ) -> Result<Option<Snapshot>>
    where
        B: Serialize + ?Sized,
        F: FnMut(&Snapshot) -> Result<()>,
    {
        let response = self.query(model, command, body).await?;
        decode_stream(response.into_chunks(), on_snapshot).await
    }

    /// Ask a single question, optionally with prior turns and image attachments.
    ///
    /// Streamed one-shot answers are stitched together: the final result
    /// carries the text of every streamed fragment.
    pub async fn ask(&self, message: &str, options: AskOptions<'_>) -> Result<AskResponse> {
        let generation_config = options.generation_config(GenerationConfig::default());
        let output = options.output;

        let mut contents: Vec<Message> = options
            .messages
            .iter()
            .flat_map(answer_pair_to_messages)
            .collect();

        let mut user = Message::user(message);
        for data in &options.attachments {
            use base64::Engine as _;
            let mime = detect_image_mime(data)?;
            user.parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime.as_str().to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            });
        }
        contents.push(user);

        let model = options.model.unwrap_or_else(|| {
            if options.attachments.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                DEFAULT_VISION_MODEL.to_string()
            }
        });

        let request = GenerateContentRequest {
            contents: &contents,
            generation_config,
        };

        let response = match options.on_chunk {
            None => {
                let response: GenerateContentResponse = self
                    .query_json(&model, Command::GenerateContent, &request)
                    .await?;
                response.ensure_not_blocked()?;
                response
            }
            Some(on_chunk) => self.stream_response(&model, &request, output, on_chunk).await?,
        };
        Self::format_response(output, response)
    }

    /// Run a `streamGenerateContent` request, forwarding each snapshot to
    /// `on_chunk` and failing as soon as the prompt is reported blocked.
    ///
    /// Text output receives only the text added since the previous chunk.
    /// The returned response is the final snapshot with its first text part
    /// replaced by the text of every streamed fragment.
    pub(crate) async fn stream_response(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
        output: OutputShape,
        mut on_chunk: ChunkCallback<'_>,
    ) -> Result<GenerateContentResponse> {
        let mut forwarded = 0;
        let last = self
            .query_stream(model, Command::StreamGenerateContent, request, |snapshot| {
                let response = snapshot.to_response()?;
                response.ensure_not_blocked()?;

                match output {
                    OutputShape::Json => on_chunk(AskResponse::Json(response)),
                    OutputShape::Text => {
                        let added = &snapshot.text()[forwarded..];
                        if added.is_empty() {
                            tracing::debug!("Stream chunk carries no new text, not forwarding");
                        } else {
                            on_chunk(AskResponse::Text(added.to_string()));
                        }
                        forwarded = snapshot.text().len();
                    }
                }
                Ok(())
            })
            .await?
            .ok_or(Error::EmptyStream)?;

        let mut response = last.to_response()?;
        if !last.text().is_empty() {
            set_first_text(&mut response, last.text().to_string());
        }
        Ok(response)
    }

    /// Number of tokens `message` takes up for `model`.
    pub async fn count(&self, message: &str, model: Option<&str>) -> Result<u32> {
        let request = CountTokensRequest {
            contents: vec![Message::user(message)],
        };
        let response: CountTokensResponse = self
            .query_json(model.unwrap_or(DEFAULT_MODEL), Command::CountTokens, &request)
            .await?;
        Ok(response.total_tokens)
    }

    pub async fn embed(&self, message: &str, model: Option<&str>) -> Result<Vec<f32>> {
        let model = model.unwrap_or(DEFAULT_EMBEDDING_MODEL);
        let model = model.strip_prefix("models/").unwrap_or(model);

        // embedContent expects the fully-qualified model name in the body.
        let request = EmbedContentRequest {
            model: format!("models/{}", model),
            content: Message::user(message),
        };
        let response: EmbedContentResponse = self
            .query_json(model, Command::EmbedContent, &request)
            .await?;
        Ok(response.embedding.values)
    }

    pub fn create_chat(&self, config: ChatConfig) -> Chat<'_> {
        Chat::new(self, config)
    }
}

/// Put `text` in the first text part of the first candidate, creating the
/// candidate, content or part when the final fragment carried none.
fn set_first_text(response: &mut GenerateContentResponse, text: String) {
    if response.candidates.is_empty() {
        response.candidates.push(Candidate::default());
    }
    let candidate = &mut response.candidates[0];
    let content = candidate.content.get_or_insert_with(|| Content {
        role: Some(Role::Model),
        parts: Vec::new(),
    });

    match content.parts.iter_mut().find_map(|p| match p {
        Part::Text { text } => Some(text),
        Part::InlineData { .. } => None,
    }) {
        Some(first) => *first = text,
        None => content.parts.insert(0, Part::Text { text }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockTransport;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use serde_json::json;

    fn canned_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP",
                "index": 0,
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" }
                ]
            }],
            "promptFeedback": {
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" }
                ]
            }
        })
    }

    fn gemini_with(transport: &Arc<MockTransport>) -> Gemini {
        Gemini::new(transport.clone())
    }

    #[tokio::test]
    async fn test_ask_returns_text() {
        let transport = Arc::new(MockTransport::new().with_json(canned_response("Hi!")));
        let gemini = gemini_with(&transport);

        let answer = gemini.ask("Hello!", AskOptions::new()).await.unwrap();
        assert_eq!(answer, AskResponse::Text("Hi!".to_string()));

        let request = &transport.requests()[0];
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.command, Command::GenerateContent);
        assert_eq!(
            request.body["contents"],
            json!([{ "role": "user", "parts": [{ "text": "Hello!" }] }])
        );
        assert_eq!(request.body["generationConfig"]["maxOutputTokens"], 800);
        assert_eq!(request.body["generationConfig"]["topK"], 10);
    }

    #[tokio::test]
    async fn test_ask_json_returns_full_response() {
        let transport = Arc::new(MockTransport::new().with_json(canned_response("Hi!")));
        let gemini = gemini_with(&transport);

        let answer = gemini
            .ask("Hello!", AskOptions::new().output(OutputShape::Json))
            .await
            .unwrap()
            .into_json()
            .unwrap();

        assert_eq!(serde_json::to_value(&answer).unwrap(), canned_response("Hi!"));
    }

    #[tokio::test]
    async fn test_ask_with_previous_messages_and_image() {
        let transport = Arc::new(MockTransport::new().with_json(canned_response("A cat")));
        let gemini = gemini_with(&transport);
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

        gemini
            .ask(
                "What does this show?",
                AskOptions::new()
                    .messages(vec![("Hi".to_string(), "Sup?".to_string())])
                    .attachment(png.clone()),
            )
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.model, DEFAULT_VISION_MODEL);

        let contents = request.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");

        use base64::Engine as _;
        let parts = contents[2]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "What does this show?");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(
            parts[1]["inlineData"]["data"],
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
    }

    #[tokio::test]
    async fn test_ask_rejects_unknown_attachment_before_sending() {
        let transport = Arc::new(MockTransport::new().with_json(canned_response("Hi!")));
        let gemini = gemini_with(&transport);

        let err = gemini
            .ask("What is this?", AskOptions::new().attachment(vec![0, 1, 2, 3]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownFileType));
        assert_eq!(transport.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_ask_blocked_prompt_carries_feedback() {
        let transport = Arc::new(MockTransport::new().with_json(json!({
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH" }
                ]
            }
        })));
        let gemini = gemini_with(&transport);

        let err = gemini.ask("something bad", AskOptions::new()).await.unwrap_err();
        match err {
            Error::BlockedPrompt { feedback } => {
                assert_eq!(feedback.block_reason.as_deref(), Some("SAFETY"));
                assert_eq!(feedback.safety_ratings[0].probability, "HIGH");
            }
            other => panic!("expected BlockedPrompt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_maps_error_status() {
        let transport = Arc::new(
            MockTransport::new().with_status(StatusCode::TOO_MANY_REQUESTS, "quota exceeded"),
        );
        let gemini = gemini_with(&transport);

        let err = gemini.ask("Hello!", AskOptions::new()).await.unwrap_err();
        match err {
            Error::Transport { status, body } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streamed_ask_stitches_fragments() {
        let first = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello" }], "role": "model" } }],
            "promptFeedback": { "safetyRatings": [] }
        });
        let second = json!({
            "candidates": [{
                "content": { "parts": [{ "text": ", world" }], "role": "model" },
                "finishReason": "STOP"
            }]
        });
        let transport = Arc::new(MockTransport::new().with_chunks([
            format!("[{}", first),
            format!(",\r\n{}", second),
            "]".to_string(),
        ]));
        let gemini = gemini_with(&transport);

        let mut chunks = Vec::new();
        let answer = gemini
            .ask("Hi", AskOptions::new().on_chunk(|c| chunks.push(c)))
            .await
            .unwrap();

        assert_eq!(answer.as_text(), Some("Hello, world"));
        assert_eq!(
            chunks,
            vec![
                AskResponse::Text("Hello".to_string()),
                AskResponse::Text(", world".to_string())
            ]
        );
        assert_eq!(transport.requests()[0].command, Command::StreamGenerateContent);
    }

    #[tokio::test]
    async fn test_streamed_ask_keeps_fragments_sharing_a_chunk() {
        let hel = json!({ "candidates": [{ "content": { "parts": [{ "text": "Hel" }] } }] });
        let lo = json!({ "candidates": [{ "content": { "parts": [{ "text": "lo" }] } }] });
        let done = json!({ "candidates": [{ "finishReason": "STOP" }] });
        let transport = Arc::new(MockTransport::new().with_chunks([
            format!("[{},\r\n{}", hel, lo),
            format!(",\r\n{}]", done),
        ]));
        let gemini = gemini_with(&transport);

        let mut chunks = Vec::new();
        let answer = gemini
            .ask("Hi", AskOptions::new().on_chunk(|c| chunks.push(c)))
            .await
            .unwrap();

        assert_eq!(answer.as_text(), Some("Hello"));
        assert_eq!(chunks, vec![AskResponse::Text("Hello".to_string())]);
    }

    #[tokio::test]
    async fn test_streamed_json_ask_carries_stitched_text() {
        let transport = Arc::new(MockTransport::new().with_chunks([
            format!("[{}", json!({ "candidates": [{ "content": { "parts": [{ "text": "a" }] } }] })),
            format!(
                ",{}]",
                json!({ "candidates": [{ "content": { "parts": [{ "text": "b" }] }, "finishReason": "STOP" }] })
            ),
        ]));
        let gemini = gemini_with(&transport);

        let mut chunks = 0;
        let answer = gemini
            .ask(
                "Hi",
                AskOptions::new()
                    .output(OutputShape::Json)
                    .on_chunk(|_| chunks += 1),
            )
            .await
            .unwrap()
            .into_json()
            .unwrap();

        assert_eq!(chunks, 2);
        assert_eq!(answer.text(), Some("ab"));
        assert_eq!(answer.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn test_streamed_ask_with_empty_body_fails() {
        let transport = Arc::new(MockTransport::new().with_chunks(Vec::<Vec<u8>>::new()));
        let gemini = gemini_with(&transport);

        let err = gemini
            .ask("Hi", AskOptions::new().on_chunk(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyStream));
    }

    #[tokio::test]
    async fn test_count_tokens() {
        let transport = Arc::new(MockTransport::new().with_json(json!({ "totalTokens": 2 })));
        let gemini = gemini_with(&transport);

        assert_eq!(gemini.count("Hi", None).await.unwrap(), 2);
        let request = &transport.requests()[0];
        assert_eq!(request.command, Command::CountTokens);
        assert_eq!(request.body["contents"][0]["parts"][0]["text"], "Hi");
    }

    #[tokio::test]
    async fn test_embed_uses_qualified_model_in_body() {
        let transport = Arc::new(MockTransport::new().with_json(json!({
            "embedding": { "values": [0.25, -0.5, 0.125] }
        })));
        let gemini = gemini_with(&transport);

        let values = gemini.embed("Hello", None).await.unwrap();
        assert_eq!(values, vec![0.25, -0.5, 0.125]);

        let request = &transport.requests()[0];
        assert_eq!(request.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(request.body["model"], "models/embedding-001");
    }

    #[test]
    fn test_format_text_requires_text() {
        let err = Gemini::format_response(OutputShape::Text, GenerateContentResponse::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));

        let ok = Gemini::format_response(OutputShape::Json, GenerateContentResponse::default());
        assert!(matches!(ok, Ok(AskResponse::Json(_))));
    }
}

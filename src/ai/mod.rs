//! Transport seam between the Gemini client and the network.
//!
//! The client never talks HTTP directly: it hands a model, a command and a
//! JSON body to a [`Transport`] and reads back a [`TransportResponse`], either
//! whole or chunk by chunk.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::{Chat, Gemini, ReqwestTransport};
pub use mock::MockTransport;

use crate::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;

/// Ordered body chunks as they arrive from the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Gemini REST methods addressed as `models/{model}:{command}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GenerateContent,
    StreamGenerateContent,
    CountTokens,
    EmbedContent,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::GenerateContent => "generateContent",
            Command::StreamGenerateContent => "streamGenerateContent",
            Command::CountTokens => "countTokens",
            Command::EmbedContent => "embedContent",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_request(
        &self,
        model: &str,
        command: Command,
        body: &serde_json::Value,
    ) -> Result<TransportResponse>;
}

/// Status plus a body that can be read whole or incrementally.
pub struct TransportResponse {
    status: StatusCode,
    body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }

    pub fn from_chunks(status: StatusCode, chunks: Vec<Vec<u8>>) -> Self {
        Self::new(status, Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub async fn bytes(self) -> Result<Vec<u8>> {
        let mut body = self.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(
                "Failed to parse Gemini response: {}\nBody: {}",
                e,
                String::from_utf8_lossy(&body)
            );
            e.into()
        })
    }

    /// Hand over the body for incremental reading.
    pub fn into_chunks(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_json_joins_chunks() {
        let response = TransportResponse::from_chunks(
            StatusCode::OK,
            vec![b"{\"totalTo".to_vec(), b"kens\": 2}".to_vec()],
        );
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["totalTokens"], 2);
    }

    #[tokio::test]
    async fn test_json_reports_malformed_body() {
        let response = TransportResponse::from_chunks(StatusCode::OK, vec![b"{oops".to_vec()]);
        let err = response.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_chunk_errors_propagate() {
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err(Error::UnexpectedResponse("connection reset".to_string())),
        ]));
        let err = TransportResponse::new(StatusCode::OK, body)
            .text()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Command::StreamGenerateContent.to_string(), "streamGenerateContent");
        assert_eq!(Command::EmbedContent.as_str(), "embedContent");
    }
}

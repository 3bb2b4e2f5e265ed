use super::{Command, Transport, TransportResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::VecDeque;

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub command: Command,
    pub body: serde_json::Value,
}

struct MockResponse {
    status: StatusCode,
    chunks: Vec<Vec<u8>>,
}

/// In-memory transport answering from a queue of canned responses.
///
/// Every call suspends once before answering, the way a real request yields
/// at the network boundary, so concurrent callers interleave.
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a 200 response with `body` serialized as a single chunk.
    pub fn with_json(self, body: serde_json::Value) -> Self {
        let bytes = body.to_string().into_bytes();
        self.with_response(StatusCode::OK, vec![bytes])
    }

    /// Queue a 200 response delivered as the given chunks, in order.
    pub fn with_chunks<I, C>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let chunks = chunks.into_iter().map(Into::into).collect();
        self.with_response(StatusCode::OK, chunks)
    }

    pub fn with_status(self, status: StatusCode, body: &str) -> Self {
        self.with_response(status, vec![body.as_bytes().to_vec()])
    }

    fn with_response(self, status: StatusCode, chunks: Vec<Vec<u8>>) -> Self {
        self.responses
            .lock()
            .push_back(MockResponse { status, chunks });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_request(
        &self,
        model: &str,
        command: Command,
        body: &serde_json::Value,
    ) -> Result<TransportResponse> {
        tokio::task::yield_now().await;

        self.requests.lock().push(RecordedRequest {
            model: model.to_string(),
            command,
            body: body.clone(),
        });

        let response = self.responses.lock().pop_front().ok_or_else(|| {
            Error::UnexpectedResponse(format!("MockTransport has no response queued for {}", command))
        })?;

        Ok(TransportResponse::from_chunks(
            response.status,
            response.chunks,
        ))
    }
}

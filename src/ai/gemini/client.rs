use crate::ai::{Command, Transport, TransportResponse};
use crate::models::{Config, DEFAULT_BASE_URL};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

/// Gemini REST transport backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ReqwestTransport {
    /// `timeout` bounds connecting and each read from the socket. It does not
    /// cap the whole response, so a long stream keeps going while data flows.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Self::new_with_client(api_key, client)
    }

    pub fn new_with_client(api_key: String, client: Client) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("Gemini API key must not be empty".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.api_key.clone(), config.timeout)?.with_base_url(&config.base_url))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `model` may be a bare ID or carry the `models/` prefix.
    fn url(&self, model: &str, command: Command) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, command)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send_request(
        &self,
        model: &str,
        command: Command,
        body: &serde_json::Value,
    ) -> Result<TransportResponse> {
        tracing::debug!("Sending {} request to Gemini (model: {})", command, model);

        let response = self
            .client
            .post(self.url(model, command))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        let status = response.status();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));

        Ok(TransportResponse::new(status, Box::pin(chunks)))
    }
}

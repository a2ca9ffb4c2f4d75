//! [`ChatTransport`] implementation for OpenAI-compatible chat-completion APIs.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use parley_core::ClientConfig;
use parley_runtime::{ChatRequest, ChatTransport, TransportError, TransportReply};

use super::lines::line_stream;
use super::translate::request_body;

const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// HTTP transport for `/v1/chat/completions`.
///
/// Streamed replies come back as a line [`FrameSource`](parley_runtime::FrameSource);
/// everything else as the parsed JSON document.
pub struct OpenAiTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    organization: Option<String>,
}

impl OpenAiTransport {
    /// Build a transport from config. Fails when no API key is configured.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let api_key = config
            .require_api_key()
            .map_err(|e| TransportError::Other(e.into()))?
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            organization: config.organization.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Map a non-success reply to a [`TransportError`].
pub(super) fn error_for_status(status: u16, retry_after: Option<u64>, body_text: &str) -> TransportError {
    let body: Option<Value> = serde_json::from_str(body_text).ok();
    match status {
        401 => TransportError::Auth,
        429 => TransportError::RateLimited {
            retry_after_secs: retry_after
                .or_else(|| body.as_ref().and_then(|v| v["error"]["retry_after_secs"].as_u64()))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        _ => TransportError::Api {
            status,
            message: body
                .as_ref()
                .and_then(|v| v["error"]["message"].as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body_text.to_string()),
        },
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError> {
        let url = self.endpoint();
        let body = request_body(request);

        debug!(model = %request.model, url = %url, stream = request.is_streaming(), "starting OpenAI request");

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();
            debug!(status, "OpenAI request rejected");
            return Err(error_for_status(status, retry_after, &body_text));
        }

        if request.is_streaming() {
            return Ok(TransportReply::Frames(line_stream(response.bytes_stream())));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Stream(format!("invalid JSON body: {}", e)))?;
        Ok(TransportReply::Document(document))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

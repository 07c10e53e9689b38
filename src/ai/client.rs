//! Chat-completion transport
//!
//! The gateway talks to the model provider through [`ChatTransport`].
//! [`OpenAiClient`] is the production implementation: a thin `reqwest`
//! client for OpenAI-compatible `/chat/completions` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::config::GatewayConfig;
use crate::core::models::{ChatRequest, ChatResponse};
use crate::errors::{GatewayError, TransportError};

/// Per-request transport options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the client-wide timeout for this request.
    pub timeout: Option<Duration>,
    /// Extra headers sent with this request only.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Sends a chat-completion request and returns the provider's reply.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] carrying the HTTP status when the provider
    /// rejects the request, or no status when the request never completed.
    async fn send_chat_completion(
        &self,
        request: &ChatRequest,
        options: &RequestOptions,
    ) -> Result<ChatResponse, TransportError>;
}

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    org_id: Option<String>,
    endpoint: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns [`GatewayError::Client`] if the HTTP client cannot be built.
    pub fn new(api_key: String, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                GatewayError::Client(format!("Failed to build OpenAI HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key,
            org_id: config.openai_org_id.clone(),
            endpoint: config.chat_completions_url(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for OpenAiClient {
    async fn send_chat_completion(
        &self,
        request: &ChatRequest,
        options: &RequestOptions,
    ) -> Result<ChatResponse, TransportError> {
        #[cfg(feature = "debug-logs")]
        info!("Sending chat completion request:\n{:?}", request);

        #[cfg(not(feature = "debug-logs"))]
        info!(
            "Sending chat completion to {} with {} messages",
            request.model,
            request.messages.len()
        );

        let headers = build_headers(&self.api_key, self.org_id.as_deref(), &options.headers)?;

        let mut builder = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(request);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            TransportError::new(format!("OpenAI API request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                format!("Failed to read error response body (status {status}): {e}")
            });
            return Err(TransportError::with_status(
                status.as_u16(),
                extract_error_message(&body),
            ));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            TransportError::new(format!("Failed to parse OpenAI response: {e}"))
        })?;
        debug!(
            response_id = reply.id.as_deref().unwrap_or("-"),
            choices = reply.choices.len(),
            "Chat completion succeeded"
        );

        Ok(reply)
    }
}

/// Build the request headers: bearer auth, JSON content type, the optional
/// organisation header, then per-request extras (which may override).
pub fn build_headers(
    api_key: &str,
    org_id: Option<&str>,
    extra: &[(String, String)],
) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    let auth_value = format!("Bearer {api_key}")
        .parse()
        .map_err(|e| TransportError::new(format!("Invalid Authorization header: {e}")))?;
    headers.insert("Authorization", auth_value);
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));

    if let Some(org) = org_id {
        let org_value = org
            .parse()
            .map_err(|e| TransportError::new(format!("Invalid OpenAI-Organization header: {e}")))?;
        headers.insert("OpenAI-Organization", org_value);
    }

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::new(format!("Invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::new(format!("Invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw text.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

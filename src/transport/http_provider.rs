use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::ProviderConfig;
use crate::error::TurnError;
use crate::event::EventLog;
use crate::orchestrator::{DeltaStream, ModelProvider};
use crate::protocol::{encode_request, stream_decoder, ProviderKind, RequestOptions};
use crate::stream::sse_frame_stream;
use crate::util::duration_millis;

use super::decode_delta_stream;
use super::retry::{
    retry_backoff_delay, retry_delay, should_retry_status, should_retry_transport_message,
    RETRY_MAX_ATTEMPTS,
};

const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_MAX_CHARS: usize = 512;

fn build_reqwest_client(timeout: Duration) -> Result<reqwest::Client, TurnError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(8)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| TurnError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Streaming endpoint for `kind` under `base_url`.
#[must_use]
pub(crate) fn endpoint_url(kind: ProviderKind, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = match kind {
        ProviderKind::OpenAiChat => "chat/completions",
        ProviderKind::Anthropic => "messages",
        ProviderKind::OpenAiResponses => "responses",
    };
    format!("{base}/{path}")
}

/// Auth and content headers for one provider.
///
/// # Errors
///
/// Returns [`TurnError::Config`] when the key or version is not a valid header value.
pub(crate) fn provider_headers(
    kind: ProviderKind,
    api_key: &str,
    api_version: Option<&str>,
) -> Result<HeaderMap, TurnError> {
    let invalid = |name: &str| TurnError::Config(format!("invalid {name} header value"));
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    match kind {
        ProviderKind::Anthropic => {
            let key = HeaderValue::from_str(api_key).map_err(|_| invalid("x-api-key"))?;
            headers.insert("x-api-key", key);
            let version =
                HeaderValue::from_str(api_version.unwrap_or(DEFAULT_ANTHROPIC_VERSION))
                    .map_err(|_| invalid("anthropic-version"))?;
            headers.insert("anthropic-version", version);
        }
        ProviderKind::OpenAiChat | ProviderKind::OpenAiResponses => {
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| invalid("authorization"))?;
            headers.insert(AUTHORIZATION, bearer);
        }
    }
    Ok(headers)
}

/// Pull a readable message out of a provider error body.
#[must_use]
pub(crate) fn provider_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }
    body.chars().take(ERROR_BODY_MAX_CHARS).collect()
}

/// [`ModelProvider`] that streams turns from an HTTP provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelProvider {
    name: String,
    kind: ProviderKind,
    url: String,
    headers: HeaderMap,
    options: RequestOptions,
    client: reqwest::Client,
}

impl HttpModelProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client or auth headers cannot be built.
    pub fn new(config: &ProviderConfig, options: RequestOptions) -> Result<Self, TurnError> {
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            url: endpoint_url(config.kind, &config.base_url),
            headers: provider_headers(config.kind, &config.api_key, config.api_version.as_deref())?,
            options,
            client: build_reqwest_client(Duration::from_secs(config.timeout))?,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send(&self, body: bytes::Bytes) -> Result<reqwest::Response, TurnError> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(&self.url)
                .headers(self.headers.clone())
                .body(body.clone())
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < RETRY_MAX_ATTEMPTS && should_retry_transport_message(&message) {
                        let delay = retry_backoff_delay(attempt);
                        tracing::warn!(provider = %self.name, attempt, error = %message, "retrying provider request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TurnError::Transport(message));
                }
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(response);
            }
            if attempt < RETRY_MAX_ATTEMPTS && should_retry_status(status) {
                let delay = retry_delay(response.headers(), attempt);
                tracing::warn!(provider = %self.name, attempt, status, "retrying provider request");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(TurnError::Provider {
                status,
                message: provider_error_message(&body),
            });
        }
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_turn(&self, log: &EventLog) -> Result<DeltaStream, TurnError> {
        let body = encode_request(self.kind, log, &self.options)?;
        let body = serde_json::to_vec(&body)
            .map_err(|err| TurnError::Translation(format!("request body: {err}")))?;

        let start = Instant::now();
        let response = self.send(bytes::Bytes::from(body)).await?;
        tracing::debug!(
            provider = %self.name,
            kind = %self.kind,
            status = response.status().as_u16(),
            latency_ms = duration_millis(start.elapsed()),
            "provider stream opened"
        );

        let frames = sse_frame_stream(response.bytes_stream());
        Ok(decode_delta_stream(frames, stream_decoder(self.kind)))
    }
}

//! LLM client, the single point of entry for all model calls in Huntboard.
//!
//! ARCHITECTURAL RULE: No other module may call a vendor API directly.
//! Everything goes through the `ModelProvider` trait; `AppState` holds an
//! `Arc<dyn ModelProvider>` so the backend can be swapped without touching
//! the pipeline or its callers (tests inject scripted fakes the same way).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in Huntboard.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Stream error: {0}")]
    Stream(String),
}

/// One incremental piece of model output, in arrival order.
/// Channel closure is a normal end of stream; an `Err` item is an abnormal
/// end, after which the consumer finalizes with whatever text it has.
pub type Fragment = Result<String, LlmError>;

/// The model-call seam. `complete` is the single-shot form; `stream` yields
/// fragments. The streaming controller consumes only the fragment shape and
/// wraps single-shot responses as one-fragment streams itself.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    async fn stream(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<mpsc::Receiver<Fragment>, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl LlmResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Vendor chunk adapter
// ────────────────────────────────────────────────────────────────────────────

/// Tagged view of the vendor's heterogeneous stream events. Everything the
/// pipeline does not care about collapses into `Other` instead of failing
/// deserialization.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: DeltaPayload },
    MessageStop,
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaPayload {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Normalized item after adaptation — the only shapes the controller sees.
#[derive(Debug, PartialEq)]
enum StreamItem {
    Delta(String),
    Stop,
    Failed(String),
}

/// Adapts one SSE line to a normalized stream item. Non-data lines, pings,
/// empty deltas, and unparseable payloads all map to `None`.
fn parse_sse_line(line: &str) -> Option<StreamItem> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(e) => {
            debug!("Skipping unparseable stream line: {e}");
            return None;
        }
    };
    match event {
        StreamEvent::ContentBlockDelta {
            delta: DeltaPayload::TextDelta { text },
        } if !text.is_empty() => Some(StreamItem::Delta(text)),
        StreamEvent::ContentBlockDelta { .. } => None,
        StreamEvent::MessageStop => Some(StreamItem::Stop),
        StreamEvent::Error { error } => Some(StreamItem::Failed(error.message)),
        StreamEvent::Other => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic implementation
// ────────────────────────────────────────────────────────────────────────────

/// Wraps the Anthropic Messages API with retry logic (single-shot) and SSE
/// fragment streaming.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    fn request_body<'a>(prompt: &'a str, system: &'a str, stream: bool) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        }
    }

    async fn send(&self, body: &AnthropicRequest<'_>) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    /// Single-shot call. Retries on 429 (rate limit) and 5xx errors with
    /// exponential backoff.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request_body = Self::request_body(prompt, system, false);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.send(&request_body).await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return llm_response
                .text()
                .map(str::to_string)
                .ok_or(LlmError::EmptyContent);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Streaming call. Returns a receiver of text fragments; the SSE byte
    /// stream is drained by a background task so a slow consumer never
    /// stalls the socket read.
    async fn stream(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<mpsc::Receiver<Fragment>, LlmError> {
        let request_body = Self::request_body(prompt, system, true);

        let response = self.send(&request_body).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel::<Fragment>(64);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            // SSE events can split across TCP chunks; buffer until newline.
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Http(e))).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(nl) = buf.find('\n') {
                    let line: String = buf.drain(..=nl).collect();
                    match parse_sse_line(line.trim()) {
                        Some(StreamItem::Delta(text)) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return; // consumer gone
                            }
                        }
                        Some(StreamItem::Stop) => return,
                        Some(StreamItem::Failed(message)) => {
                            let _ = tx.send(Err(LlmError::Stream(message))).await;
                            return;
                        }
                        None => {}
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line_text_delta() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello world"}}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(StreamItem::Delta("Hello world".to_string()))
        );
    }

    #[test]
    fn test_parse_sse_line_message_stop() {
        let line = r#"data: {"type":"message_stop"}"#;
        assert_eq!(parse_sse_line(line), Some(StreamItem::Stop));
    }

    #[test]
    fn test_parse_sse_line_error_event() {
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(StreamItem::Failed("Overloaded".to_string()))
        );
    }

    #[test]
    fn test_parse_sse_line_ignores_ping_and_message_start() {
        assert_eq!(parse_sse_line(r#"data: {"type":"ping"}"#), None);
        assert_eq!(
            parse_sse_line(r#"data: {"type":"message_start","message":{"id":"msg_1"}}"#),
            None
        );
    }

    #[test]
    fn test_parse_sse_line_ignores_non_data_lines() {
        assert_eq!(parse_sse_line("event: content_block_delta"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keepalive"), None);
    }

    #[test]
    fn test_parse_sse_line_ignores_malformed_json() {
        assert_eq!(parse_sse_line("data: {not json"), None);
    }

    #[test]
    fn test_parse_sse_line_ignores_empty_delta() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":""}}"#;
        assert_eq!(parse_sse_line(line), None);
    }

    #[test]
    fn test_parse_sse_line_ignores_non_text_delta() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#;
        assert_eq!(parse_sse_line(line), None);
    }
}

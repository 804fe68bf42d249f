//! Extraction client: send the receipt image and prompt to a vision model.
//!
//! [`ExtractionClient`] is the seam between the pipeline and the provider.
//! [`LlmExtractionClient`] talks to any `edgequake_llm` provider;
//! [`CannedExtractionClient`] replays fixed answers so the normaliser and
//! mapper can be exercised without network access.
//!
//! One call per scan, never retried. A failure ends the scan and the user
//! decides whether to try again.

use crate::config::ScanConfig;
use crate::error::ExtractionError;
use crate::prompts::{ExtractionPrompt, USER_MESSAGE};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Everything sent to the model for one receipt. Built fresh per scan.
#[derive(Clone)]
pub struct ExtractionRequest {
    pub instruction: String,
    pub schema: String,
    pub image: ImageData,
}

impl ExtractionRequest {
    pub fn new(prompt: ExtractionPrompt, image: ImageData) -> Self {
        Self {
            instruction: prompt.instruction,
            schema: prompt.schema,
            image,
        }
    }

    /// Instruction and schema joined into one system message.
    pub fn system_text(&self) -> String {
        format!("{}\n\n{}", self.instruction.trim_end(), self.schema)
    }
}

impl fmt::Debug for ExtractionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionRequest")
            .field("instruction", &self.instruction)
            .field("schema", &self.schema)
            .field("image", &format_args!("<{} bytes base64>", self.image.data.len()))
            .finish()
    }
}

/// The model's untouched answer plus call statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    /// Free text, expected but not guaranteed to be JSON.
    pub raw_text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Anything that can turn an [`ExtractionRequest`] into raw model text.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionResult, ExtractionError>;
}

// ── Real provider ────────────────────────────────────────────────────────

/// [`ExtractionClient`] backed by an `edgequake_llm` vision provider.
pub struct LlmExtractionClient {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmExtractionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ScanConfig) -> Self {
        Self {
            provider,
            name: config
                .provider_name
                .clone()
                .unwrap_or_else(|| "llm".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

#[async_trait]
impl ExtractionClient for LlmExtractionClient {
    fn name(&self) -> &str {
        &self.name
    }

    /// Request layout:
    /// 1. **System message** — instruction followed by the JSON schema
    /// 2. **User message** — a one-line ask plus the receipt image
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        let system_text = request.system_text();
        let messages = vec![
            ChatMessage::system(&system_text),
            ChatMessage::user_with_images(USER_MESSAGE, vec![request.image.clone()]),
        ];
        let options = self.options();

        let start = Instant::now();
        info!("Sending receipt to {}", self.name);

        let call = self.provider.chat(&messages, Some(&options));
        let response = match timeout(Duration::from_secs(self.timeout_secs), call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Extraction failed: {}", e);
                return Err(ExtractionError::Provider {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("Extraction timed out after {}s", self.timeout_secs);
                return Err(ExtractionError::Timeout {
                    secs: self.timeout_secs,
                });
            }
        };

        let duration = start.elapsed();
        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens, response.completion_tokens, duration
        );

        Ok(ExtractionResult {
            raw_text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

// ── Fake ─────────────────────────────────────────────────────────────────

/// Replays queued answers in order; the last answer repeats once the queue
/// is down to one. Records every request it receives.
#[derive(Default)]
pub struct CannedExtractionClient {
    responses: Mutex<VecDeque<Result<String, ExtractionError>>>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl CannedExtractionClient {
    /// A client that always answers `raw`.
    pub fn answering(raw: impl Into<String>) -> Self {
        Self::default().then(Ok(raw.into()))
    }

    /// A client that always fails with `err`.
    pub fn failing(err: ExtractionError) -> Self {
        Self::default().then(Err(err))
    }

    /// Queue another answer.
    pub fn then(self, response: Result<String, ExtractionError>) -> Self {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response);
        }
        self
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionClient for CannedExtractionClient {
    fn name(&self) -> &str {
        "canned"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let mut queue = self
            .responses
            .lock()
            .map_err(|_| ExtractionError::Provider {
                message: "canned response queue poisoned".into(),
            })?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match next {
            Some(Ok(raw_text)) => Ok(ExtractionResult {
                raw_text,
                ..Default::default()
            }),
            Some(Err(e)) => Err(e),
            None => Err(ExtractionError::Provider {
                message: "no canned response configured".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSet;

    fn request() -> ExtractionRequest {
        ExtractionRequest::new(
            ExtractionPrompt::new(FieldSet::Basic, None),
            ImageData::new("aGVsbG8=", "image/png"),
        )
    }

    #[test]
    fn build_options_defaults() {
        let config = ScanConfig::default();
        let opts = build_options(config.temperature, config.max_tokens);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn system_text_joins_instruction_and_schema() {
        let text = request().system_text();
        assert!(text.contains("asistente contable"));
        assert!(text.contains("\"moneda\""));
    }

    #[tokio::test]
    async fn canned_replays_in_order_then_repeats() {
        let client = CannedExtractionClient::answering("one").then(Ok("two".into()));
        let req = request();
        assert_eq!(client.extract(&req).await.unwrap().raw_text, "one");
        assert_eq!(client.extract(&req).await.unwrap().raw_text, "two");
        assert_eq!(client.extract(&req).await.unwrap().raw_text, "two");
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn canned_failure() {
        let client = CannedExtractionClient::failing(ExtractionError::Provider {
            message: "quota exceeded".into(),
        });
        let err = client.extract(&request()).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn empty_canned_client_errors() {
        let client = CannedExtractionClient::default();
        assert!(client.extract(&request()).await.is_err());
    }
}

//! VLM interaction: send the prompt and image, get raw text back.
//!
//! [`ExtractionClient`] is the seam between the pipeline and whatever
//! answers the request. Two implementations ship with the crate:
//!
//! - [`GeminiClient`] talks to the Google Generative Language REST API
//!   directly with the configured API key. This is the default backend.
//! - [`ProviderClient`] adapts any `edgequake_llm::LLMProvider` (OpenAI,
//!   Anthropic, Ollama, …) when a provider name is configured.
//!
//! Exactly one attempt is made. Errors are surfaced with the service's own
//! message; nothing here retries. [`call_with_timeout`] bounds the call.

use crate::config::ExtractionConfig;
use crate::error::TimetableError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The model's answer, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModelResponse {
    pub text: String,
}

impl RawModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A multimodal model that can read an image under a text instruction.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Short backend name used in errors and logs (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send one request and return the raw text. No retries.
    async fn extract(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<RawModelResponse, TimetableError>;
}

/// Run `client.extract` under `timeout`.
///
/// Elapsing yields [`TimetableError::ApiTimeout`]; the in-flight request is
/// dropped.
pub async fn call_with_timeout(
    client: &dyn ExtractionClient,
    prompt: &str,
    image: &ImageData,
    timeout: Duration,
) -> Result<RawModelResponse, TimetableError> {
    let start = Instant::now();
    info!("Sending extraction request to {}", client.name());

    let result = match tokio::time::timeout(timeout, client.extract(prompt, image)).await {
        Ok(result) => result,
        Err(_) => Err(TimetableError::ApiTimeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    };

    if let Ok(ref response) = result {
        debug!(
            "{} answered with {} chars in {:?}",
            client.name(),
            response.text.len(),
            start.elapsed()
        );
    }
    result
}

// ── Gemini REST client ───────────────────────────────────────────────────

/// Direct client for `models/{model}:generateContent`.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    stream: bool,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl GeminiClient {
    /// Build a client from the run configuration.
    ///
    /// # Errors
    /// [`TimetableError::ProviderNotConfigured`] when no API key is set.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, TimetableError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TimetableError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "No API key configured.\nSet GEMINI_API_KEY or pass --api-key, \
                       or choose another backend with --provider."
                    .into(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .map_err(|e| TimetableError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: config.model.trim_start_matches("models/").to_string(),
            endpoint: config.endpoint.clone(),
            stream: config.stream,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn url(&self) -> String {
        let method = if self.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{}/models/{}:{}", self.endpoint, self.model, method)
    }

    /// A reqwest timeout, whether on connect, send or body read, is `ApiTimeout`.
    fn transport_error(&self, e: reqwest::Error, start: Instant, context: &str) -> TimetableError {
        if e.is_timeout() {
            TimetableError::ApiTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        } else {
            TimetableError::ExtractionService {
                provider: self.name().into(),
                message: format!("{context}: {e}"),
            }
        }
    }
}

#[async_trait]
impl ExtractionClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn extract(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<RawModelResponse, TimetableError> {
        let start = Instant::now();
        let body = build_request(prompt, image, self.temperature, self.max_tokens);

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e, start, "request failed"))?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, start, "failed to read response body"))?;

        if !status.is_success() {
            return Err(classify_http_error(
                self.name(),
                status.as_u16(),
                &text,
                retry_after_secs,
            ));
        }

        let chunks = if self.stream {
            serde_json::from_str::<Vec<GenerateContentResponse>>(&text)
        } else {
            serde_json::from_str::<GenerateContentResponse>(&text).map(|r| vec![r])
        }
        .map_err(|e| TimetableError::ExtractionService {
            provider: self.name().into(),
            message: format!("unreadable response body: {e}"),
        })?;

        response_text(self.name(), &chunks).map(RawModelResponse::new)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    status: Option<String>,
}

/// Prompt text first, then the image, in a single user turn.
fn build_request<'a>(
    prompt: &'a str,
    image: &'a ImageData,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
) -> GenerateContentRequest<'a> {
    let generation_config = if temperature.is_some() || max_tokens.is_some() {
        Some(GenerationConfig {
            temperature,
            max_output_tokens: max_tokens,
        })
    } else {
        None
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Text { text: prompt },
                Part::InlineData {
                    inline_data: Blob {
                        mime_type: &image.mime_type,
                        data: &image.data,
                    },
                },
            ],
        }],
        generation_config,
    }
}

/// Concatenate the first candidate's text parts across all chunks.
///
/// A blocked prompt, a response without candidates, or an empty candidate
/// that did not finish normally is [`TimetableError::EmptyResponse`]. An
/// empty answer that finished with `STOP` is still the model's answer and is
/// returned as-is.
fn response_text(
    provider: &str,
    chunks: &[GenerateContentResponse],
) -> Result<String, TimetableError> {
    let mut text = String::new();
    let mut blocked: Option<String> = None;
    let mut finish_reason: Option<String> = None;
    let mut saw_candidate = false;

    for chunk in chunks {
        if let Some(block) = chunk
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            blocked = Some(format!("prompt blocked ({block})"));
        }
        if let Some(candidate) = chunk.candidates.first() {
            saw_candidate = true;
            if let Some(ref content) = candidate.content {
                for part in content.parts.iter().filter(|p| !p.thought) {
                    if let Some(ref t) = part.text {
                        text.push_str(t);
                    }
                }
            }
            if let Some(ref finish) = candidate.finish_reason {
                finish_reason = Some(finish.clone());
            }
        }
    }

    if !text.trim().is_empty() {
        return Ok(text);
    }
    let reason = match (blocked, finish_reason) {
        (Some(block), _) => block,
        (None, Some(ref finish)) if finish == "STOP" => return Ok(text),
        (None, Some(finish)) => format!("finish reason {finish}"),
        (None, None) if saw_candidate => "candidate carried no text".into(),
        (None, None) => "no candidates returned".into(),
    };
    Err(TimetableError::EmptyResponse {
        provider: provider.into(),
        reason,
    })
}

fn classify_http_error(
    provider: &str,
    status: u16,
    body: &str,
    retry_after_secs: Option<u64>,
) -> TimetableError {
    let detail = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(s) => format!("{} ({s})", parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body.trim().to_string(),
    };

    match status {
        401 | 403 => TimetableError::AuthError {
            provider: provider.into(),
            detail,
        },
        429 => TimetableError::RateLimitExceeded {
            provider: provider.into(),
            detail,
            retry_after_secs,
        },
        _ => TimetableError::ExtractionService {
            provider: provider.into(),
            message: format!("HTTP {status}: {detail}"),
        },
    }
}

// ── edgequake-llm provider adapter ───────────────────────────────────────

/// Adapter over an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_options(mut self, temperature: Option<f32>, max_tokens: Option<usize>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExtractionClient for ProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        prompt: &str,
        image: &ImageData,
    ) -> Result<RawModelResponse, TimetableError> {
        // The prompt travels with the image in one user turn, as with Gemini.
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image.clone()])];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TimetableError::ExtractionService {
                provider: self.name.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            warn!("{} returned an empty completion", self.name);
        }
        Ok(RawModelResponse::new(response.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> ImageData {
        ImageData::new("aGVsbG8=".to_string(), "image/png")
    }

    #[test]
    fn request_puts_prompt_before_image() {
        let img = image();
        let body = serde_json::to_value(build_request("read this", &img, None, None)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "read this"},
                        {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn request_carries_generation_config_when_set() {
        let img = image();
        let body =
            serde_json::to_value(build_request("p", &img, Some(0.5), Some(8192))).unwrap();
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.5, "maxOutputTokens": 8192})
        );
    }

    #[test]
    fn text_joins_parts_and_skips_thoughts() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking…", "thought": true},
                    {"text": "```json\n[]"},
                    {"text": "\n```"}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response_text("gemini", &[resp]).unwrap(), "```json\n[]\n```");
    }

    #[test]
    fn streamed_chunks_are_concatenated() {
        let chunks: Vec<GenerateContentResponse> = serde_json::from_value(json!([
            {"candidates": [{"content": {"parts": [{"text": "[{\"day\":"}]}}]},
            {"candidates": [{"content": {"parts": [{"text": "\"Monday\"}]"}]}, "finishReason": "STOP"}]}
        ]))
        .unwrap();
        assert_eq!(
            response_text("gemini", &chunks).unwrap(),
            "[{\"day\":\"Monday\"}]"
        );
    }

    #[test]
    fn blocked_prompt_is_empty_response() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        match response_text("gemini", &[resp]) {
            Err(TimetableError::EmptyResponse { reason, .. }) => {
                assert!(reason.contains("SAFETY"), "got: {reason}")
            }
            other => panic!("expected EmptyResponse, got {other:?}"),
        }
    }

    #[test]
    fn http_errors_keep_service_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let e = classify_http_error("gemini", 400, body, None);
        let msg = e.to_string();
        assert!(msg.contains("API key not valid. Please pass a valid API key."), "got: {msg}");
        assert!(msg.contains("HTTP 400"));

        assert!(matches!(
            classify_http_error("gemini", 403, body, None),
            TimetableError::AuthError { .. }
        ));
        assert!(matches!(
            classify_http_error("gemini", 429, "slow down", Some(30)),
            TimetableError::RateLimitExceeded {
                retry_after_secs: Some(30),
                ..
            }
        ));

        let quota = r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#;
        let e = classify_http_error("gemini", 429, quota, None);
        let msg = e.to_string();
        assert!(msg.contains("Resource has been exhausted (e.g. check quota)."), "got: {msg}");
        assert!(msg.contains("RESOURCE_EXHAUSTED"), "got: {msg}");
        assert_eq!(e.exit_code(), 4);
    }

    #[test]
    fn empty_stop_answer_is_passed_through() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "  "}]}, "finishReason": "STOP"}]
        }))
        .unwrap();
        assert_eq!(response_text("gemini", &[resp]).unwrap(), "  ");
    }

    #[test]
    fn missing_candidates_and_abnormal_finish_are_empty_response() {
        let none: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        match response_text("gemini", &[none]) {
            Err(TimetableError::EmptyResponse { reason, .. }) => {
                assert_eq!(reason, "no candidates returned")
            }
            other => panic!("expected EmptyResponse, got {other:?}"),
        }

        let cut: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        match response_text("gemini", &[cut]) {
            Err(TimetableError::EmptyResponse { reason, .. }) => {
                assert!(reason.contains("SAFETY"), "got: {reason}")
            }
            other => panic!("expected EmptyResponse, got {other:?}"),
        }
    }

    #[test]
    fn gemini_requires_api_key() {
        let config = ExtractionConfig::default();
        assert!(matches!(
            GeminiClient::from_config(&config),
            Err(TimetableError::ProviderNotConfigured { .. })
        ));
    }

    #[test]
    fn gemini_url_selects_method() {
        let mut config = ExtractionConfig::builder()
            .api_key("k")
            .model("models/gemini-2.5-flash")
            .build()
            .unwrap();
        let client = GeminiClient::from_config(&config).unwrap();
        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        config.stream = true;
        let client = GeminiClient::from_config(&config).unwrap();
        assert!(client.url().ends_with(":streamGenerateContent"));
    }

    struct Never;

    #[async_trait]
    impl ExtractionClient for Never {
        fn name(&self) -> &str {
            "never"
        }

        async fn extract(
            &self,
            _prompt: &str,
            _image: &ImageData,
        ) -> Result<RawModelResponse, TimetableError> {
            std::future::pending().await
        }
    }

    /// Serve response headers, then stall before the body is complete.
    async fn stalled_body_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{\"cand")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn body_read_timeout_is_api_timeout() {
        let endpoint = stalled_body_server().await;
        let config = ExtractionConfig::builder()
            .api_key("k")
            .endpoint(endpoint)
            .api_timeout(Duration::from_millis(300))
            .build()
            .unwrap();
        let client = GeminiClient::from_config(&config).unwrap();

        let err = client.extract("p", &image()).await.unwrap_err();
        assert!(matches!(err, TimetableError::ApiTimeout { .. }), "got {err:?}");
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn timeout_is_distinct_error() {
        let err = call_with_timeout(&Never, "p", &image(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TimetableError::ApiTimeout { .. }));
    }
}

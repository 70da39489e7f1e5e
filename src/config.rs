//! Configuration for a timetable extraction run.
//!
//! Everything a run needs (input path, output paths, credential, model
//! options, timeout) lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. The library never reads process environment
//! on its own; the CLI fills the builder from flags and their `env` fallbacks
//! and passes the result down by reference.

use crate::error::TimetableError;
use crate::pipeline::llm::ExtractionClient;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_timetable::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .image_path("timetable.jpg")
///     .api_key("my-key")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-2.5-flash");
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Timetable image to read. Default: `timetable.jpg`.
    pub image_path: PathBuf,

    /// Where the extracted JSON is written. Default: `timetable.json`.
    pub output_path: PathBuf,

    /// Where the raw response is written when it is not valid JSON.
    /// Default: `raw_response.txt`.
    pub diagnostic_path: PathBuf,

    /// API key for the direct Gemini client. Never logged.
    pub api_key: Option<String>,

    /// Model identifier. Default: `gemini-2.5-flash`.
    pub model: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    ///
    /// When set, the call goes through `edgequake_llm::ProviderFactory`
    /// instead of the direct Gemini client, and the provider reads its own
    /// API key variable.
    pub provider_name: Option<String>,

    /// Pre-constructed client. Takes precedence over everything else.
    pub client: Option<Arc<dyn ExtractionClient>>,

    /// Base URL of the Gemini REST API.
    pub endpoint: String,

    /// Use incremental delivery (`streamGenerateContent`). Default: false.
    ///
    /// The response is still assembled in full before parsing.
    pub stream: bool,

    /// Sampling temperature. `None` leaves the service default.
    pub temperature: Option<f32>,

    /// Maximum output tokens. `None` leaves the service default.
    pub max_tokens: Option<usize>,

    /// Upper bound on the inference call. Default: 120 s.
    pub api_timeout: Duration,

    /// Longest image edge sent to the model, in pixels. Default: 3072.
    ///
    /// Larger images are downscaled proportionally before encoding. Phone
    /// photos of a timetable are often 4000+ px wide; beyond ~3000 px the
    /// model sees no more detail but the request body keeps growing.
    pub max_image_pixels: u32,

    /// Custom prompt. If None, uses [`crate::prompts::default_prompt`].
    pub prompt: Option<String>,

    /// Retry parsing with the tolerant payload extractor when the
    /// fence-stripped text is not JSON. Default: true.
    pub lenient_json: bool,

    /// Run the schedule validator on successfully parsed output. Default: true.
    pub validate: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("timetable.jpg"),
            output_path: PathBuf::from("timetable.json"),
            diagnostic_path: PathBuf::from("raw_response.txt"),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            client: None,
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            stream: false,
            temperature: None,
            max_tokens: None,
            api_timeout: Duration::from_secs(120),
            max_image_pixels: 3072,
            prompt: None,
            lenient_json: true,
            validate: true,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("image_path", &self.image_path)
            .field("output_path", &self.output_path)
            .field("diagnostic_path", &self.diagnostic_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .field("endpoint", &self.endpoint)
            .field("stream", &self.stream)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout", &self.api_timeout)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("lenient_json", &self.lenient_json)
            .field("validate", &self.validate)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.image_path = path.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn diagnostic_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.diagnostic_path = path.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn ExtractionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn stream(mut self, v: bool) -> Self {
        self.config.stream = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout = Duration::from_secs(secs);
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn lenient_json(mut self, v: bool) -> Self {
        self.config.lenient_json = v;
        self
    }

    pub fn validate(mut self, v: bool) -> Self {
        self.config.validate = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, TimetableError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(TimetableError::InvalidConfig("model must not be empty".into()));
        }
        if c.api_timeout.is_zero() {
            return Err(TimetableError::InvalidConfig(
                "API timeout must be greater than zero".into(),
            ));
        }
        if c.max_image_pixels < 64 {
            return Err(TimetableError::InvalidConfig(format!(
                "max image pixels must be ≥ 64, got {}",
                c.max_image_pixels
            )));
        }
        if c.stream && c.provider_name.is_some() {
            return Err(TimetableError::InvalidConfig(
                "streaming is only supported by the direct Gemini client".into(),
            ));
        }
        if let Some(ref p) = c.prompt {
            if p.trim().is_empty() {
                return Err(TimetableError::InvalidConfig("prompt must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_run_layout() {
        let c = ExtractionConfig::default();
        assert_eq!(c.image_path, PathBuf::from("timetable.jpg"));
        assert_eq!(c.output_path, PathBuf::from("timetable.json"));
        assert_eq!(c.diagnostic_path, PathBuf::from("raw_response.txt"));
        assert_eq!(c.model, "gemini-2.5-flash");
        assert!(!c.stream);
        assert!(c.lenient_json);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder()
            .api_key("super-secret-key")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ExtractionConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, TimetableError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_stream_with_provider() {
        let err = ExtractionConfig::builder()
            .provider_name("openai")
            .stream(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("streaming"));
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let c = ExtractionConfig::builder()
            .endpoint("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        assert_eq!(c.endpoint, "http://localhost:8080/v1beta");
    }

    #[test]
    fn temperature_clamped() {
        let c = ExtractionConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, Some(2.0));
    }
}

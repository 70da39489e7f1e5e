//! Extraction entry points: image in, schedule file out.
//!
//! [`extract_timetable`] runs the whole pipeline for one image:
//! load → encode → prompt → call → normalize → persist. Fatal failures
//! (missing image, service error, timeout) come back as `Err` before any
//! file is written; everything after the model has answered is reported
//! through [`PersistOutcome`].

use crate::config::ExtractionConfig;
use crate::error::TimetableError;
use crate::pipeline::llm::{call_with_timeout, ExtractionClient, GeminiClient, ProviderClient};
use crate::pipeline::persist::{persist, OutputPaths, PersistOptions, PersistOutcome};
use crate::pipeline::{encode, input, normalize};
use crate::prompts::default_prompt;
use edgequake_llm::ProviderFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// What is sent for one run: which image, under which instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub image_path: PathBuf,
    pub prompt: String,
}

impl ExtractionRequest {
    /// The configured image with the configured (or built-in) prompt.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            image_path: config.image_path.clone(),
            prompt: config.prompt.clone().unwrap_or_else(default_prompt),
        }
    }
}

/// Extract the timetable in `config.image_path` and persist it.
///
/// The backend is resolved from the config (see [`resolve_client`]) only
/// after the image has loaded, so a missing image never reaches the network.
///
/// # Errors
/// Returns `Err` only for fatal failures:
/// - image missing / unreadable / not an image
/// - backend not configured
/// - inference service error or timeout
///
/// A response that is not JSON is *not* an error here: it is reported as
/// [`PersistOutcome::ParseFailed`] with the raw text saved for inspection.
pub async fn extract_timetable(config: &ExtractionConfig) -> Result<PersistOutcome, TimetableError> {
    let total_start = Instant::now();
    let request = ExtractionRequest::from_config(config);
    info!("Starting extraction: {}", request.image_path.display());

    // ── Step 1: Load image ───────────────────────────────────────────────
    let image = input::load_image(&request.image_path)?;

    // ── Step 2: Resolve backend ──────────────────────────────────────────
    let client = resolve_client(config)?;

    let outcome = run_with_client(client.as_ref(), &request, &image, config).await?;
    info!(
        "Extraction finished in {}ms",
        total_start.elapsed().as_millis()
    );
    Ok(outcome)
}

/// Run the encode → call → normalize → persist stages with a given client.
pub async fn run_with_client(
    client: &dyn ExtractionClient,
    request: &ExtractionRequest,
    image: &input::TimetableImage,
    config: &ExtractionConfig,
) -> Result<PersistOutcome, TimetableError> {
    // ── Step 3: Encode image ─────────────────────────────────────────────
    let image_data = encode::encode_image(&image.image, config.max_image_pixels).map_err(|e| {
        TimetableError::NotAnImage {
            path: image.path.clone(),
            detail: format!("Image encoding failed: {e}"),
        }
    })?;

    // ── Step 4: Call the model ───────────────────────────────────────────
    debug!("Prompt is {} chars", request.prompt.len());
    let llm_start = Instant::now();
    let raw = call_with_timeout(client, &request.prompt, &image_data, config.api_timeout).await?;
    info!(
        "Model answered in {}ms ({} chars)",
        llm_start.elapsed().as_millis(),
        raw.text.len()
    );

    // ── Step 5: Normalize ────────────────────────────────────────────────
    let normalized = normalize::normalize(&raw.text);

    // ── Step 6: Parse & persist ──────────────────────────────────────────
    let paths = OutputPaths {
        success: config.output_path.clone(),
        diagnostic: config.diagnostic_path.clone(),
    };
    let options = PersistOptions {
        lenient_json: config.lenient_json,
        validate: config.validate,
    };
    Ok(persist(&raw, &normalized, &paths, options))
}

/// Synchronous wrapper around [`extract_timetable`].
///
/// Creates a current-thread tokio runtime internally.
pub fn extract_timetable_sync(config: &ExtractionConfig) -> Result<PersistOutcome, TimetableError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TimetableError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_timetable(config))
}

/// Resolve the extraction backend, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`): used as-is.
/// 2. **Named provider** (`config.provider_name`): built through
///    [`ProviderFactory::create_llm_provider`] with `config.model`; the
///    provider reads its own API key variable.
/// 3. **Direct Gemini**: [`GeminiClient`] with `config.api_key`.
pub fn resolve_client(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionClient>, TimetableError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            TimetableError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        let client = ProviderClient::new(provider, name.clone())
            .with_options(config.temperature, config.max_tokens);
        return Ok(Arc::new(client));
    }

    Ok(Arc::new(GeminiClient::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_default_prompt() {
        let config = ExtractionConfig::default();
        let request = ExtractionRequest::from_config(&config);
        assert_eq!(request.image_path, PathBuf::from("timetable.jpg"));
        assert_eq!(request.prompt, default_prompt());
    }

    #[test]
    fn request_uses_prompt_override() {
        let config = ExtractionConfig::builder()
            .prompt("List the classes as JSON.")
            .build()
            .unwrap();
        assert_eq!(
            ExtractionRequest::from_config(&config).prompt,
            "List the classes as JSON."
        );
    }

    #[test]
    fn gemini_is_the_default_backend() {
        let config = ExtractionConfig::builder().api_key("k").build().unwrap();
        let client = resolve_client(&config).unwrap();
        assert_eq!(client.name(), "gemini");
    }

    #[test]
    fn missing_key_is_reported_for_default_backend() {
        let err = resolve_client(&ExtractionConfig::default()).err().unwrap();
        assert_eq!(err.exit_code(), 4);
    }
}

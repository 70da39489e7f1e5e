//! Error types for the edgequake-timetable library.
//!
//! Failures fall into two groups:
//!
//! * **Fatal**: the run cannot produce anything useful (image missing,
//!   inference service down, call timed out). Returned as
//!   `Err(TimetableError)` from [`crate::extract::extract_timetable`]; no
//!   output file is touched.
//!
//! * **Degraded**: the model answered but its text is not valid JSON. The
//!   raw text is saved to the diagnostic file and the run reports
//!   [`crate::pipeline::persist::PersistOutcome::ParseFailed`] carrying a
//!   [`JsonSyntaxError`] with the exact line and column.
//!
//! [`TimetableError::exit_code`] maps every variant to the process exit
//! status the CLI uses.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-timetable library.
#[derive(Debug, Error)]
pub enum TimetableError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The configured timetable image does not exist.
    #[error("Image file '{path}' not found!\nPlease make sure the image file exists, or pass another path.")]
    MissingInput { path: PathBuf },

    /// Process does not have read permission on the image.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is not a decodable raster image.
    #[error("File is not a supported image: '{path}': {detail}")]
    NotAnImage { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The inference backend could not be constructed (missing key, unknown provider).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The inference call failed (transport, quota, service-side error).
    #[error("Extraction service '{provider}' failed: {message}")]
    ExtractionService { provider: String, message: String },

    /// The service rejected the credential (HTTP 401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The service returned HTTP 429.
    #[error(
        "Rate limit exceeded for provider '{provider}': {detail}{}",
        retry_hint(.retry_after_secs)
    )]
    RateLimitExceeded {
        provider: String,
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// The call succeeded but carried no text (e.g. blocked by a safety filter).
    #[error("Provider '{provider}' returned no text: {reason}")]
    EmptyResponse { provider: String, reason: String },

    /// The inference call did not complete within the configured timeout.
    #[error("Inference call timed out after {elapsed_ms}ms\nIncrease --api-timeout.")]
    ApiTimeout { elapsed_ms: u64 },

    // ── Response errors ───────────────────────────────────────────────────
    /// The normalized response is not valid JSON.
    #[error(transparent)]
    ResponseParse(#[from] JsonSyntaxError),

    /// The response parsed but its shape cannot be persisted as a schedule.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the success or diagnostic file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimetableError {
    /// Process exit status for this error.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | 1 | unexpected failure (I/O, odd response shape, internal) |
    /// | 3 | image missing, unreadable or undecodable |
    /// | 4 | inference service error |
    /// | 5 | inference timeout |
    /// | 6 | response is not valid JSON |
    /// | 7 | invalid configuration |
    pub fn exit_code(&self) -> u8 {
        match self {
            TimetableError::MissingInput { .. }
            | TimetableError::PermissionDenied { .. }
            | TimetableError::NotAnImage { .. } => 3,
            TimetableError::ProviderNotConfigured { .. }
            | TimetableError::ExtractionService { .. }
            | TimetableError::AuthError { .. }
            | TimetableError::RateLimitExceeded { .. }
            | TimetableError::EmptyResponse { .. } => 4,
            TimetableError::ApiTimeout { .. } => 5,
            TimetableError::ResponseParse(_) => 6,
            TimetableError::InvalidConfig(_) => 7,
            TimetableError::UnexpectedResponse(_)
            | TimetableError::OutputWriteFailed { .. }
            | TimetableError::Internal(_) => 1,
        }
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("\nRetry after {secs}s."),
        None => String::new(),
    }
}

/// A JSON syntax error located in the model's response text.
///
/// `line` and `column` are 1-based, as reported by `serde_json`.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("Failed to parse response as JSON: {message} (line {line}, column {column})")]
pub struct JsonSyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<&serde_json::Error> for JsonSyntaxError {
    fn from(e: &serde_json::Error) -> Self {
        // serde_json appends " at line L column C" to Display; keep the bare message.
        let full = e.to_string();
        let message = match full.rfind(" at line ") {
            Some(idx) => full[..idx].to_string(),
            None => full,
        };
        Self {
            message,
            line: e.line(),
            column: e.column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_names_the_file() {
        let e = TimetableError::MissingInput {
            path: PathBuf::from("timetable.jpg"),
        };
        assert!(e.to_string().contains("timetable.jpg"), "got: {e}");
        assert_eq!(e.exit_code(), 3);
    }

    #[test]
    fn api_timeout_display() {
        let e = TimetableError::ApiTimeout { elapsed_ms: 5000 };
        assert!(e.to_string().contains("5000ms"));
        assert_eq!(e.exit_code(), 5);
    }

    #[test]
    fn service_error_keeps_detail_verbatim() {
        let e = TimetableError::ExtractionService {
            provider: "gemini".into(),
            message: "API key not valid. Please pass a valid API key.".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gemini"));
        assert!(msg.contains("API key not valid. Please pass a valid API key."));
        assert_eq!(e.exit_code(), 4);
    }

    #[test]
    fn rate_limit_keeps_detail_and_retry_hint() {
        let e = TimetableError::RateLimitExceeded {
            provider: "gemini".into(),
            detail: "Resource has been exhausted (e.g. check quota).".into(),
            retry_after_secs: Some(30),
        };
        let msg = e.to_string();
        assert!(msg.contains("Resource has been exhausted (e.g. check quota)."), "got: {msg}");
        assert!(msg.contains("Retry after 30s."), "got: {msg}");
        assert_eq!(e.exit_code(), 4);

        let e = TimetableError::RateLimitExceeded {
            provider: "gemini".into(),
            detail: "slow down".into(),
            retry_after_secs: None,
        };
        assert!(!e.to_string().contains("Retry after"));
    }

    #[test]
    fn json_syntax_error_from_serde() {
        let err = serde_json::from_str::<serde_json::Value>("[1,\n 2,,]").unwrap_err();
        let syntax = JsonSyntaxError::from(&err);
        assert_eq!(syntax.line, 2);
        assert!(syntax.column > 0);
        assert!(!syntax.message.contains(" at line "), "got: {}", syntax.message);

        let e = TimetableError::from(syntax);
        assert!(e.to_string().contains("line 2"));
        assert_eq!(e.exit_code(), 6);
    }

    #[test]
    fn output_write_failed_is_unexpected() {
        let e = TimetableError::OutputWriteFailed {
            path: PathBuf::from("/read-only/timetable.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("/read-only/timetable.json"));
        assert_eq!(e.exit_code(), 1);
    }
}

//! Persistence: parse the normalized text and write the success or diagnostic file.
//!
//! ```text
//! Parsing ──ok──▶ WriteSuccess ──▶ Saved
//!    │
//!    └─syntax error─▶ WriteDiagnostic ──▶ ParseFailed
//!
//! any other failure (I/O, scalar top-level value) ──▶ Unexpected
//! ```
//!
//! Both files are written atomically: the full content is built in memory,
//! written to a temp file in the destination directory, then renamed over
//! the target. A failed write never leaves a truncated file behind.

use crate::error::{JsonSyntaxError, TimetableError};
use crate::pipeline::llm::RawModelResponse;
use crate::pipeline::normalize::extract_json_payload;
use crate::schedule::{validate_value, ScheduleWarning};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Destination files for one run.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// Pretty-printed JSON on success.
    pub success: PathBuf,
    /// Raw response text on parse failure.
    pub diagnostic: PathBuf,
}

/// Persistence switches.
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    /// Fall back to [`extract_json_payload`] if strict parsing fails.
    pub lenient_json: bool,
    /// Run the schedule validator on parsed output.
    pub validate: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            lenient_json: true,
            validate: true,
        }
    }
}

/// The extracted schedule was written.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSchedule {
    pub path: PathBuf,
    /// Number of top-level elements (sessions) in the written JSON.
    pub session_count: usize,
    /// Validator findings; the written JSON is never altered.
    pub warnings: Vec<ScheduleWarning>,
    /// True when the payload was only found by the tolerant extractor.
    pub recovered: bool,
}

/// The response was not JSON; raw text went to the diagnostic file.
#[derive(Debug, Clone, Serialize)]
pub struct ParseFailure {
    pub diagnostic_path: PathBuf,
    pub error: JsonSyntaxError,
    pub raw_response: String,
}

/// Something other than a syntax error went wrong.
#[derive(Debug)]
pub struct UnexpectedFailure {
    pub error: TimetableError,
    pub raw_response: String,
}

/// Terminal state of [`persist`].
#[derive(Debug)]
pub enum PersistOutcome {
    Saved(SavedSchedule),
    ParseFailed(ParseFailure),
    Unexpected(UnexpectedFailure),
}

impl PersistOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PersistOutcome::Saved(_))
    }

    /// Process exit status: 0, 6 (not JSON) or the error's own code.
    pub fn exit_code(&self) -> u8 {
        match self {
            PersistOutcome::Saved(_) => 0,
            PersistOutcome::ParseFailed(_) => 6,
            PersistOutcome::Unexpected(u) => u.error.exit_code(),
        }
    }

    /// Console report for the outcome, one entry per line, without styling.
    ///
    /// The first line is the headline; the CLI decorates it with a status mark.
    pub fn summary_lines(&self) -> Vec<String> {
        match self {
            PersistOutcome::Saved(saved) => {
                let mut lines = vec![
                    format!("Timetable saved to {}", saved.path.display()),
                    format!("Extracted {} class sessions.", saved.session_count),
                ];
                if saved.recovered {
                    lines.push("JSON payload recovered from surrounding text".into());
                }
                lines.extend(saved.warnings.iter().map(|w| format!("Warning: {w}")));
                lines
            }
            PersistOutcome::ParseFailed(failure) => vec![
                "Failed to parse response as JSON:".into(),
                "Raw response:".into(),
                failure.raw_response.clone(),
                String::new(),
                format!("JSON error: {}", failure.error.message),
                format!(
                    "Error position: line {}, column {}",
                    failure.error.line, failure.error.column
                ),
                format!(
                    "Raw response saved to {} for debugging",
                    failure.diagnostic_path.display()
                ),
            ],
            PersistOutcome::Unexpected(failure) => vec![
                "Unexpected error:".into(),
                format!("Error: {}", failure.error),
                "Raw response:".into(),
                failure.raw_response.clone(),
            ],
        }
    }

    /// Treat anything but [`PersistOutcome::Saved`] as an error.
    pub fn into_result(self) -> Result<SavedSchedule, TimetableError> {
        match self {
            PersistOutcome::Saved(s) => Ok(s),
            PersistOutcome::ParseFailed(f) => Err(TimetableError::ResponseParse(f.error)),
            PersistOutcome::Unexpected(u) => Err(u.error),
        }
    }
}

/// Machine-readable form used by `timetable2json --json`.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeReport<'a> {
    Saved(&'a SavedSchedule),
    ParseFailed(&'a ParseFailure),
    Unexpected {
        error: String,
        exit_code: u8,
        raw_response: &'a str,
    },
}

impl Serialize for PersistOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let report = match self {
            PersistOutcome::Saved(saved) => OutcomeReport::Saved(saved),
            PersistOutcome::ParseFailed(failure) => OutcomeReport::ParseFailed(failure),
            PersistOutcome::Unexpected(failure) => OutcomeReport::Unexpected {
                error: failure.error.to_string(),
                exit_code: failure.error.exit_code(),
                raw_response: &failure.raw_response,
            },
        };
        report.serialize(serializer)
    }
}

/// Parse `normalized` and write the outcome to disk.
///
/// `raw` is what the client returned; it is what lands in the diagnostic
/// file, unmodified.
pub fn persist(
    raw: &RawModelResponse,
    normalized: &str,
    paths: &OutputPaths,
    options: PersistOptions,
) -> PersistOutcome {
    let (value, recovered) = match parse_payload(normalized, options.lenient_json) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(
                "Response is not valid JSON: {} (line {}, column {})",
                error.message, error.line, error.column
            );
            return match write_atomic(&paths.diagnostic, raw.text.as_bytes()) {
                Ok(()) => {
                    info!("Raw response saved to {}", paths.diagnostic.display());
                    PersistOutcome::ParseFailed(ParseFailure {
                        diagnostic_path: paths.diagnostic.clone(),
                        error,
                        raw_response: raw.text.clone(),
                    })
                }
                Err(e) => unexpected(e, raw),
            };
        }
    };

    match write_success(&value, &paths.success) {
        Ok(session_count) => {
            let warnings = if options.validate {
                validate_value(&value)
            } else {
                Vec::new()
            };
            for w in &warnings {
                warn!("Schedule check: {}", w);
            }
            info!(
                "Timetable saved to {} ({} sessions)",
                paths.success.display(),
                session_count
            );
            PersistOutcome::Saved(SavedSchedule {
                path: paths.success.clone(),
                session_count,
                warnings,
                recovered,
            })
        }
        Err(e) => unexpected(e, raw),
    }
}

fn unexpected(error: TimetableError, raw: &RawModelResponse) -> PersistOutcome {
    PersistOutcome::Unexpected(UnexpectedFailure {
        error,
        raw_response: raw.text.clone(),
    })
}

/// Strict parse, then (optionally) the tolerant extractor.
///
/// If the fallback also fails, the strict error is returned since it points
/// into the text the operator will open.
fn parse_payload(normalized: &str, lenient: bool) -> Result<(Value, bool), JsonSyntaxError> {
    let strict_err = match serde_json::from_str::<Value>(normalized) {
        Ok(v) => return Ok((v, false)),
        Err(e) => JsonSyntaxError::from(&e),
    };

    if lenient {
        if let Some(payload) = extract_json_payload(normalized) {
            if let Ok(v) = serde_json::from_str::<Value>(payload) {
                warn!("Recovered JSON payload from surrounding text");
                return Ok((v, true));
            }
        }
    }
    Err(strict_err)
}

/// Serialize with 2-space indentation and write; returns the element count.
fn write_success(value: &Value, path: &Path) -> Result<usize, TimetableError> {
    let count = match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => {
            warn!("Top-level JSON is an object, expected an array of sessions");
            map.len()
        }
        other => {
            return Err(TimetableError::UnexpectedResponse(format!(
                "top-level JSON value is {}, expected an array of sessions",
                kind(other)
            )))
        }
    };

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TimetableError::Internal(format!("JSON serialisation: {e}")))?;
    write_atomic(path, json.as_bytes())?;
    debug!("Wrote {} bytes to {}", json.len(), path.display());
    Ok(count)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TimetableError> {
    let fail = |source: std::io::Error| TimetableError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

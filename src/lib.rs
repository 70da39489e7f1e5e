//! # edgequake-timetable
//!
//! Extract a weekly class schedule from a timetable image using a Vision
//! Language Model (VLM), and save it as JSON.
//!
//! The crate does no vision work itself. It sends the image with a carefully
//! structured prompt, cleans up the model's text answer, checks it, and writes
//! either the schedule or a diagnostic copy of the raw answer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! timetable.jpg
//!  │
//!  ├─ 1. Input      decode the image (fails fast if missing)
//!  ├─ 2. Encode     downscale + PNG → base64 ImageData
//!  ├─ 3. Prompt     slot whitelist, column-by-column method, output schema
//!  ├─ 4. VLM        one call to gemini-2.5-flash (or any edgequake-llm provider)
//!  ├─ 5. Normalize  strip ```json fences
//!  └─ 6. Persist    timetable.json, or raw_response.txt when not JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_timetable::{extract_timetable, ExtractionConfig, PersistOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .image_path("timetable.jpg")
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!
//!     match extract_timetable(&config).await? {
//!         PersistOutcome::Saved(s) => println!("Extracted {} class sessions.", s.session_count),
//!         PersistOutcome::ParseFailed(f) => eprintln!("not JSON: {}", f.error),
//!         PersistOutcome::Unexpected(u) => eprintln!("error: {}", u.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `timetable2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod schedule;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{JsonSyntaxError, TimetableError};
pub use extract::{extract_timetable, extract_timetable_sync, resolve_client, ExtractionRequest};
pub use pipeline::llm::{ExtractionClient, GeminiClient, ProviderClient, RawModelResponse};
pub use pipeline::persist::{ParseFailure, PersistOutcome, SavedSchedule, UnexpectedFailure};
pub use prompts::{build_prompt, default_prompt};
pub use schedule::{ClassSession, ClassType, Day, ScheduleWarning, TimeSlot, TIME_SLOTS};

/// Image payload type sent to [`ExtractionClient::extract`].
pub use edgequake_llm::ImageData;

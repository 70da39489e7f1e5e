//! Pipeline stages for timetable extraction.
//!
//! Each submodule implements exactly one step; the stages run strictly in
//! order, once per run.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ normalize ──▶ persist
//! (path)    (base64)   (VLM)   (fences)      (JSON / diagnostic)
//! ```
//!
//! 1. [`input`]     : decode the configured image, failing fast if missing
//! 2. [`encode`]    : downscale to the pixel cap, PNG-encode, base64-wrap
//! 3. [`llm`]       : one call to the vision model, bounded by a timeout
//! 4. [`normalize`] : strip ```` ```json ```` wrapping from the answer
//! 5. [`persist`]   : parse, validate, and write the success or diagnostic file

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod persist;

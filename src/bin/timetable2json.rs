//! CLI binary for edgequake-timetable.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_timetable::config::{DEFAULT_GEMINI_ENDPOINT, DEFAULT_MODEL};
use edgequake_timetable::{
    extract_timetable, ExtractionConfig, ExtractionRequest, PersistOutcome, TimetableError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract ./timetable.jpg into ./timetable.json
  export GEMINI_API_KEY=...
  timetable2json

  # Another image and output file
  timetable2json photos/sem2.png -o sem2.json

  # Use another vision provider through edgequake-llm
  timetable2json --provider openai --model gpt-4.1 timetable.jpg

  # Inspect the prompt that will be sent (no API key needed)
  timetable2json --print-prompt

  # Machine-readable outcome (saved / parse_failed / unexpected)
  timetable2json --json timetable.jpg > outcome.json

OUTPUT FILES:
  timetable.json     extracted sessions, 2-space indented JSON array
  raw_response.txt   the model's raw answer, written only when it is not JSON
  Both are overwritten on every run.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          API key for the direct Gemini backend
  TIMETABLE_IMAGE         Default image path
  TIMETABLE_OUTPUT        Default output path
  TIMETABLE_MODEL         Model ID (default gemini-2.5-flash)
  EDGEQUAKE_PROVIDER      Use an edgequake-llm provider (openai, anthropic, gemini, ollama)
  OPENAI_API_KEY, ANTHROPIC_API_KEY, …  read by edgequake-llm providers
  RUST_LOG                Override log filter

EXIT STATUS:
  0  timetable saved
  1  unexpected failure (output not writable, odd response shape)
  2  invalid command line
  3  image missing, unreadable, or not an image
  4  inference service error
  5  inference call timed out
  6  response was not valid JSON (raw text saved for debugging)
  7  invalid configuration
"#;

/// Extract a weekly class schedule from a timetable image using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "timetable2json",
    version,
    about = "Extract a weekly class schedule from a timetable image using a Vision LLM",
    long_about = "Send a timetable image to a vision model with a structured extraction prompt, \
then validate and save the returned class sessions as JSON. Uses Google Gemini directly by \
default; any edgequake-llm provider (OpenAI, Anthropic, Ollama, …) can be selected with --provider.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Timetable image (PNG or JPEG).
    #[arg(env = "TIMETABLE_IMAGE", default_value = "timetable.jpg")]
    image: PathBuf,

    /// Where to write the extracted JSON.
    #[arg(short, long, env = "TIMETABLE_OUTPUT", default_value = "timetable.json")]
    output: PathBuf,

    /// Where to write the raw response when it is not valid JSON.
    #[arg(long, env = "TIMETABLE_DIAGNOSTIC", default_value = "raw_response.txt")]
    diagnostic_output: PathBuf,

    /// API key for the direct Gemini backend.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision model ID.
    #[arg(long, env = "TIMETABLE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Use an edgequake-llm provider instead of the direct Gemini client.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "edgequake-llm provider name: openai, anthropic, gemini, azure, ollama, …\n\
          The provider reads its own API key variable (OPENAI_API_KEY, etc.)."
    )]
    provider: Option<String>,

    /// Base URL of the Gemini REST API.
    #[arg(long, env = "GEMINI_ENDPOINT", default_value = DEFAULT_GEMINI_ENDPOINT)]
    endpoint: String,

    /// Use streamGenerateContent (Gemini backend only).
    #[arg(long, env = "TIMETABLE_STREAM")]
    stream: bool,

    /// Sampling temperature (0.0–2.0). Service default when unset.
    #[arg(long, env = "TIMETABLE_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens. Service default when unset.
    #[arg(long, env = "TIMETABLE_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Inference call timeout in seconds.
    #[arg(long, env = "TIMETABLE_API_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: u64,

    /// Longest image edge sent to the model, in pixels.
    #[arg(long, env = "TIMETABLE_MAX_IMAGE_PIXELS", default_value_t = 3072,
          value_parser = clap::value_parser!(u32).range(64..))]
    max_image_pixels: u32,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "TIMETABLE_PROMPT")]
    prompt_file: Option<PathBuf>,

    /// Print the extraction prompt and exit.
    #[arg(long)]
    print_prompt: bool,

    /// Only accept the fence-stripped response; no payload recovery from prose.
    #[arg(long, env = "TIMETABLE_STRICT_JSON")]
    strict_json: bool,

    /// Skip the duplicate-slot and time-grid checks.
    #[arg(long, env = "TIMETABLE_NO_VALIDATE")]
    no_validate: bool,

    /// Print the outcome as JSON on stdout instead of the console report.
    #[arg(long, env = "TIMETABLE_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "TIMETABLE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TIMETABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TIMETABLE_QUIET")]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.print_prompt && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            let code = e
                .downcast_ref::<TimetableError>()
                .map(TimetableError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ExitCode> {
    let config = build_config(cli).await?;

    if cli.print_prompt {
        println!("{}", ExtractionRequest::from_config(&config).prompt.trim_end());
        return Ok(ExitCode::SUCCESS);
    }

    let spinner = show_progress.then(|| {
        spinner(&format!(
            "Reading {} with {}…",
            config.image_path.display(),
            config.provider_name.as_deref().unwrap_or(&config.model)
        ))
    });

    let result = extract_timetable(&config).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let outcome = result?;
    if cli.json {
        let json =
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
        println!("{json}");
    } else {
        report(&outcome, cli.quiet);
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Extracting");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Print the outcome. Failures are printed even with `--quiet`.
fn report(outcome: &PersistOutcome, quiet: bool) {
    if quiet && outcome.is_success() {
        return;
    }
    let lines = outcome.summary_lines();
    let Some((headline, rest)) = lines.split_first() else {
        return;
    };
    match outcome {
        PersistOutcome::Saved(_) => {
            eprintln!("{} {}", green("✔"), bold(headline));
            for line in rest {
                if line.starts_with("Warning: ") {
                    eprintln!("   {} {}", cyan("⚠"), line);
                } else if line.starts_with("Extracted ") {
                    eprintln!("{line}");
                } else {
                    eprintln!("   {}", dim(line));
                }
            }
        }
        PersistOutcome::ParseFailed(_) | PersistOutcome::Unexpected(_) => {
            eprintln!("{} {}", red("✘"), headline);
            for line in rest {
                eprintln!("{line}");
            }
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .image_path(&cli.image)
        .output_path(&cli.output)
        .diagnostic_path(&cli.diagnostic_output)
        .model(&cli.model)
        .endpoint(&cli.endpoint)
        .stream(cli.stream)
        .api_timeout_secs(cli.api_timeout)
        .max_image_pixels(cli.max_image_pixels)
        .lenient_json(!cli.strict_json)
        .validate(!cli.no_validate);

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }

    Ok(builder.build()?)
}

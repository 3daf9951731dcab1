//! CLI binary for esg-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs a batch and prints or writes the table.

use anyhow::{Context, Result};
use clap::Parser;
use esg_extract::{
    expand_inputs, summarize_companies, BatchOutput, ExtractionConfig, ExtractionProgressCallback,
    Extractor, InMemoryDecisionStore, ProgressCallback, RequiredField,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over documents, plus a log line per finished document and per
/// deep-search attempt. Documents finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} reports  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting ESG data from {total_documents} reports…"))
        ));
    }

    fn on_attempt_start(&self, filename: &str, attempt: usize, missing: &BTreeSet<RequiredField>) {
        if attempt == 0 {
            self.bar.set_message(filename.to_string());
            return;
        }
        let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
        self.bar.println(format!(
            "  {} Deep search {}  {}",
            cyan("↻"),
            filename,
            dim(&format!("attempt {}: {}", attempt + 1, labels.join(", "))),
        ));
    }

    fn on_document_complete(&self, filename: &str, company: &str, year: i32, attempts: usize) {
        self.bar.println(format!(
            "  {} {:<32} {} {}  {}",
            green("✓"),
            truncate(filename, 32),
            bold(company),
            year,
            dim(&format!("{attempts} attempt(s)")),
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, filename: &str, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<32} {}",
            red("✗"),
            truncate(filename, 32),
            red(&truncate(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} reports extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} reports extracted  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every report under ./reports/{Company}/{Year}/, table to stdout
  esg-extract reports/

  # Write the table and per-report JSON
  esg-extract reports/ --csv output/data.csv --output-dir output

  # Scan deeper: 5 pages per attempt, up to 6 attempts
  esg-extract --pages-per-scan 5 --max-retries 6 acme_2022.pdf

  # Machine-readable batch result (records, failures, stats, companies)
  esg-extract --json reports/ > batch.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Extract ESG metrics from PDF reports using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "esg-extract",
    version,
    about = "Extract ESG metrics from PDF sustainability reports using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files or directories to search for PDFs.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write per-report JSON under DIR/{Company}/{Company}_{Year}.json.
    #[arg(short, long, env = "ESG_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Write the aggregate table to this CSV file instead of stdout.
    #[arg(long, env = "ESG_CSV")]
    csv: Option<PathBuf>,

    /// Reports processed at the same time.
    #[arg(short, long, env = "ESG_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Ranked pages sent to the model per attempt.
    #[arg(long, env = "ESG_PAGES_PER_SCAN", default_value_t = 10)]
    pages_per_scan: usize,

    /// Attempts per report before giving up on missing fields.
    #[arg(long, env = "ESG_MAX_RETRIES", default_value_t = 3)]
    max_retries: usize,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "ESG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "ESG_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// PDF user password for encrypted reports.
    #[arg(long, env = "ESG_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "ESG_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the batch result as JSON instead of CSV.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ESG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; a malformed one is not.
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("Failed to load .env"),
    }

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inputs ───────────────────────────────────────────────────────────
    let paths = expand_inputs(&cli.inputs).context("Failed to collect input reports")?;
    if paths.is_empty() {
        anyhow::bail!("No PDF reports found in {:?}", cli.inputs);
    }

    // ── Build config and run ─────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let extractor = Extractor::from_config(&config).context("Failed to set up extraction")?;

    let output = extractor.batch(paths).await.context("Extraction failed")?;

    // ── Emit ─────────────────────────────────────────────────────────────
    if let Some(ref csv) = cli.csv {
        output
            .table
            .write_csv(csv)
            .await
            .with_context(|| format!("Failed to write {}", csv.display()))?;
    }

    if cli.json {
        println!("{}", batch_json(&output)?);
    } else if cli.csv.is_none() {
        io::stdout()
            .lock()
            .write_all(output.table.to_csv().as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet && !cli.json {
        let s = &output.stats;
        eprintln!(
            "   {} attempts ({} wasted)  /  {} pages scanned  —  {}ms total",
            dim(&s.total_attempts.to_string()),
            dim(&s.wasted_attempts.to_string()),
            dim(&s.pages_scanned.to_string()),
            s.total_duration_ms,
        );
        if let Some(ref csv) = cli.csv {
            eprintln!("   {} {}", green("→"), bold(&csv.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency)
        .pages_per_scan(cli.pages_per_scan)
        .max_retries(cli.max_retries)
        .dpi(cli.dpi)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn batch_json(output: &BatchOutput) -> Result<String> {
    let companies = summarize_companies(&output.table, &InMemoryDecisionStore::new());
    let value = serde_json::json!({
        "records": output.records,
        "failures": output.failures,
        "stats": output.stats,
        "companies": companies,
    });
    serde_json::to_string_pretty(&value).context("Failed to serialise output")
}

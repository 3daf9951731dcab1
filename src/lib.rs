//! # esg-extract
//!
//! Extract a fixed set of sustainability metrics (company, reporting year,
//! scope-1 and market-based scope-2 emissions, assurance, reduction targets,
//! action plan) from long PDF reports using a Vision Language Model.
//!
//! ## How it works
//!
//! Sending a 200-page annual report to a VLM is slow and expensive, and the
//! numbers usually sit on a handful of pages. Each document is therefore
//! scanned adaptively:
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Rank      score every page's text for metric keywords
//!  ├─ 2. Scan      send the next W best pages to the VLM
//!  ├─ 3. Merge     fill only the fields still empty
//!  ├─ 4. Check     all required fields present? stop : hint the gaps, go to 2
//!  ├─ 5. Validate  strict typing + unit normalisation (kt, Mt, million…)
//!  └─ 6. Output    per-document JSON + one sorted CSV row per report
//! ```
//!
//! Documents run concurrently under one admission gate
//! ([`ExtractionConfig::concurrency`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esg_extract::{discover_reports, extract_batch, ExtractionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::builder().output_dir("output").build()?;
//!     let paths = discover_reports(Path::new("reports"))?;
//!     let output = extract_batch(paths, &config).await?;
//!     print!("{}", output.table.to_csv());
//!     eprintln!("{} ok, {} failed", output.stats.succeeded, output.stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `esg-extract` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod decisions;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod portfolio;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{aggregate, AggregateRow, AggregateTable};
pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use decisions::{Decision, DecisionStore, InMemoryDecisionStore};
pub use document::Document;
pub use error::{DocumentError, EsgError, OracleError};
pub use extract::{
    extract_batch, extract_batch_sync, extract_batch_to_csv, extract_document,
    extract_document_with, extract_stream, DocumentStream, Extractor,
};
pub use output::{BatchOutput, BatchStats, DocumentFailure, DocumentOutcome};
pub use pipeline::input::{discover_reports, expand_inputs, validate_inputs};
pub use pipeline::merge::RequiredField;
pub use pipeline::oracle::{ExtractionOracle, LlmOracle, OracleRequest};
pub use pipeline::render::{PagePayload, PageRenderer, PdfiumRenderer};
pub use pipeline::validate::normalize;
pub use portfolio::{assess_risk, summarize_companies, CompanySummary, RiskLevel};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{EmissionValue, EsgReport, ReductionTarget, SourceMetadata};
pub use schema::{FieldValue, Record};

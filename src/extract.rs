//! Batch extraction: one iterative-deepening task per document.
//!
//! ```text
//! Document ─ rank ─┬─ attempt 0: pages[0..W)   ─ oracle ─ merge ─ missing? ─┐
//!                  ├─ attempt 1: pages[W..2W)  ─ oracle ─ merge ─ missing? ─┤
//!                  └─ …up to max_retries                                    │
//!                                                    validate ─ persist ◄───┘
//! ```
//!
//! Document tasks run concurrently. A shared [`Semaphore`] sized by
//! [`ExtractionConfig::concurrency`] admits at most that many ranking,
//! render or oracle calls at once; the permit is released between attempts
//! so other documents interleave. Within one document attempts are strictly
//! sequential because each attempt's hint depends on the previous result.

use crate::aggregate::aggregate;
use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::{DocumentError, EsgError};
use crate::output::{persist_report, BatchOutput, BatchStats, DocumentFailure, DocumentOutcome};
use crate::pipeline::input::validate_inputs;
use crate::pipeline::merge::{format_missing, merge, missing_fields, RequiredField};
use crate::pipeline::oracle::{instructions, ExtractionOracle, LlmOracle, OracleRequest};
use crate::pipeline::rank::{batch_slice, rank_document};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::validate::{resolve_identity, validate};
use crate::report::EsgReport;
use crate::schema::Record;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

/// A boxed stream of per-document outcomes, in completion order.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentOutcome> + Send>>;

/// Drives extraction for any number of documents.
///
/// Cloning is cheap and clones share the admission gate.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    renderer: Arc<dyn PageRenderer>,
    oracle: Arc<dyn ExtractionOracle>,
    limiter: Arc<Semaphore>,
}

/// Loop state for one document, threaded through the attempts.
struct ScanState {
    accumulator: Record,
    missing: BTreeSet<RequiredField>,
    attempts: usize,
    pages_scanned: usize,
    errors: Vec<DocumentError>,
}

impl Extractor {
    /// Build with explicit collaborators.
    pub fn new(
        config: ExtractionConfig,
        renderer: Arc<dyn PageRenderer>,
        oracle: Arc<dyn ExtractionOracle>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            renderer,
            oracle,
            limiter,
        }
    }

    /// pdfium renderer plus the LLM oracle resolved from `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, EsgError> {
        let oracle = LlmOracle::from_config(config)?;
        Ok(Self::new(
            config.clone(),
            Arc::new(PdfiumRenderer::from_config(config)),
            Arc::new(oracle),
        ))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        // The semaphore is never closed.
        self.limiter.acquire().await.ok()
    }

    /// Run one document from ranking to a persisted record.
    pub async fn process(&self, document: Document) -> DocumentOutcome {
        let start = Instant::now();
        info!("Processing {}", document.filename);

        let ranked = {
            let _permit = self.permit().await;
            rank_document(self.renderer.as_ref(), &document).await
        };

        if ranked.is_empty() {
            let err = DocumentError::NoUsablePages {
                filename: document.filename.clone(),
            };
            error!("{}", err);
            return self.finish(document, None, Err(err), None, start);
        }

        let state = self.scan(&document, &ranked).await;
        let (company, year) = resolve_identity(
            &state.accumulator,
            &document.fallback_company,
            document.fallback_year,
        );

        let report = match validate(
            &state.accumulator,
            &document.fallback_company,
            document.fallback_year,
            &document.filename,
        ) {
            Ok(report) => report,
            Err(e) => {
                let err = DocumentError::ValidationFailed {
                    company,
                    year,
                    detail: e.to_string(),
                };
                error!("Validation failed for {}: {}", document.filename, err);
                return self.finish(document, Some(state), Err(err), None, start);
            }
        };

        let json_path = match &self.config.output_dir {
            Some(root) => match persist_report(root, &report).await {
                Ok(path) => {
                    debug!("Saved {}", path.display());
                    Some(path)
                }
                Err(err) => {
                    error!("{} {}: {}", company, year, err);
                    return self.finish(document, Some(state), Err(err), None, start);
                }
            },
            None => None,
        };

        self.finish(document, Some(state), Ok(report), json_path, start)
    }

    /// The iterative-deepening loop. Never fails: wasted attempts are
    /// recorded and the best-effort accumulator is returned.
    async fn scan(&self, document: &Document, ranked: &[usize]) -> ScanState {
        let mut state = ScanState {
            accumulator: Record::new(),
            missing: RequiredField::all(),
            attempts: 0,
            pages_scanned: 0,
            errors: Vec::new(),
        };

        for attempt in 0..self.config.max_retries {
            let pages = batch_slice(ranked, attempt, self.config.pages_per_scan);
            if pages.is_empty() {
                debug!(
                    "{}: ranked pages exhausted after {} attempts",
                    document.filename, attempt
                );
                break;
            }

            state.attempts += 1;
            state.pages_scanned += pages.len();
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_attempt_start(&document.filename, attempt, &state.missing);
            }
            if attempt > 0 {
                info!(
                    "Deep search {} (attempt {}): missing {}",
                    document.filename,
                    attempt + 1,
                    format_missing(&state.missing)
                );
            }

            match self.attempt(document, pages, attempt, &state.missing).await {
                Ok(guess) => {
                    state.accumulator = merge(state.accumulator, Record::from(guess));
                    state.missing = missing_fields(&state.accumulator);
                }
                Err(err) => {
                    let (company, year) = resolve_identity(
                        &state.accumulator,
                        &document.fallback_company,
                        document.fallback_year,
                    );
                    warn!("{} {} ({}): {}", company, year, document.filename, err);
                    state.errors.push(err);
                }
            }

            if state.missing.is_empty() {
                debug!("{}: complete after {} attempts", document.filename, attempt + 1);
                break;
            }
        }

        state
    }

    /// One render + oracle round under an admission permit.
    async fn attempt(
        &self,
        document: &Document,
        pages: &[usize],
        attempt: usize,
        missing: &BTreeSet<RequiredField>,
    ) -> Result<Map<String, Value>, DocumentError> {
        let _permit = self.permit().await;
        let number = attempt + 1;

        let payloads = self
            .renderer
            .render(document, pages)
            .await
            .map_err(|e| DocumentError::RenderFailed {
                attempt: number,
                detail: e.to_string(),
            })?;
        if payloads.is_empty() {
            return Err(DocumentError::RenderFailed {
                attempt: number,
                detail: format!("none of pages {pages:?} rendered"),
            });
        }

        let request = OracleRequest {
            filename: &document.filename,
            instructions: instructions(&self.config),
            pages: &payloads,
            missing: (attempt > 0).then_some(missing),
            attempt,
        };
        let secs = self.config.api_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.oracle.extract(request)).await {
            Ok(Ok(map)) => Ok(map),
            Ok(Err(e)) => Err(DocumentError::OracleFailed {
                attempt: number,
                detail: e.to_string(),
            }),
            Err(_) => Err(DocumentError::OracleTimeout {
                attempt: number,
                secs,
            }),
        }
    }

    fn finish(
        &self,
        document: Document,
        state: Option<ScanState>,
        result: Result<EsgReport, DocumentError>,
        json_path: Option<PathBuf>,
        start: Instant,
    ) -> DocumentOutcome {
        let state = state.unwrap_or(ScanState {
            accumulator: Record::new(),
            missing: RequiredField::all(),
            attempts: 0,
            pages_scanned: 0,
            errors: Vec::new(),
        });

        if let Some(ref cb) = self.config.progress_callback {
            match &result {
                Ok(r) => cb.on_document_complete(
                    &document.filename,
                    &r.company_name,
                    r.reporting_year,
                    state.attempts,
                ),
                Err(e) => cb.on_document_failed(&document.filename, &e.to_string()),
            }
        }
        if let Ok(ref r) = result {
            info!(
                "Finished {}: {} {} in {} attempts",
                document.filename, r.company_name, r.reporting_year, state.attempts
            );
        }

        DocumentOutcome {
            document,
            attempts: state.attempts,
            pages_scanned: state.pages_scanned,
            attempt_errors: state.errors,
            result,
            json_path,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Process `paths` concurrently, yielding outcomes as documents finish.
    ///
    /// Inputs are not pre-checked; a missing file surfaces as a failed
    /// outcome. Use [`batch`](Self::batch) for the checked variant.
    pub fn stream(&self, paths: Vec<PathBuf>) -> DocumentStream {
        // Every document task is polled at once; the semaphore does the bounding.
        let width = paths.len().max(1);
        let this = self.clone();
        let s = stream::iter(paths.into_iter().map(move |path| {
            let this = this.clone();
            async move { this.process(Document::from_path(path)).await }
        }))
        .buffer_unordered(width);
        Box::pin(s)
    }

    /// Process a batch and aggregate the records.
    ///
    /// # Errors
    /// - [`EsgError::FileNotFound`] / [`EsgError::PermissionDenied`] if an
    ///   input is missing before the batch starts
    /// - [`EsgError::NoRecords`] if no document produced a record
    pub async fn batch(&self, paths: Vec<PathBuf>) -> Result<BatchOutput, EsgError> {
        let start = Instant::now();
        validate_inputs(&paths)?;
        let total = paths.len();
        info!("Starting batch of {} documents", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let outcomes: Vec<DocumentOutcome> = self.stream(paths).collect().await;

        let mut stats = BatchStats {
            total_documents: total,
            ..Default::default()
        };
        let mut records = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            stats.total_attempts += outcome.attempts;
            stats.wasted_attempts += outcome.attempt_errors.len();
            stats.pages_scanned += outcome.pages_scanned;
            match outcome.result {
                Ok(report) => records.push(report),
                Err(error) => failures.push(DocumentFailure {
                    path: outcome.document.path,
                    filename: outcome.document.filename,
                    error,
                }),
            }
        }
        stats.succeeded = records.len();
        stats.failed = failures.len();
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, records.len());
        }

        if records.is_empty() {
            let first_error = failures
                .first()
                .map(|f| format!("{}: {}", f.filename, f.error))
                .unwrap_or_else(|| "no documents given".to_string());
            return Err(EsgError::NoRecords { total, first_error });
        }

        info!(
            "Batch complete: {}/{} documents, {} attempts ({} wasted), {}ms",
            stats.succeeded, total, stats.total_attempts, stats.wasted_attempts, stats.total_duration_ms
        );

        Ok(BatchOutput {
            table: aggregate(&records)?,
            records,
            failures,
            stats,
        })
    }
}

// ── Convenience entry points ─────────────────────────────────────────────

/// Extract a single report.
///
/// # Errors
/// [`EsgError::NoRecords`] if the document yields no validated record.
pub async fn extract_document(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<EsgReport, EsgError> {
    let extractor = Extractor::from_config(config)?;
    extract_document_with(&extractor, path.as_ref()).await
}

/// [`extract_document`] with an existing [`Extractor`].
pub async fn extract_document_with(
    extractor: &Extractor,
    path: &Path,
) -> Result<EsgReport, EsgError> {
    validate_inputs(&[path.to_path_buf()])?;
    let outcome = extractor.process(Document::from_path(path)).await;
    outcome.result.map_err(|e| EsgError::NoRecords {
        total: 1,
        first_error: e.to_string(),
    })
}

/// Stream outcomes for `paths` in completion order.
pub async fn extract_stream(
    paths: Vec<PathBuf>,
    config: &ExtractionConfig,
) -> Result<DocumentStream, EsgError> {
    Ok(Extractor::from_config(config)?.stream(paths))
}

/// Extract every report in `paths` and aggregate the results.
pub async fn extract_batch(
    paths: Vec<PathBuf>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, EsgError> {
    Extractor::from_config(config)?.batch(paths).await
}

/// [`extract_batch`], then write the table to `csv_path` wholesale.
pub async fn extract_batch_to_csv(
    paths: Vec<PathBuf>,
    csv_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, EsgError> {
    let output = extract_batch(paths, config).await?;
    output.table.write_csv(csv_path.as_ref()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`extract_batch`].
pub fn extract_batch_sync(
    paths: Vec<PathBuf>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, EsgError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| EsgError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_batch(paths, config))
}

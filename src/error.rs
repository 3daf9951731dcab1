//! Error types for the esg-extract library.
//!
//! Three error types mirror the three places a run can go wrong:
//!
//! * [`EsgError`] — **Fatal**: the batch cannot proceed or produced nothing
//!   (missing input file, provider not configured, no document yielded a
//!   record). Returned as `Err(EsgError)` from the top-level `extract*`
//!   functions.
//!
//! * [`DocumentError`] — **Non-fatal**: one document, or one attempt on one
//!   document, failed. Attempt-level failures are absorbed by the scan loop;
//!   document-level failures are collected into
//!   [`crate::output::BatchOutput::failures`] while sibling documents carry on.
//!
//! * [`OracleError`] — what an [`crate::pipeline::oracle::ExtractionOracle`]
//!   reports back. Always distinguishable from a valid but empty result.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the esg-extract library.
#[derive(Debug, Error)]
pub enum EsgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Not a single document produced a validated record.
    #[error("None of the {total} documents produced a validated record.\nFirst error: {first_error}")]
    NoRecords { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
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

/// A non-fatal error for a single document or a single scan attempt.
///
/// `attempt` fields are 1-indexed, matching the log lines.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The ranker found no readable pages (corrupt or unreadable file).
    #[error("{filename}: no extractable pages")]
    NoUsablePages { filename: String },

    /// The batch's pages could not be rendered; the attempt is wasted.
    #[error("attempt {attempt}: rendering failed: {detail}")]
    RenderFailed { attempt: usize, detail: String },

    /// The oracle call failed or returned something unparseable.
    #[error("attempt {attempt}: extraction failed: {detail}")]
    OracleFailed { attempt: usize, detail: String },

    /// The oracle call exceeded its latency bound.
    #[error("attempt {attempt}: extraction timed out after {secs}s")]
    OracleTimeout { attempt: usize, secs: u64 },

    /// The final accumulator failed strict type coercion.
    #[error("{company} {year}: validation failed: {detail}")]
    ValidationFailed {
        company: String,
        year: i32,
        detail: String,
    },

    /// The validated record could not be written to disk.
    #[error("failed to persist '{path}': {detail}")]
    PersistFailed { path: PathBuf, detail: String },
}

/// Failure reported by an extraction oracle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// Network, provider or API failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be parsed into a JSON object.
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_records_display() {
        let e = EsgError::NoRecords {
            total: 4,
            first_error: "Acme 2022: validation failed".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("4 documents"), "got: {msg}");
        assert!(msg.contains("Acme 2022"));
    }

    #[test]
    fn timeout_display_names_attempt() {
        let e = DocumentError::OracleTimeout {
            attempt: 2,
            secs: 60,
        };
        assert!(e.to_string().contains("attempt 2"));
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn validation_display_carries_identity() {
        let e = DocumentError::ValidationFailed {
            company: "BetaCo".into(),
            year: 2023,
            detail: "targets[0].target_year: expected integer".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("BetaCo 2023"));
        assert!(msg.contains("target_year"));
    }

    #[test]
    fn document_error_is_serialisable() {
        let e = DocumentError::NoUsablePages {
            filename: "report.pdf".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("NoUsablePages"));
    }

    #[test]
    fn oracle_error_variants_differ() {
        assert_ne!(
            OracleError::Transport("x".into()),
            OracleError::Malformed("x".into())
        );
    }
}

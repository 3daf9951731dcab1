//! Results of a run and where they land on disk.

use crate::aggregate::AggregateTable;
use crate::document::Document;
use crate::error::{DocumentError, EsgError};
use crate::report::EsgReport;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything one document task produced.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document: Document,
    /// Attempts actually started (≤ `max_retries`).
    pub attempts: usize,
    /// Distinct pages shown to the oracle.
    pub pages_scanned: usize,
    /// Non-fatal failures absorbed by the scan loop, in attempt order.
    pub attempt_errors: Vec<DocumentError>,
    /// The validated record, or why the document was dropped.
    pub result: Result<EsgReport, DocumentError>,
    /// Where the record was written, when persistence is enabled.
    pub json_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A document that produced no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub path: PathBuf,
    pub filename: String,
    pub error: DocumentError,
}

/// Batch-level counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_attempts: usize,
    /// Attempts lost to render failures, oracle failures or timeouts.
    pub wasted_attempts: usize,
    pub pages_scanned: usize,
    pub total_duration_ms: u64,
}

/// Result of [`crate::extract::extract_batch`].
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// Sorted by company, then year.
    pub table: AggregateTable,
    /// Validated records in completion order.
    pub records: Vec<EsgReport>,
    pub failures: Vec<DocumentFailure>,
    pub stats: BatchStats,
}

// ── Persistence ──────────────────────────────────────────────────────────

/// Make a company name safe to use as one path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// `{root}/{company}/{company}_{year}.json`
pub fn report_path(root: &Path, company: &str, year: i32) -> PathBuf {
    let company = sanitize_component(company);
    root.join(&company).join(format!("{company}_{year}.json"))
}

/// Write `bytes` to `path` via a uniquely named temp file in the same
/// directory and a rename, so readers never see a half-written file and
/// concurrent writers of one path never share a temp file. Parent
/// directories are created.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::other(format!("write task panicked: {e}")))?
}

/// Persist one validated record as pretty JSON, replacing any earlier run's
/// file for the same company and year.
pub async fn persist_report(root: &Path, report: &EsgReport) -> Result<PathBuf, DocumentError> {
    let path = report_path(root, &report.company_name, report.reporting_year);
    let json = serde_json::to_vec_pretty(report).map_err(|e| DocumentError::PersistFailed {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    write_atomic(&path, &json)
        .await
        .map_err(|e| DocumentError::PersistFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    Ok(path)
}

/// Read back a record written by [`persist_report`].
pub async fn load_report(path: &Path) -> Result<EsgReport, EsgError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EsgError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => EsgError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => EsgError::Internal(format!("reading {}: {e}", path.display())),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| EsgError::Internal(format!("parsing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{EmissionValue, SourceMetadata};
    use chrono::Utc;

    fn report(company: &str, year: i32) -> EsgReport {
        EsgReport {
            company_name: company.into(),
            reporting_year: year,
            scope_1: EmissionValue {
                value: Some(10.0),
                unit: Some("kt".into()),
                normalized_value: Some(10_000.0),
            },
            scope_2_market: EmissionValue::default(),
            assurance_present: false,
            targets: vec![],
            action_plan_summary: None,
            meta_data: SourceMetadata {
                company_name: company.into(),
                reporting_year: year,
                filename: "r.pdf".into(),
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn separators_are_replaced() {
        assert_eq!(sanitize_component("A/B\\C"), "A_B_C");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("  Acme  "), "Acme");
    }

    #[test]
    fn path_layout() {
        let p = report_path(Path::new("out"), "Acme", 2022);
        assert_eq!(p, PathBuf::from("out/Acme/Acme_2022.json"));
    }

    #[tokio::test]
    async fn persisted_report_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let r = report("Acme", 2022);
        let path = persist_report(dir.path(), &r).await.unwrap();
        assert!(path.ends_with("Acme/Acme_2022.json"));
        assert_eq!(load_report(&path).await.unwrap(), r);
    }

    #[tokio::test]
    async fn reprocessing_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        persist_report(dir.path(), &report("Acme", 2022)).await.unwrap();
        let mut second = report("Acme", 2022);
        second.assurance_present = true;
        let path = persist_report(dir.path(), &second).await.unwrap();
        assert!(load_report(&path).await.unwrap().assurance_present);
        // No temp file left behind.
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_of_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        for _ in 0..50 {
            let a = tokio::spawn({
                let root = root.clone();
                async move { persist_report(&root, &report("Acme", 2022)).await }
            });
            let b = tokio::spawn({
                let root = root.clone();
                async move { persist_report(&root, &report("Acme", 2022)).await }
            });
            assert!(a.await.unwrap().is_ok());
            assert!(b.await.unwrap().is_ok());
        }
        let entries: Vec<_> = std::fs::read_dir(root.join("Acme")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_report(Path::new("/no/such/report.json")).await.unwrap_err();
        assert!(matches!(err, EsgError::FileNotFound { .. }));
    }
}

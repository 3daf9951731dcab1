//! Input discovery and pre-flight checks.
//!
//! A batch refuses to start if any named input is missing or unreadable.
//! Whether a readable file is actually a usable PDF is decided later, per
//! document, so one corrupt report never blocks the rest.

use crate::error::EsgError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Every `*.pdf` under `dir`, recursively, sorted by path.
///
/// Symlinks are not followed, so a link back to an ancestor cannot make one
/// report show up several times. Unreadable subdirectories are skipped.
pub fn discover_reports(dir: &Path) -> Result<Vec<PathBuf>, EsgError> {
    if !dir.exists() {
        return Err(EsgError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_pdf(entry.path()) => {
                found.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", e.path().unwrap_or(dir).display(), e),
        }
    }
    found.sort();
    debug!("Discovered {} reports under {}", found.len(), dir.display());
    Ok(found)
}

/// Expand command-line inputs: directories become their reports, files are
/// kept as given. Duplicates are dropped, first occurrence wins.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, EsgError> {
    let mut out: Vec<PathBuf> = Vec::new();
    for input in inputs {
        let batch = if input.is_dir() {
            discover_reports(input)?
        } else {
            vec![input.clone()]
        };
        for p in batch {
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    Ok(out)
}

/// Check that every input exists and can be opened for reading.
pub fn validate_inputs(paths: &[PathBuf]) -> Result<(), EsgError> {
    for path in paths {
        if !path.is_file() {
            return Err(EsgError::FileNotFound { path: path.clone() });
        }
        std::fs::File::open(path).map_err(|e| io_error(path, e))?;
    }
    Ok(())
}

fn io_error(path: &Path, e: std::io::Error) -> EsgError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => EsgError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => EsgError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => EsgError::Internal(format!("{}: {e}", path.display())),
    }
}

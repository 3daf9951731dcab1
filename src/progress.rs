//! Progress events for a batch run.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`]. Document
//! tasks run concurrently, so every method may be called from several tasks
//! at once; implementations guard their own state.

use crate::pipeline::merge::RequiredField;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Observer for extraction events. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any document task starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before each attempt's render + oracle call.
    ///
    /// * `attempt` — 0-based
    /// * `missing` — fields still missing going into this attempt (all of
    ///   them on attempt 0)
    fn on_attempt_start(&self, filename: &str, attempt: usize, missing: &BTreeSet<RequiredField>) {
        let _ = (filename, attempt, missing);
    }

    /// Called when a document produced a validated record.
    fn on_document_complete(&self, filename: &str, company: &str, year: i32, attempts: usize) {
        let _ = (filename, company, year, attempts);
    }

    /// Called when a document was dropped.
    fn on_document_failed(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }

    /// Called once after every document task has finished.
    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let _ = (total_documents, succeeded);
    }
}

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        attempts: AtomicUsize,
        deep: AtomicUsize,
        done: AtomicUsize,
        failed: AtomicUsize,
    }

    impl ExtractionProgressCallback for Counting {
        fn on_attempt_start(&self, _f: &str, attempt: usize, _m: &BTreeSet<RequiredField>) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt > 0 {
                self.deep.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_document_complete(&self, _f: &str, _c: &str, _y: i32, _a: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_failed(&self, _f: &str, _e: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_accepts_everything() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_attempt_start("a.pdf", 0, &RequiredField::all());
        cb.on_document_complete("a.pdf", "A", 2022, 1);
        cb.on_document_failed("b.pdf", "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb = Counting::default();
        cb.on_attempt_start("a.pdf", 0, &RequiredField::all());
        cb.on_attempt_start("a.pdf", 1, &[RequiredField::Scope2].into());
        cb.on_document_complete("a.pdf", "A", 2022, 2);
        cb.on_document_failed("b.pdf", "no usable pages");
        // Default method still callable on an overriding impl.
        cb.on_batch_complete(2, 1);

        assert_eq!(cb.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cb.deep.load(Ordering::SeqCst), 1);
        assert_eq!(cb.done.load(Ordering::SeqCst), 1);
        assert_eq!(cb.failed.load(Ordering::SeqCst), 1);
    }
}

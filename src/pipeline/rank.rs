//! Page relevance ranking.
//!
//! Sustainability reports run to hundreds of pages, and the figures we want
//! usually sit on a handful of them (a GHG table, an assurance statement, a
//! targets section). Rendering and sending pages is the dominant cost, so the
//! pages are ordered once by a cheap keyword score and then consumed in that
//! order, batch by batch.
//!
//! Ranking reorders; it never drops a page. Every page index appears exactly
//! once in the result.

use crate::document::Document;
use crate::pipeline::render::PageRenderer;
use tracing::{debug, error};

/// Terms whose presence (case-insensitive) makes a page more relevant.
/// Each term contributes at most one point per page.
pub const KEYWORDS: [&str; 12] = [
    "scope 1",
    "scope 2",
    "market-based",
    "tco2e",
    "ghg emissions",
    "assurance",
    "independent",
    "target",
    "2030",
    "net zero",
    "action plan",
    "strategy",
];

/// Phrases that usually head a data table. Any one of them adds
/// [`TABLE_MARKER_BONUS`] once.
pub const TABLE_MARKERS: [&str; 3] = ["performance data", "sustainability table", "esg data"];

pub const TABLE_MARKER_BONUS: u32 = 5;

/// Relevance score of one page's extracted text.
pub fn score_page(text: &str) -> u32 {
    let text = text.to_lowercase();
    let hits = KEYWORDS.iter().filter(|kw| text.contains(*kw)).count() as u32;
    if TABLE_MARKERS.iter().any(|m| text.contains(m)) {
        hits + TABLE_MARKER_BONUS
    } else {
        hits
    }
}

/// Order page indices by descending score; ties keep physical page order.
pub fn rank_texts<S: AsRef<str>>(pages: &[S]) -> Vec<usize> {
    let mut scored: Vec<(usize, u32)> = pages
        .iter()
        .enumerate()
        .map(|(idx, text)| (idx, score_page(text.as_ref())))
        .collect();
    // `sort_by` is stable, so equal scores stay in page order.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(idx, _)| idx).collect()
}

/// Rank every page of `document`.
///
/// An unreadable document yields an empty list rather than an error; the
/// caller treats that as "no usable pages" and skips the document.
pub async fn rank_document(renderer: &dyn PageRenderer, document: &Document) -> Vec<usize> {
    match renderer.page_texts(document).await {
        Ok(texts) => {
            let ranked = rank_texts(&texts);
            debug!(
                "{}: ranked {} pages, top 5 {:?}",
                document.filename,
                ranked.len(),
                &ranked[..ranked.len().min(5)]
            );
            ranked
        }
        Err(e) => {
            error!("PDF ranking error {}: {}", document.filename, e);
            Vec::new()
        }
    }
}

/// The `batch`-th non-overlapping slice of width `width` of the ranked list.
///
/// Returns an empty slice once the ranked pages are exhausted.
pub fn batch_slice(ranked: &[usize], batch: usize, width: usize) -> &[usize] {
    let start = batch.saturating_mul(width).min(ranked.len());
    let end = start.saturating_add(width).min(ranked.len());
    &ranked[start..end]
}

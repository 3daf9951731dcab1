//! Stages of per-document extraction.
//!
//! ```text
//! input ──▶ rank ──▶ render ──▶ encode ──▶ oracle ──▶ parse ──▶ merge ──▶ validate
//!           (text)   (pdfium)   (base64)   (VLM)      (JSON)    (fill)    (typed)
//!                       ▲                                          │
//!                       └────────── next batch while missing ──────┘
//! ```
//!
//! 1. [`input`]    — discover reports and pre-flight the input list
//! 2. [`rank`]     — order pages by metric-keyword density
//! 3. [`render`]   — rasterise a batch of ranked pages in `spawn_blocking`
//! 4. [`encode`]   — PNG + base64 for the multimodal request
//! 5. [`oracle`]   — one vision-model call per attempt, steered by the
//!    missing-field set
//! 6. [`parse`]    — recover the JSON object from the model's reply
//! 7. [`merge`]    — fill-only merge and the required-field check
//! 8. [`validate`] — strict coercion into [`crate::report::EsgReport`] plus
//!    unit normalisation
//!
//! The loop itself lives in [`crate::extract`].

pub mod encode;
pub mod input;
pub mod merge;
pub mod oracle;
pub mod parse;
pub mod rank;
pub mod render;
pub mod validate;

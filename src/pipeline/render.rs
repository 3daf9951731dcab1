//! PDF access: page text for ranking, page images for the oracle.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so a
//! slow render of one report never stalls the scan loops of the others.
//!
//! ## Why cap pixels, not DPI?
//!
//! Report pages range from A4 to fold-out A3 tables. `max_rendered_pixels`
//! caps the longest edge regardless of physical size, keeping memory bounded
//! and the image inside the vision model's useful resolution.

use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::EsgError;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One rendered page, ready to attach to an oracle request.
#[derive(Debug, Clone)]
pub struct PagePayload {
    /// 0-based physical page index.
    pub page_index: usize,
    pub image: ImageData,
}

/// Access to a document's pages.
///
/// The production implementation is [`PdfiumRenderer`]; tests substitute an
/// in-memory source.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Extracted text of every page, in physical order.
    async fn page_texts(&self, document: &Document) -> Result<Vec<String>, EsgError>;

    /// Render the requested pages, one payload per index.
    ///
    /// Indices past the end of the document are skipped, not reported.
    async fn render(
        &self,
        document: &Document,
        page_indices: &[usize],
    ) -> Result<Vec<PagePayload>, EsgError>;
}

/// [`PageRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            password,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.dpi, config.max_rendered_pixels, config.password.clone())
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn page_texts(&self, document: &Document) -> Result<Vec<String>, EsgError> {
        let path = document.path.clone();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || page_texts_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| EsgError::Internal(format!("Text extraction task panicked: {}", e)))?
    }

    async fn render(
        &self,
        document: &Document,
        page_indices: &[usize],
    ) -> Result<Vec<PagePayload>, EsgError> {
        let path = document.path.clone();
        let password = self.password.clone();
        let dpi = self.dpi;
        let max_pixels = self.max_rendered_pixels;
        let indices = page_indices.to_vec();

        let rendered = tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, dpi, max_pixels, password.as_deref(), &indices)
        })
        .await
        .map_err(|e| EsgError::Internal(format!("Render task panicked: {}", e)))??;

        let payloads = rendered
            .iter()
            .filter_map(|(idx, img)| match encode::encode_page(img) {
                Ok(image) => Some(PagePayload {
                    page_index: *idx,
                    image,
                }),
                Err(e) => {
                    warn!("Failed to encode page {}: {}", idx + 1, e);
                    None
                }
            })
            .collect();

        Ok(payloads)
    }
}

/// Verify the `%PDF` magic bytes before handing the file to pdfium.
fn check_magic(pdf_path: &Path) -> Result<(), EsgError> {
    match std::fs::File::open(pdf_path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(EsgError::NotAPdf {
                    path: pdf_path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(EsgError::PermissionDenied {
                path: pdf_path.to_path_buf(),
            })
        }
        Err(_) => Err(EsgError::FileNotFound {
            path: pdf_path.to_path_buf(),
        }),
    }
}

/// Map a pdfium load error to the matching [`EsgError`].
fn load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> EsgError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            EsgError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            EsgError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        EsgError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn page_texts_blocking(pdf_path: &Path, password: Option<&str>) -> Result<Vec<String>, EsgError> {
    check_magic(pdf_path)?;
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let mut texts = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        // A page whose text layer cannot be read still occupies its slot.
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                debug!("Page {}: no text layer ({:?})", idx + 1, e);
                String::new()
            }
        };
        texts.push(text);
    }
    Ok(texts)
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, EsgError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;

    // PDF user space is 72 units per inch.
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| EsgError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| EsgError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}

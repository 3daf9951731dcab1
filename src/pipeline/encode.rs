//! Page image encoding for multimodal requests.
//!
//! Rendered pages travel to the oracle as base64 PNG data-URIs. PNG, not
//! JPEG: emissions tables are small digits on flat backgrounds.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode a rendered page and wrap it for the vision API.
///
/// Sent with `detail: "high"` so the model tiles the page.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

    let payload = STANDARD.encode(&png);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        payload.len()
    );

    Ok(ImageData::new(payload, "image/png").with_detail("high"))
}

//! Image encoding: rendered page → PNG bytes → base64 payload.
//!
//! PNG is lossless, which keeps small print crisp for the vision model.
//! The encoded page is kept as raw PNG bytes so a rasterizer fake can
//! produce one without touching the `image` crate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type of every page image sent to a model.
pub const PAGE_MIME_TYPE: &str = "image/png";

/// A rasterised page, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    png: Vec<u8>,
}

impl PageImage {
    /// Wrap already-encoded PNG bytes.
    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    /// Base64 (standard alphabet, padded) of the PNG bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// Attachment for `edgequake-llm` vision messages.
    ///
    /// `detail: "high"` keeps fine print visible to tiling models.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), PAGE_MIME_TYPE).with_detail("high")
    }
}

/// Encode a rendered page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(PageImage::from_png(buf))
}

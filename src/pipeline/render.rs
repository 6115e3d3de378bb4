//! Page Rasterizer: open a PDF and render single pages via pdfium.
//!
//! pdfium is a blocking C library, so every call is moved onto
//! `tokio::task::spawn_blocking`. Each render binds the library and
//! reopens the document; a job touches one page at a time and the
//! reopen is cheap next to a model round-trip.
//!
//! `max_rendered_pixels` caps the longest edge regardless of DPI so an
//! oversized page cannot exhaust memory.

use crate::config::ConversionConfig;
use crate::error::Pdf2McqError;
use crate::pipeline::encode::{encode_png, PageImage};
use crate::pipeline::input::resolve_document;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the directory that holds libpdfium.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// An opened document: where it lives and how many pages it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub path: PathBuf,
    pub page_count: usize,
}

/// A single page failed to render. Counted as a failed attempt.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Renders document pages to images.
///
/// `open` failures are fatal for a job; `render_page` failures are retried.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn open(&self, path: &Path) -> Result<DocumentHandle, Pdf2McqError>;

    /// Render the page at zero-based `index` at `dpi`.
    async fn render_page(
        &self,
        doc: &DocumentHandle,
        index: usize,
        dpi: u32,
    ) -> Result<PageImage, RenderError>;
}

/// Page count and a few metadata fields, read without rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_dir: Option<PathBuf>,
    password: Option<String>,
    max_pixels: Option<u32>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library directory, password and pixel cap taken from `config`.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new()
            .with_lib_dir(config.pdfium_lib_path.clone())
            .with_password(config.password.clone())
            .with_max_pixels(config.max_rendered_pixels)
    }

    /// Directory containing libpdfium. Falls back to `PDFIUM_LIB_PATH`,
    /// then the working directory, then the system library.
    pub fn with_lib_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.lib_dir = dir;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_max_pixels(mut self, px: u32) -> Self {
        self.max_pixels = Some(px);
        self
    }

    /// Read page count and metadata.
    pub async fn inspect(&self, path: &Path) -> Result<DocumentInfo, Pdf2McqError> {
        let this = self.clone();
        let path = resolve_document(path)?;
        tokio::task::spawn_blocking(move || this.inspect_blocking(&path))
            .await
            .map_err(|e| Pdf2McqError::Internal(format!("Inspect task panicked: {e}")))?
    }

    fn inspect_blocking(&self, path: &Path) -> Result<DocumentInfo, Pdf2McqError> {
        let pdfium = bind(self.lib_dir.as_deref())?;
        let document = load(&pdfium, path, self.password.as_deref())?;
        let metadata = document.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().trim().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        Ok(DocumentInfo {
            page_count: document.pages().len() as usize,
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
        })
    }

    fn render_blocking(
        &self,
        path: &Path,
        index: usize,
        dpi: u32,
    ) -> Result<PageImage, RenderError> {
        let pdfium = bind(self.lib_dir.as_deref()).map_err(|e| RenderError(e.to_string()))?;
        let document = load(&pdfium, path, self.password.as_deref())
            .map_err(|e| RenderError(e.to_string()))?;

        let page = document
            .pages()
            .get(page_index(index)?)
            .map_err(|e| RenderError(format!("page {}: {:?}", index + 1, e)))?;

        let mut render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        if let Some(px) = self.max_pixels {
            render_config = render_config
                .set_maximum_width(px as i32)
                .set_maximum_height(px as i32);
        }

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError(format!("page {}: {:?}", index + 1, e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );

        encode_png(&image).map_err(|e| RenderError(format!("PNG encoding failed: {e}")))
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn open(&self, path: &Path) -> Result<DocumentHandle, Pdf2McqError> {
        let info = self.inspect(path).await?;
        info!("PDF loaded: {} pages", info.page_count);
        Ok(DocumentHandle {
            path: path.to_path_buf(),
            page_count: info.page_count,
        })
    }

    async fn render_page(
        &self,
        doc: &DocumentHandle,
        index: usize,
        dpi: u32,
    ) -> Result<PageImage, RenderError> {
        let this = self.clone();
        let path = doc.path.clone();
        tokio::task::spawn_blocking(move || this.render_blocking(&path, index, dpi))
            .await
            .map_err(|e| RenderError(format!("render task panicked: {e}")))?
    }
}

/// pdfium addresses pages with a `u16`.
fn page_index(index: usize) -> Result<u16, RenderError> {
    u16::try_from(index)
        .map_err(|_| RenderError(format!("page {} is beyond pdfium's page limit", index + 1)))
}

fn bind(lib_dir: Option<&Path>) -> Result<Pdfium, Pdf2McqError> {
    let env_dir = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);
    let bindings = match lib_dir.map(Path::to_path_buf).or(env_dir) {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2McqError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn load<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2McqError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.contains("Password") || detail.contains("password") {
            if password.is_some() {
                Pdf2McqError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                Pdf2McqError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            Pdf2McqError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}

//! Error types for the pdf2mcq library.
//!
//! Three error types map onto three failure scopes:
//!
//! * [`Pdf2McqError`]: **fatal**, the job cannot proceed at all (bad input
//!   file, unreadable instruction, page range outside the document, provider
//!   not configured). Returned as `Err(Pdf2McqError)` from top-level calls.
//!
//! * [`PageError`]: **one failed attempt** at one page (render glitch,
//!   dropped stream, quota error). The conversion driver retries these and,
//!   once the attempt budget is spent, escalates the page to the operator.
//!
//! * [`ModelError`]: raised by a model client. The driver wraps it into
//!   [`PageError::ModelFailed`] with the page ordinal attached.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2mcq library.
#[derive(Debug, Error)]
pub enum Pdf2McqError {
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

    /// The requested range is malformed (start < 1 or start > end).
    #[error("Invalid page range '{input}': {reason}")]
    InvalidPageRange { input: String, reason: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Instruction / provider errors ─────────────────────────────────────
    /// The transcription instruction file could not be read.
    #[error("Failed to read instruction file '{path}': {source}")]
    InstructionUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured model backend cannot be used (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point PDFIUM_LIB_PATH at the\n\
directory containing it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Question pipeline errors ──────────────────────────────────────────
    /// A configuration profile store could not be read or written.
    #[error("Profile store '{path}': {detail}")]
    ProfileStore { path: PathBuf, detail: String },

    /// A question bank or module list could not be used.
    #[error("Question bank error: {0}")]
    QuestionBank(String),

    /// The question-generation request failed or returned unusable output.
    #[error("Question generation failed: {0}")]
    Generation(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
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

/// One failed attempt at converting a page.
///
/// `page` is the 1-based ordinal within the requested range, not the
/// absolute page number in the document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The model call failed before or during streaming.
    #[error("Page {page}: model call failed: {detail}")]
    ModelFailed { page: usize, detail: String },
}

impl PageError {
    /// Ordinal of the page this attempt belonged to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::ModelFailed { page, .. } => *page,
        }
    }
}

/// Errors raised by model clients (transport, quota, content).
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The request never reached the service or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("could not parse response: {0}")]
    Parse(String),

    /// The service refused to answer (safety block, recitation, ...).
    #[error("response blocked: {0}")]
    Blocked(String),

    /// The service returned no usable text.
    #[error("empty response")]
    EmptyResponse,
}

//! # pdf2mcq
//!
//! Transcribe scanned PDF pages to Markdown with a multimodal model, then
//! build multiple-choice questions from the notes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF page range
//!  │
//!  ├─ 1. Render     rasterise one page via pdfium (spawn_blocking)
//!  ├─ 2. Transcribe stream the page image to the model, fragment by fragment
//!  ├─ 3. Retry      3 attempts per page, fixed 2 s backoff
//!  ├─ 4. Escalate   ask the operator: retry / skip / abort
//!  └─ 5. Assemble   `--- Page N ---` blocks, trimmed Markdown
//!        │
//!        └─ questions: bank references + style guide → prompt → JSON → files
//! ```
//!
//! The conversion driver runs on its own task and reports through
//! [`ConversionEvent`]s; a foreground controller consumes them, answers
//! escalations, and may stop the job at any time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2mcq::{
//!     build_client, ConversionConfig, ConversionDriver, ConversionRequest, Decision,
//!     FixedDecision, ModelSettings, PageRange, PdfiumRasterizer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GEMINI_API_KEY must be set.
//!     let driver = ConversionDriver::new(
//!         Arc::new(PdfiumRasterizer::new()),
//!         build_client(&ModelSettings::default())?,
//!         ConversionConfig::default(),
//!     );
//!     let job = driver.spawn(ConversionRequest::new("notes.pdf", "45-49".parse()?));
//!     let outcome = job.observe(&mut FixedDecision(Decision::Skip)).await?;
//!     if let Some(markdown) = outcome.markdown() {
//!         println!("{markdown}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2mcq` binary (clap, dialoguer, indicatif, tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifacts;
pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod profiles;
pub mod progress;
pub mod prompts;
pub mod questions;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifacts::{ArtifactLayout, RunRecord};
pub use batch::{run_batch, BatchOutcome, BatchReport, BatchSettings};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, InstructionSource, ModelBackend, ModelSettings,
    PageRange,
};
pub use driver::{
    CancelFlag, ConversionDriver, ConversionJob, ConversionRequest, Decision, EscalationRequest,
    StopHandle,
};
pub use error::{ModelError, PageError, Pdf2McqError};
pub use output::{ConversionOutcome, ConversionOutput, ConversionStats, PageBlock};
pub use pipeline::encode::PageImage;
pub use pipeline::gemini::GeminiClient;
pub use pipeline::llm::{build_client, build_text_model, FragmentStream, ModelClient, TextModel};
pub use pipeline::render::{DocumentHandle, DocumentInfo, PdfiumRasterizer, Rasterizer, RenderError};
pub use profiles::{Profile, ProfileStore};
pub use progress::{ConversionEvent, ConversionObserver, EscalationInfo, FixedDecision};
pub use questions::QuestionBank;

/// Page count and metadata of a PDF, without a model.
pub async fn inspect(path: impl AsRef<std::path::Path>) -> Result<DocumentInfo, Pdf2McqError> {
    PdfiumRasterizer::new().inspect(path.as_ref()).await
}

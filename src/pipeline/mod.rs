//! Collaborators of the conversion driver.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm / gemini
//! (path)    (pdfium)   (PNG)      (model client)
//! ```
//!
//! 1. [`input`]: validate the document path and PDF magic bytes
//! 2. [`render`]: the [`render::Rasterizer`] seam and its pdfium
//!    implementation; runs in `spawn_blocking`
//! 3. [`encode`]: PNG-encode a rendered page; base64 for request bodies
//! 4. [`llm`]: the [`llm::ModelClient`] / [`llm::TextModel`] seams and
//!    the `edgequake-llm` implementation
//! 5. [`gemini`]: streaming Gemini REST implementation

pub mod encode;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod render;

//! Configuration types for page conversion and question generation.
//!
//! Conversion behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. Model selection lives in
//! [`ModelSettings`] so the same settings can drive both the page
//! transcription client and the question-generation client.

use crate::error::Pdf2McqError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for a page-range conversion.
///
/// # Example
/// ```rust
/// use pdf2mcq::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .include_page_markers(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 200.
    ///
    /// Scanned notes are often photographed or scanned at low contrast; 200 DPI
    /// keeps small print legible without pushing images past upload limits.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// A safety cap independent of DPI so an oversized page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Attempts per page before the page is escalated to the operator. Default: 3.
    pub max_attempts: u32,

    /// Fixed delay between attempts on the same page, in milliseconds. Default: 2000.
    pub retry_delay_ms: u64,

    /// Prefix each page block with `--- Page N ---`. Default: true.
    pub include_page_markers: bool,

    /// Where the transcription instruction comes from. Default: built-in.
    pub instruction: InstructionSource,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory containing the pdfium shared library. Default: system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            max_attempts: 3,
            retry_delay_ms: 2000,
            include_page_markers: true,
            instruction: InstructionSource::default(),
            password: None,
            pdfium_lib_path: None,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn include_page_markers(mut self, v: bool) -> Self {
        self.config.include_page_markers = v;
        self
    }

    pub fn instruction(mut self, source: InstructionSource) -> Self {
        self.config.instruction = source;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2McqError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2McqError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_attempts == 0 {
            return Err(Pdf2McqError::InvalidConfig(
                "At least one attempt per page is required".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Source of the fixed instruction sent with every page image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InstructionSource {
    /// Use [`crate::prompts::DEFAULT_TRANSCRIPTION_INSTRUCTION`].
    #[default]
    Default,
    /// Use this text verbatim.
    Inline(String),
    /// Read the instruction from a file when the job starts.
    /// A missing or unreadable file is fatal for the job.
    File(PathBuf),
}

impl InstructionSource {
    /// Resolve the instruction text.
    pub async fn load(&self) -> Result<String, Pdf2McqError> {
        match self {
            InstructionSource::Default => {
                Ok(crate::prompts::DEFAULT_TRANSCRIPTION_INSTRUCTION.to_string())
            }
            InstructionSource::Inline(text) => Ok(text.clone()),
            InstructionSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Pdf2McqError::InstructionUnreadable {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

// ── Page range ───────────────────────────────────────────────────────────

/// A contiguous, 1-based, inclusive page range.
///
/// Ordinals (1, 2, 3, ...) count pages *within* the range; absolute page
/// numbers count pages within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    start: usize,
    end: usize,
}

impl PageRange {
    /// Create a range, rejecting `start < 1` and `start > end`.
    pub fn new(start: usize, end: usize) -> Result<Self, Pdf2McqError> {
        if start < 1 {
            return Err(Pdf2McqError::InvalidPageRange {
                input: format!("{start}-{end}"),
                reason: format!("pages are 1-indexed, minimum is 1 (got {start})"),
            });
        }
        if start > end {
            return Err(Pdf2McqError::InvalidPageRange {
                input: format!("{start}-{end}"),
                reason: "start page must be less than or equal to end page".into(),
            });
        }
        Ok(Self { start, end })
    }

    /// First page, 1-based.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last page, 1-based, inclusive.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of pages in the range.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false: a valid range holds at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check the range against the document's page count.
    pub fn validate(&self, page_count: usize) -> Result<(), Pdf2McqError> {
        if self.end > page_count {
            return Err(Pdf2McqError::PageOutOfRange {
                page: self.end,
                total: page_count,
            });
        }
        Ok(())
    }

    /// Zero-based document indices covered by the range, in ascending order.
    pub fn indices(&self) -> std::ops::Range<usize> {
        (self.start - 1)..self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PageRange {
    type Err = Pdf2McqError;

    /// Parse `"45-49"` or a single page `"7"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| Pdf2McqError::InvalidPageRange {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some((start, end)) = s.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .map_err(|_| invalid("invalid start page"))?;
            let end: usize = end.trim().parse().map_err(|_| invalid("invalid end page"))?;
            return PageRange::new(start, end);
        }

        let page: usize = s.parse().map_err(|_| invalid("invalid page number"))?;
        PageRange::new(page, page)
    }
}

// ── Model settings ───────────────────────────────────────────────────────

/// Which client implementation talks to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Google Gemini REST API with server-sent-event streaming. (default)
    #[default]
    Gemini,
    /// Any provider known to `edgequake-llm`; one fragment per page.
    Llm,
}

/// Model selection shared by the transcription and question clients.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Client implementation. Default: [`ModelBackend::Gemini`].
    pub backend: ModelBackend,
    /// Model identifier. Default: `gemini-2.5-pro`.
    pub model: String,
    /// Provider name for the `llm` backend (e.g. "openai"). Auto-detected if None.
    pub provider_name: Option<String>,
    /// Gemini API key. Read from `GEMINI_API_KEY` when None.
    pub api_key: Option<String>,
    /// Override for the Gemini REST base URL.
    pub base_url: Option<String>,
    /// Sampling temperature. Default: none (service default).
    pub temperature: Option<f32>,
    /// Output token cap per request. Default: none (service default).
    pub max_tokens: Option<usize>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Default transcription model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Map the short `pro` / `flash` choice onto a Gemini model id.
///
/// Anything else is taken to be a full model id already.
pub fn gemini_model_for_choice(choice: &str) -> String {
    match choice.trim() {
        "pro" | "flash" => format!("gemini-2.5-{}", choice.trim()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_driver_contract() {
        let c = ConversionConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_delay_ms, 2000);
        assert!(c.include_page_markers);
    }

    #[test]
    fn builder_rejects_bad_dpi_and_zero_attempts() {
        assert!(ConversionConfig::builder().dpi(50).build().is_err());
        assert!(ConversionConfig::builder().max_attempts(0).build().is_err());
        assert!(ConversionConfig::builder().dpi(300).build().is_ok());
    }

    #[test]
    fn page_range_parsing() {
        let r: PageRange = "45-49".parse().unwrap();
        assert_eq!((r.start(), r.end(), r.len()), (45, 49, 5));
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![44, 45, 46, 47, 48]);

        let single: PageRange = " 7 ".parse().unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single.to_string(), "7-7");

        assert!("5-3".parse::<PageRange>().is_err());
        assert!("0-3".parse::<PageRange>().is_err());
        assert!("a-3".parse::<PageRange>().is_err());
    }

    #[test]
    fn page_range_validation_against_document() {
        let r = PageRange::new(3, 5).unwrap();
        assert!(r.validate(5).is_ok());
        match r.validate(4) {
            Err(Pdf2McqError::PageOutOfRange { page, total }) => {
                assert_eq!((page, total), (5, 4));
            }
            other => panic!("expected PageOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn model_choice_mapping() {
        assert_eq!(gemini_model_for_choice("pro"), "gemini-2.5-pro");
        assert_eq!(gemini_model_for_choice("flash"), "gemini-2.5-flash");
        assert_eq!(gemini_model_for_choice("gpt-4.1"), "gpt-4.1");
    }

    #[tokio::test]
    async fn instruction_file_missing_is_fatal() {
        let src = InstructionSource::File(PathBuf::from("/definitely/not/here.txt"));
        assert!(matches!(
            src.load().await,
            Err(Pdf2McqError::InstructionUnreadable { .. })
        ));
        let inline = InstructionSource::Inline("read the page".into());
        assert_eq!(inline.load().await.unwrap(), "read the page");
    }
}

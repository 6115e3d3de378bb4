//! In-process fakes for the rasterizer and the model client.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use pdf2mcq::{
    ConversionConfig, ConversionDriver, DocumentHandle, FragmentStream, InstructionSource,
    ModelClient, ModelError, PageImage, Pdf2McqError, Rasterizer, RenderError,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Instruction every test driver sends.
pub const INSTRUCTION: &str = "Transcribe this page.";

/// Rasterizer over an imaginary document. The rendered "PNG" is a single
/// byte holding the zero-based page index, which the model fake reads back.
pub struct FakeRasterizer {
    page_count: usize,
    fail_open: bool,
    render_failures: Mutex<HashMap<usize, u32>>,
    rendered: Mutex<Vec<usize>>,
}

impl FakeRasterizer {
    pub fn new(page_count: usize) -> Arc<Self> {
        Arc::new(Self::build(page_count, false))
    }

    pub fn unopenable() -> Arc<Self> {
        Arc::new(Self::build(0, true))
    }

    /// Fail the first `times` renders of page `index`.
    pub fn with_render_failures(page_count: usize, index: usize, times: u32) -> Arc<Self> {
        let fake = Self::build(page_count, false);
        fake.render_failures.lock().unwrap().insert(index, times);
        Arc::new(fake)
    }

    fn build(page_count: usize, fail_open: bool) -> Self {
        Self {
            page_count,
            fail_open,
            render_failures: Mutex::new(HashMap::new()),
            rendered: Mutex::new(Vec::new()),
        }
    }

    /// Zero-based indices of every successful render, in order.
    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn open(&self, path: &Path) -> Result<DocumentHandle, Pdf2McqError> {
        if self.fail_open {
            return Err(Pdf2McqError::CorruptPdf {
                path: path.to_path_buf(),
                detail: "xref table missing".into(),
            });
        }
        Ok(DocumentHandle {
            path: path.to_path_buf(),
            page_count: self.page_count,
        })
    }

    async fn render_page(
        &self,
        _doc: &DocumentHandle,
        index: usize,
        _dpi: u32,
    ) -> Result<PageImage, RenderError> {
        {
            let mut failures = self.render_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&index) {
                if *left > 0 {
                    *left -= 1;
                    return Err(RenderError(format!(
                        "bitmap allocation failed on page {}",
                        index + 1
                    )));
                }
            }
        }
        self.rendered.lock().unwrap().push(index);
        Ok(PageImage::from_png(vec![index as u8]))
    }
}

/// One scripted answer of the model fake.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these fragments, then end.
    Text(Vec<String>),
    /// Fail before streaming.
    Fail(String),
    /// Stream one fragment, then fail.
    FailMidStream(String),
    /// Never produce a fragment.
    Hang,
}

pub fn text(fragments: &[&str]) -> Reply {
    Reply::Text(fragments.iter().map(|f| f.to_string()).collect())
}

pub fn fail(msg: &str) -> Reply {
    Reply::Fail(msg.to_string())
}

/// Model client answering from per-page scripts. A page without a script
/// (or whose script ran out) answers `"text "` + `"<absolute page>"`.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<usize, VecDeque<Reply>>>,
    calls: Mutex<Vec<(usize, String, Instant)>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script replies for the page at zero-based `index`.
    pub fn with(self: Arc<Self>, index: usize, replies: Vec<Reply>) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .entry(index)
            .or_default()
            .extend(replies);
        self
    }

    /// Number of requests made for page `index`.
    pub fn calls_for(&self, index: usize) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _, _)| *i == index)
            .count()
    }

    /// When each request for page `index` was made, on the tokio clock.
    pub fn call_times(&self, index: usize) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _, _)| *i == index)
            .map(|(_, _, at)| *at)
            .collect()
    }

    pub fn instructions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, instruction, _)| instruction.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_page(
        &self,
        instruction: &str,
        image: &PageImage,
    ) -> Result<FragmentStream, ModelError> {
        let index = image.png()[0] as usize;
        self.calls
            .lock()
            .unwrap()
            .push((index, instruction.to_string(), Instant::now()));
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&index)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::Text(vec!["text ".into(), (index + 1).to_string()]));

        match reply {
            Reply::Text(fragments) => Ok(Box::pin(stream::iter(
                fragments.into_iter().map(Ok::<String, ModelError>),
            ))),
            Reply::Fail(msg) => Err(ModelError::Network(msg)),
            Reply::FailMidStream(partial) => Ok(Box::pin(stream::iter(vec![
                Ok(partial),
                Err(ModelError::Http {
                    status: 500,
                    body: "internal".into(),
                }),
            ]))),
            Reply::Hang => Ok(Box::pin(stream::pending::<Result<String, ModelError>>())),
        }
    }
}

/// A driver with zero retry delay over the two fakes.
pub fn driver(
    rasterizer: Arc<FakeRasterizer>,
    model: Arc<ScriptedModel>,
    include_page_markers: bool,
) -> ConversionDriver {
    driver_with_delay(rasterizer, model, include_page_markers, 0)
}

pub fn driver_with_delay(
    rasterizer: Arc<FakeRasterizer>,
    model: Arc<ScriptedModel>,
    include_page_markers: bool,
    retry_delay_ms: u64,
) -> ConversionDriver {
    let config = ConversionConfig::builder()
        .retry_delay_ms(retry_delay_ms)
        .include_page_markers(include_page_markers)
        .instruction(InstructionSource::Inline(INSTRUCTION.into()))
        .build()
        .unwrap();
    ConversionDriver::new(rasterizer, model, config)
}

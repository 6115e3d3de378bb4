//! The Conversion Driver: renders and transcribes a page range, one page
//! at a time, with per-page retries, operator escalation and cooperative
//! cancellation.
//!
//! A job runs on its own tokio task. It talks to the foreground only
//! through [`ConversionEvent`]s and the [`StopHandle`]; escalations carry
//! their own reply slot (see [`escalation`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use pdf2mcq::{
//!     build_client, ConversionConfig, ConversionDriver, ConversionRequest, FixedDecision,
//!     ModelSettings, PageRange, PdfiumRasterizer, Decision,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = ConversionDriver::new(
//!     Arc::new(PdfiumRasterizer::new()),
//!     build_client(&ModelSettings::default())?,
//!     ConversionConfig::default(),
//! );
//! let job = driver.spawn(ConversionRequest::new("notes.pdf", PageRange::new(45, 49)?));
//! let outcome = job.observe(&mut FixedDecision(Decision::Skip)).await?;
//! println!("{}", outcome.markdown().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod escalation;
pub mod state;

pub use cancel::{CancelFlag, StopHandle};
pub use escalation::{EscalationChannel, EscalationRequest, PendingDecision, Unanswered};
pub use state::{Decision, PageEvent, PageState};

use crate::config::{ConversionConfig, PageRange};
use crate::error::{PageError, Pdf2McqError};
use crate::output::{AccumulatedMarkdown, ConversionOutcome, ConversionOutput, ConversionStats, PageBlock};
use crate::pipeline::encode::PageImage;
use crate::pipeline::llm::ModelClient;
use crate::pipeline::render::{DocumentHandle, Rasterizer};
use crate::progress::{ConversionEvent, ConversionObserver, EscalationInfo, ENDED_BY_USER};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What to convert.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub document: PathBuf,
    pub range: PageRange,
    /// Overrides [`ConversionConfig::include_page_markers`] when set.
    pub include_page_markers: Option<bool>,
}

impl ConversionRequest {
    pub fn new(document: impl Into<PathBuf>, range: PageRange) -> Self {
        Self {
            document: document.into(),
            range,
            include_page_markers: None,
        }
    }

    pub fn page_markers(mut self, include: bool) -> Self {
        self.include_page_markers = Some(include);
        self
    }
}

/// Runs conversion jobs against a rasterizer and a model client.
#[derive(Clone)]
pub struct ConversionDriver {
    rasterizer: Arc<dyn Rasterizer>,
    client: Arc<dyn ModelClient>,
    config: ConversionConfig,
}

impl ConversionDriver {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        client: Arc<dyn ModelClient>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            rasterizer,
            client,
            config,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Start a job on a new tokio task.
    pub fn spawn(&self, request: ConversionRequest) -> ConversionJob {
        self.spawn_with(request, CancelFlag::new())
    }

    /// Start a job that stops when `cancel` is cleared.
    pub fn spawn_with(&self, request: ConversionRequest, cancel: CancelFlag) -> ConversionJob {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = cancel.handle();
        let driver = self.clone();
        let task = tokio::spawn(async move { driver.run(request, tx, cancel).await });
        ConversionJob {
            events: rx,
            stop,
            task,
        }
    }

    /// Run a job to completion on the current task.
    ///
    /// Fatal errors are reported both as a terminal `Error` event and as
    /// the returned `Err`. Operator abort and cancellation are `Ok`
    /// outcomes.
    pub async fn run(
        &self,
        request: ConversionRequest,
        events: mpsc::UnboundedSender<ConversionEvent>,
        cancel: CancelFlag,
    ) -> Result<ConversionOutcome, Pdf2McqError> {
        let mut job = Job {
            driver: self,
            events,
            cancel,
            escalations: EscalationChannel::new(),
            stats: ConversionStats {
                total_pages: request.range.len(),
                ..Default::default()
            },
        };

        let (instruction, doc) = match self.prepare(&request).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Conversion failed before the first page: {}", e);
                job.emit(ConversionEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let include_markers = request
            .include_page_markers
            .unwrap_or(self.config.include_page_markers);
        info!(
            "Converting pages {} of '{}' ({} pages)",
            request.range,
            doc.path.display(),
            request.range.len()
        );
        job.convert_range(&doc, request.range, &instruction, include_markers)
            .await
    }

    /// Everything that must succeed before page processing starts.
    async fn prepare(
        &self,
        request: &ConversionRequest,
    ) -> Result<(String, DocumentHandle), Pdf2McqError> {
        let instruction = self.config.instruction.load().await?;
        let doc = self.rasterizer.open(&request.document).await?;
        request.range.validate(doc.page_count)?;
        Ok((instruction, doc))
    }
}

/// Per-job mutable state, owned by the driver task.
struct Job<'a> {
    driver: &'a ConversionDriver,
    events: mpsc::UnboundedSender<ConversionEvent>,
    cancel: CancelFlag,
    escalations: EscalationChannel,
    stats: ConversionStats,
}

/// How one page ended.
enum PageResolution {
    Converted(String),
    Skipped,
    Aborted,
    Cancelled,
}

/// How one streaming attempt ended.
enum StreamEnd {
    Done,
    Failed(String),
    Cancelled,
}

impl Job<'_> {
    fn emit(&self, event: ConversionEvent) {
        // A controller that hung up still lets the job run to its end.
        let _ = self.events.send(event);
    }

    async fn convert_range(
        &mut self,
        doc: &DocumentHandle,
        range: PageRange,
        instruction: &str,
        include_markers: bool,
    ) -> Result<ConversionOutcome, Pdf2McqError> {
        let started = Instant::now();
        let mut markdown = AccumulatedMarkdown::new(include_markers);
        let total = range.len();

        for (offset, index) in range.indices().enumerate() {
            if !self.cancel.is_running() {
                return Ok(self.cancelled());
            }

            let ordinal = offset + 1;
            let absolute_page = index + 1;
            self.emit(ConversionEvent::PageStarted {
                ordinal,
                absolute_page,
                total,
            });
            info!("Page {}/{} (document page {})", ordinal, total, absolute_page);

            match self.convert_page(doc, index, ordinal, instruction).await {
                PageResolution::Converted(text) => {
                    if text.is_empty() {
                        self.stats.empty_pages += 1;
                        self.emit(ConversionEvent::NoContent { ordinal });
                        warn!("Page {}: no content generated", ordinal);
                    }
                    self.stats.converted_pages += 1;
                    markdown.push(PageBlock {
                        ordinal,
                        absolute_page,
                        text,
                    });
                }
                PageResolution::Skipped => {
                    self.stats.skipped_pages += 1;
                    info!("Page {}: skipped by operator", ordinal);
                }
                PageResolution::Aborted => {
                    self.cancel.stop();
                    info!("Conversion ended by operator at page {}", ordinal);
                    self.emit(ConversionEvent::Error {
                        message: ENDED_BY_USER.to_string(),
                    });
                    return Ok(ConversionOutcome::Aborted { ordinal });
                }
                PageResolution::Cancelled => return Ok(self.cancelled()),
            }
        }

        if !self.cancel.is_running() {
            return Ok(self.cancelled());
        }

        self.stats.duration_ms = started.elapsed().as_millis() as u64;
        let text = markdown.finish();
        info!(
            "Conversion finished: {} converted, {} skipped, {} failed attempts in {}ms",
            self.stats.converted_pages,
            self.stats.skipped_pages,
            self.stats.failed_attempts,
            self.stats.duration_ms
        );
        self.emit(ConversionEvent::Finished {
            markdown: text.clone(),
        });
        Ok(ConversionOutcome::Completed(ConversionOutput {
            markdown: text,
            pages: markdown.blocks().to_vec(),
            stats: std::mem::take(&mut self.stats),
        }))
    }

    fn cancelled(&self) -> ConversionOutcome {
        info!("Conversion cancelled");
        self.emit(ConversionEvent::Cancelled);
        ConversionOutcome::Cancelled
    }

    /// Drive one page through [`PageState`] until it reaches a terminal state.
    async fn convert_page(
        &mut self,
        doc: &DocumentHandle,
        index: usize,
        ordinal: usize,
        instruction: &str,
    ) -> PageResolution {
        let driver = self.driver;
        let config = &driver.config;
        let max = config.max_attempts;
        let mut state = PageState::start();
        let mut image: Option<PageImage> = None;
        let mut text = String::new();
        let mut last_error = String::new();

        loop {
            state = match state {
                PageState::Rendering { failures } => {
                    if !self.cancel.is_running() {
                        state.next(PageEvent::Cancel, max)
                    } else {
                        let rendered = tokio::select! {
                            r = driver.rasterizer.render_page(doc, index, config.dpi) => Some(r),
                            _ = self.cancel.cancelled() => None,
                        };
                        match rendered {
                            None => state.next(PageEvent::Cancel, max),
                            Some(Ok(img)) => {
                                debug!("Page {}: rendered {} bytes", ordinal, img.png().len());
                                image = Some(img);
                                state.next(PageEvent::Rendered, max)
                            }
                            Some(Err(e)) => {
                                let err = PageError::RenderFailed {
                                    page: ordinal,
                                    detail: e.to_string(),
                                };
                                last_error = self.attempt_failed(ordinal, failures + 1, &err);
                                state.next(PageEvent::AttemptFailed, max)
                            }
                        }
                    }
                }

                PageState::Streaming { failures } => {
                    text.clear();
                    let end = match image.as_ref() {
                        Some(img) => self.stream_page(ordinal, instruction, img, &mut text).await,
                        None => StreamEnd::Failed("no rendered image".to_string()),
                    };
                    match end {
                        StreamEnd::Done => state.next(PageEvent::StreamFinished, max),
                        StreamEnd::Cancelled => state.next(PageEvent::Cancel, max),
                        StreamEnd::Failed(detail) => {
                            let err = PageError::ModelFailed {
                                page: ordinal,
                                detail,
                            };
                            last_error = self.attempt_failed(ordinal, failures + 1, &err);
                            state.next(PageEvent::AttemptFailed, max)
                        }
                    }
                }

                PageState::Failed { failures } => {
                    debug!(
                        "Page {}: waiting {}ms before attempt {}",
                        ordinal,
                        config.retry_delay_ms,
                        failures + 1
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)) => {
                            state.next(PageEvent::BackoffElapsed, max)
                        }
                        _ = self.cancel.cancelled() => state.next(PageEvent::Cancel, max),
                    }
                }

                PageState::Escalating => {
                    self.stats.escalations += 1;
                    let absolute_page = index + 1;
                    warn!("Page {}: {} attempts failed, asking operator", ordinal, max);
                    let (request, pending) =
                        self.escalations.raise(ordinal, absolute_page, last_error.clone());
                    // If the controller is gone the request is dropped with
                    // the send error, which the pending wait reads as abort.
                    let _ = self.events.send(ConversionEvent::Escalation(request));
                    match pending.wait(&self.cancel).await {
                        Ok(decision) => state.next(PageEvent::Decided(decision), max),
                        Err(Unanswered::Cancelled) => state.next(PageEvent::Cancel, max),
                    }
                }

                PageState::Succeeded => return PageResolution::Converted(text),
                PageState::Skipped => return PageResolution::Skipped,
                PageState::Aborted => return PageResolution::Aborted,
                PageState::Cancelled => return PageResolution::Cancelled,
            };
        }
    }

    /// Record a failed attempt and return its message.
    fn attempt_failed(&mut self, ordinal: usize, attempt: u32, err: &PageError) -> String {
        let max_attempts = self.driver.config.max_attempts;
        self.stats.failed_attempts += 1;
        warn!("Attempt {}/{} failed: {}", attempt, max_attempts, err);
        let message = err.to_string();
        self.emit(ConversionEvent::AttemptFailed {
            ordinal,
            attempt,
            max_attempts,
            error: message.clone(),
        });
        message
    }

    /// One streaming request. Fragments are emitted as they arrive and
    /// appended to `text`.
    async fn stream_page(
        &self,
        ordinal: usize,
        instruction: &str,
        image: &PageImage,
        text: &mut String,
    ) -> StreamEnd {
        let started = tokio::select! {
            r = self.driver.client.stream_page(instruction, image) => r,
            _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
        };
        let mut fragments = match started {
            Ok(s) => s,
            Err(e) => return StreamEnd::Failed(e.to_string()),
        };

        loop {
            let next = tokio::select! {
                n = fragments.next() => n,
                _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
            };
            match next {
                None => break,
                Some(Ok(fragment)) => {
                    if !fragment.is_empty() {
                        text.push_str(&fragment);
                        self.emit(ConversionEvent::Progress { ordinal, fragment });
                    }
                    if !self.cancel.is_running() {
                        return StreamEnd::Cancelled;
                    }
                }
                Some(Err(e)) => return StreamEnd::Failed(e.to_string()),
            }
        }

        if !self.cancel.is_running() {
            return StreamEnd::Cancelled;
        }
        debug!("Page {}: {} chars streamed", ordinal, text.len());
        StreamEnd::Done
    }
}

/// Handle to a spawned conversion.
pub struct ConversionJob {
    events: mpsc::UnboundedReceiver<ConversionEvent>,
    stop: StopHandle,
    task: JoinHandle<Result<ConversionOutcome, Pdf2McqError>>,
}

impl ConversionJob {
    /// Handle that can stop the job from anywhere (e.g. a Ctrl-C handler).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request cancellation. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Next event, or `None` once the job has ended and every event was read.
    pub async fn next_event(&mut self) -> Option<ConversionEvent> {
        self.events.recv().await
    }

    /// Wait for the job's outcome. Unread events are discarded.
    pub async fn join(self) -> Result<ConversionOutcome, Pdf2McqError> {
        drop(self.events);
        self.task
            .await
            .map_err(|e| Pdf2McqError::Internal(format!("conversion task failed: {e}")))?
    }

    /// Feed every event to `observer`, answer escalations with its
    /// decisions, and return the outcome.
    pub async fn observe<O>(mut self, observer: &mut O) -> Result<ConversionOutcome, Pdf2McqError>
    where
        O: ConversionObserver + ?Sized,
    {
        while let Some(event) = self.events.recv().await {
            match event {
                ConversionEvent::PageStarted {
                    ordinal,
                    absolute_page,
                    total,
                } => observer.on_page_start(ordinal, absolute_page, total),
                ConversionEvent::Progress { ordinal, fragment } => {
                    observer.on_fragment(ordinal, &fragment)
                }
                ConversionEvent::NoContent { ordinal } => observer.on_no_content(ordinal),
                ConversionEvent::AttemptFailed {
                    ordinal,
                    attempt,
                    max_attempts,
                    error,
                } => observer.on_attempt_failed(ordinal, attempt, max_attempts, &error),
                ConversionEvent::Escalation(request) => {
                    let info = EscalationInfo::from(&request);
                    let decision = observer.decide(&info).await;
                    if !request.resolve(decision) {
                        debug!("Page {}: decision arrived after the job stopped", info.ordinal);
                    }
                }
                ConversionEvent::Finished { markdown } => observer.on_finished(&markdown),
                ConversionEvent::Error { message } => observer.on_error(&message),
                ConversionEvent::Cancelled => observer.on_cancelled(),
            }
        }
        self.join().await
    }
}

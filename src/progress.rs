//! Events emitted by a running conversion, and the observer trait a
//! foreground controller implements to consume them.
//!
//! The driver never calls back into the controller directly. It sends
//! [`ConversionEvent`]s over a channel; [`crate::driver::ConversionJob::observe`]
//! pumps that channel into a [`ConversionObserver`] and forwards the
//! observer's escalation decisions back to the driver.
//!
//! # Example
//!
//! ```rust
//! use pdf2mcq::{ConversionObserver, Decision, EscalationInfo};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ConversionObserver for Echo {
//!     fn on_fragment(&mut self, ordinal: usize, text: &str) {
//!         eprint!("[{ordinal}] {text}");
//!     }
//!
//!     async fn decide(&mut self, info: &EscalationInfo) -> Decision {
//!         eprintln!("page {} keeps failing: {}", info.ordinal, info.last_error);
//!         Decision::Skip
//!     }
//! }
//! ```

use crate::driver::{Decision, EscalationRequest};
use async_trait::async_trait;

/// Status text emitted for a page that produced no output.
pub const NO_CONTENT_STATUS: &str = "No content generated.";

/// Message of the terminal error emitted when the operator ends a job.
pub const ENDED_BY_USER: &str = "Conversion ended by user.";

/// One event from the driver to the foreground controller.
///
/// Exactly one of `Finished`, `Error` or `Cancelled` ends every job.
#[derive(Debug)]
pub enum ConversionEvent {
    /// The driver moved on to a new page. Precedes that page's fragments.
    PageStarted {
        ordinal: usize,
        absolute_page: usize,
        total: usize,
    },
    /// A fragment of streamed text for the page at `ordinal`.
    Progress { ordinal: usize, fragment: String },
    /// The page finished without any text. Displayed as [`NO_CONTENT_STATUS`].
    NoContent { ordinal: usize },
    /// An attempt failed; another will follow unless the budget is spent.
    AttemptFailed {
        ordinal: usize,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    /// Attempts are exhausted. The driver is suspended until the request
    /// is resolved.
    Escalation(EscalationRequest),
    /// All pages were processed. Carries the trimmed Markdown.
    Finished { markdown: String },
    /// Fatal failure or operator abort.
    Error { message: String },
    /// The job observed `stop()` and ended without a result.
    Cancelled,
}

impl ConversionEvent {
    /// True for `Finished`, `Error` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionEvent::Finished { .. }
                | ConversionEvent::Error { .. }
                | ConversionEvent::Cancelled
        )
    }
}

/// What an observer is told when a page needs a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationInfo {
    pub ordinal: usize,
    pub absolute_page: usize,
    pub last_error: String,
}

impl From<&EscalationRequest> for EscalationInfo {
    fn from(req: &EscalationRequest) -> Self {
        Self {
            ordinal: req.ordinal(),
            absolute_page: req.absolute_page(),
            last_error: req.last_error().to_string(),
        }
    }
}

/// Receives conversion events on the foreground side.
///
/// Every hook but [`decide`](Self::decide) defaults to a no-op; `decide`
/// defaults to [`Decision::Abort`] so an observer that ignores escalations
/// cannot hang a job.
#[async_trait]
pub trait ConversionObserver: Send {
    fn on_page_start(&mut self, ordinal: usize, absolute_page: usize, total: usize) {
        let _ = (ordinal, absolute_page, total);
    }

    fn on_fragment(&mut self, ordinal: usize, text: &str) {
        let _ = (ordinal, text);
    }

    fn on_attempt_failed(&mut self, ordinal: usize, attempt: u32, max_attempts: u32, error: &str) {
        let _ = (ordinal, attempt, max_attempts, error);
    }

    /// Defaults to reporting [`NO_CONTENT_STATUS`] as a fragment.
    fn on_no_content(&mut self, ordinal: usize) {
        self.on_fragment(ordinal, NO_CONTENT_STATUS);
    }

    /// Asked once per escalation. The driver stays suspended until this returns.
    async fn decide(&mut self, info: &EscalationInfo) -> Decision {
        let _ = info;
        Decision::Abort
    }

    fn on_finished(&mut self, markdown: &str) {
        let _ = markdown;
    }

    fn on_error(&mut self, message: &str) {
        let _ = message;
    }

    fn on_cancelled(&mut self) {}
}

/// Observer that answers every escalation the same way and ignores the rest.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub Decision);

#[async_trait]
impl ConversionObserver for FixedDecision {
    async fn decide(&mut self, _info: &EscalationInfo) -> Decision {
        self.0
    }
}

/// A no-op observer; escalations are answered with `Abort`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

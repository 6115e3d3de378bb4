//! Escalation channel: a one-shot rendezvous between the driver and the
//! foreground controller.
//!
//! When a page exhausts its attempts the driver calls
//! [`EscalationChannel::raise`], which yields an [`EscalationRequest`] to
//! hand to the controller and a [`PendingDecision`] to wait on. The pending
//! decision mutably borrows the channel, so a second escalation cannot be
//! raised while one is outstanding. The request is consumed by
//! [`EscalationRequest::resolve`], so it is answered at most once.

use super::cancel::CancelFlag;
use super::state::Decision;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Driver-side end of the escalation protocol.
#[derive(Debug, Default)]
pub struct EscalationChannel {
    raised: usize,
}

impl EscalationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of escalations raised so far.
    pub fn raised(&self) -> usize {
        self.raised
    }

    /// Open an escalation for the page at `ordinal`.
    pub fn raise(
        &mut self,
        ordinal: usize,
        absolute_page: usize,
        last_error: String,
    ) -> (EscalationRequest, PendingDecision<'_>) {
        self.raised += 1;
        let (tx, rx) = oneshot::channel();
        let request = EscalationRequest {
            ordinal,
            absolute_page,
            last_error,
            reply: tx,
        };
        let pending = PendingDecision {
            _channel: self,
            ordinal,
            rx,
        };
        (request, pending)
    }
}

/// Why a pending escalation ended without an operator decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unanswered {
    /// The job was stopped while waiting.
    Cancelled,
}

/// The driver's wait for an operator decision.
#[derive(Debug)]
pub struct PendingDecision<'a> {
    _channel: &'a mut EscalationChannel,
    ordinal: usize,
    rx: oneshot::Receiver<Decision>,
}

impl PendingDecision<'_> {
    /// Suspend until the controller answers or the job is stopped.
    ///
    /// There is no timeout. A request dropped without an answer counts as
    /// [`Decision::Abort`], so the driver never resumes without a decision.
    pub async fn wait(self, cancel: &CancelFlag) -> Result<Decision, Unanswered> {
        let ordinal = self.ordinal;
        tokio::select! {
            biased;
            // A stop wins over an answer that arrives at the same time.
            _ = cancel.cancelled() => Err(Unanswered::Cancelled),
            reply = self.rx => match reply {
                Ok(decision) => {
                    info!("Page {}: operator chose {:?}", ordinal, decision);
                    Ok(decision)
                }
                Err(_) => {
                    warn!("Page {}: escalation dropped unanswered, ending job", ordinal);
                    Ok(Decision::Abort)
                }
            },
        }
    }
}

/// A page that failed every attempt and needs an operator decision.
#[derive(Debug)]
pub struct EscalationRequest {
    ordinal: usize,
    absolute_page: usize,
    last_error: String,
    reply: oneshot::Sender<Decision>,
}

impl EscalationRequest {
    /// 1-based position of the page in the requested range.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// 1-based page number in the document.
    pub fn absolute_page(&self) -> usize {
        self.absolute_page
    }

    /// Message of the last failed attempt.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Answer the escalation and let the driver resume.
    ///
    /// Returns `false` if the driver is no longer waiting (the job was
    /// stopped in the meantime).
    pub fn resolve(self, decision: Decision) -> bool {
        self.reply.send(decision).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decision_is_delivered() {
        let mut channel = EscalationChannel::new();
        let cancel = CancelFlag::new();
        let (request, pending) = channel.raise(2, 4, "boom".into());
        assert_eq!(request.ordinal(), 2);
        assert_eq!(request.absolute_page(), 4);
        assert_eq!(request.last_error(), "boom");

        let answer = tokio::spawn(async move { request.resolve(Decision::Skip) });
        assert_eq!(pending.wait(&cancel).await, Ok(Decision::Skip));
        assert!(answer.await.unwrap());
        assert_eq!(channel.raised(), 1);
    }

    #[tokio::test]
    async fn dropped_request_aborts() {
        let mut channel = EscalationChannel::new();
        let cancel = CancelFlag::new();
        let (request, pending) = channel.raise(1, 1, String::new());
        drop(request);
        assert_eq!(pending.wait(&cancel).await, Ok(Decision::Abort));
    }

    #[tokio::test]
    async fn stop_interrupts_wait_and_late_answer_is_rejected() {
        let mut channel = EscalationChannel::new();
        let cancel = CancelFlag::new();
        let (request, pending) = channel.raise(3, 7, String::new());
        cancel.stop();
        assert_eq!(pending.wait(&cancel).await, Err(Unanswered::Cancelled));
        assert!(!request.resolve(Decision::Retry));
    }

    #[tokio::test]
    async fn stop_beats_an_answer_already_sent() {
        // Repeat so an unordered select would be caught taking the answer.
        for _ in 0..16 {
            let mut channel = EscalationChannel::new();
            let cancel = CancelFlag::new();
            let (request, pending) = channel.raise(1, 1, String::new());
            assert!(request.resolve(Decision::Abort));
            cancel.stop();
            assert_eq!(pending.wait(&cancel).await, Err(Unanswered::Cancelled));
        }
    }
}

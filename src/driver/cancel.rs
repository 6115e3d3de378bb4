//! The job's running flag.
//!
//! Cancellation is cooperative: the driver polls [`CancelFlag::is_running`]
//! between pages and attempts, and races [`CancelFlag::cancelled`] against
//! every suspension point (fragment await, retry backoff, escalation wait).
//! Once cleared the flag never becomes set again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Inner {
    running: AtomicBool,
    notify: Notify,
}

/// Shared running flag for one conversion job.
#[derive(Clone)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

impl CancelFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(true),
                notify: Notify::new(),
            }),
        }
    }

    /// Clear the flag and wake every waiter. Idempotent.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Resolve once the flag has been cleared.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent stop() is not missed.
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Handle for the foreground side; can only stop the job.
    pub fn handle(&self) -> StopHandle {
        StopHandle { flag: self.clone() }
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelFlag")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Foreground handle to request cancellation of a running job.
#[derive(Clone, Debug)]
pub struct StopHandle {
    flag: CancelFlag,
}

impl StopHandle {
    /// Ask the job to stop. Safe to call any number of times, from any thread.
    pub fn stop(&self) {
        self.flag.stop();
    }

    pub fn is_stopped(&self) -> bool {
        !self.flag.is_running()
    }
}

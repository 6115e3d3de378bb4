//! Per-page state machine.
//!
//! The driver's loop is a thin interpreter over [`PageState::next`]: it
//! performs the side effect belonging to the current state (render, stream,
//! sleep, ask the operator), turns the result into a [`PageEvent`], and
//! feeds it back here. Keeping the transitions pure lets every retry and
//! escalation path be tested without a renderer or a network.
//!
//! ```text
//! Rendering ──Rendered──▶ Streaming ──StreamFinished──▶ Succeeded
//!     │                       │
//!     └──AttemptFailed────────┴──▶ Failed ──BackoffElapsed──▶ Rendering
//!                                   │ (budget spent)
//!                                   ▼
//!                               Escalating ──Retry──▶ Rendering (budget reset)
//!                                   ├──Skip──▶ Skipped
//!                                   └──Abort─▶ Aborted
//! ```
//!
//! Accumulation happens while streaming, so there is no separate state
//! for it. `Cancel` moves any non-terminal state to `Cancelled`.

use serde::{Deserialize, Serialize};

/// Operator decision for a page whose attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Start over with a fresh attempt budget.
    Retry,
    /// Contribute nothing for this page and continue.
    Skip,
    /// End the whole job.
    Abort,
}

/// State of the page currently being processed.
///
/// `failures` counts failed attempts since the budget was last reset; it
/// never exceeds the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Rendering { failures: u32 },
    Streaming { failures: u32 },
    Failed { failures: u32 },
    Escalating,
    Succeeded,
    Skipped,
    Aborted,
    Cancelled,
}

/// Something that happened while in a [`PageState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Rendered,
    StreamFinished,
    AttemptFailed,
    BackoffElapsed,
    Decided(Decision),
    Cancel,
}

impl PageState {
    /// Entry state for a page.
    pub fn start() -> Self {
        PageState::Rendering { failures: 0 }
    }

    /// True once the page needs no further work.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageState::Succeeded | PageState::Skipped | PageState::Aborted | PageState::Cancelled
        )
    }

    /// Apply `event` under an attempt budget of `max_attempts`.
    ///
    /// Events that do not apply to the current state leave it unchanged.
    pub fn next(self, event: PageEvent, max_attempts: u32) -> PageState {
        use PageEvent::*;
        use PageState::*;

        match (self, event) {
            (s, _) if s.is_terminal() => s,
            (_, Cancel) => Cancelled,

            (Rendering { failures }, Rendered) => Streaming { failures },
            (Streaming { .. }, StreamFinished) => Succeeded,

            (Rendering { failures } | Streaming { failures }, AttemptFailed) => {
                let failures = failures + 1;
                if failures >= max_attempts {
                    Escalating
                } else {
                    Failed { failures }
                }
            }

            (Failed { failures }, BackoffElapsed) => Rendering { failures },

            (Escalating, Decided(Decision::Retry)) => Rendering { failures: 0 },
            (Escalating, Decided(Decision::Skip)) => Skipped,
            (Escalating, Decided(Decision::Abort)) => Aborted,

            (s, _) => s,
        }
    }
}

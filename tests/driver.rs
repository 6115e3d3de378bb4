//! Conversion driver behaviour against in-process fakes.
//!
//! Drivers run with a zero retry delay, except the backoff tests, which use
//! the default delay on a paused clock.

mod common;

use common::{
    driver, driver_with_delay, fail, text, FakeRasterizer, Reply, ScriptedModel, INSTRUCTION,
};
use pdf2mcq::progress::{ENDED_BY_USER, NO_CONTENT_STATUS};
use pdf2mcq::{
    CancelFlag, ConversionConfig, ConversionDriver, ConversionEvent, ConversionJob,
    ConversionObserver, ConversionOutcome, ConversionRequest, Decision, EscalationInfo,
    InstructionSource, PageRange, Pdf2McqError,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn request(start: usize, end: usize) -> ConversionRequest {
    ConversionRequest::new("notes.pdf", PageRange::new(start, end).unwrap())
}

/// Observer that records everything and answers escalations from a queue
/// (`Abort` once the queue is empty).
#[derive(Default)]
struct Recorder {
    kinds: Vec<&'static str>,
    fragments: Vec<(usize, String)>,
    started: Vec<(usize, usize)>,
    failures: Vec<(usize, u32)>,
    no_content: Vec<usize>,
    escalations: Vec<EscalationInfo>,
    decisions: VecDeque<Decision>,
    errors: Vec<String>,
    finished: Option<String>,
}

impl Recorder {
    fn answering(decisions: &[Decision]) -> Self {
        Self {
            decisions: decisions.iter().copied().collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ConversionObserver for Recorder {
    fn on_page_start(&mut self, ordinal: usize, absolute_page: usize, _total: usize) {
        self.kinds.push("page");
        self.started.push((ordinal, absolute_page));
    }

    fn on_fragment(&mut self, ordinal: usize, text: &str) {
        self.kinds.push("fragment");
        self.fragments.push((ordinal, text.to_string()));
    }

    fn on_attempt_failed(&mut self, ordinal: usize, attempt: u32, _max: u32, _error: &str) {
        self.kinds.push("failed");
        self.failures.push((ordinal, attempt));
    }

    fn on_no_content(&mut self, ordinal: usize) {
        self.kinds.push("empty");
        self.no_content.push(ordinal);
    }

    async fn decide(&mut self, info: &EscalationInfo) -> Decision {
        self.kinds.push("escalation");
        self.escalations.push(info.clone());
        self.decisions.pop_front().unwrap_or(Decision::Abort)
    }

    fn on_finished(&mut self, markdown: &str) {
        self.kinds.push("finished");
        self.finished = Some(markdown.to_string());
    }

    fn on_error(&mut self, message: &str) {
        self.kinds.push("error");
        self.errors.push(message.to_string());
    }

    fn on_cancelled(&mut self) {
        self.kinds.push("cancelled");
    }
}

async fn observe(
    driver: &ConversionDriver,
    req: ConversionRequest,
    recorder: &mut Recorder,
) -> Result<ConversionOutcome, Pdf2McqError> {
    driver.spawn(req).observe(recorder).await
}

/// Read events until the channel closes, then join.
async fn drain(mut job: ConversionJob) -> (Vec<ConversionEvent>, ConversionOutcome) {
    let mut events = Vec::new();
    while let Some(event) = job.next_event().await {
        events.push(event);
    }
    (events, job.join().await.unwrap())
}

fn markdown(outcome: &ConversionOutcome) -> &str {
    outcome.markdown().expect("job should have completed")
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_page_succeeds_with_markers() {
    let raster = FakeRasterizer::new(5);
    let model = ScriptedModel::new();
    let d = driver(raster.clone(), model.clone(), true);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert_eq!(
        markdown(&outcome),
        "--- Page 1 ---\n\ntext 1\n\n--- Page 2 ---\n\ntext 2\n\n--- Page 3 ---\n\ntext 3"
    );
    assert_eq!(rec.finished.as_deref(), Some(markdown(&outcome)));
    assert_eq!(raster.rendered(), vec![0, 1, 2]);
    assert_eq!(model.instructions(), vec![INSTRUCTION; 3]);

    // Fragments arrive one by one, tagged with the range ordinal.
    assert_eq!(
        rec.fragments,
        vec![
            (1, "text ".to_string()),
            (1, "1".to_string()),
            (2, "text ".to_string()),
            (2, "2".to_string()),
            (3, "text ".to_string()),
            (3, "3".to_string()),
        ]
    );
    assert_eq!(rec.kinds.last(), Some(&"finished"));

    let stats = &outcome.into_output().unwrap().stats;
    assert_eq!(stats.total_pages, 3);
    assert_eq!(stats.converted_pages, 3);
    assert_eq!(stats.failed_attempts, 0);
    assert_eq!(stats.escalations, 0);
}

#[tokio::test]
async fn markers_can_be_turned_off() {
    let d = driver(FakeRasterizer::new(3), ScriptedModel::new(), false);
    let outcome = assert_ok!(d.spawn(request(1, 3)).join().await);
    assert_eq!(markdown(&outcome), "text 1\n\ntext 2\n\ntext 3");
}

#[tokio::test]
async fn request_overrides_configured_markers() {
    let d = driver(FakeRasterizer::new(3), ScriptedModel::new(), true);
    let outcome = assert_ok!(d.spawn(request(2, 3).page_markers(false)).join().await);
    assert_eq!(markdown(&outcome), "text 2\n\ntext 3");
}

#[tokio::test]
async fn ordinals_are_relative_to_the_range() {
    let model = ScriptedModel::new().with(
        3,
        vec![fail("timeout"), fail("timeout"), text(&["Hello"])],
    );
    let d = driver(FakeRasterizer::new(5), model.clone(), true);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(3, 5), &mut rec).await);
    let md = markdown(&outcome);

    assert_eq!(md.matches("--- Page 2 ---\n\nHello\n\n").count(), 1);
    assert_eq!(
        md,
        "--- Page 1 ---\n\ntext 3\n\n--- Page 2 ---\n\nHello\n\n--- Page 3 ---\n\ntext 5"
    );
    assert_eq!(rec.started, vec![(1, 3), (2, 4), (3, 5)]);
    assert_eq!(rec.failures, vec![(2, 1), (2, 2)]);
    assert!(rec.escalations.is_empty());
    assert_eq!(model.calls_for(3), 3);
}

// ── Retries ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_leave_output_unchanged() {
    let baseline = driver(FakeRasterizer::new(3), ScriptedModel::new(), true)
        .spawn(request(1, 3))
        .join()
        .await
        .unwrap();

    let model = ScriptedModel::new().with(
        1,
        vec![
            fail("connection reset"),
            Reply::FailMidStream("partial garbage".into()),
        ],
    );
    let d = driver(FakeRasterizer::new(3), model.clone(), true);
    let mut rec = Recorder::default();
    let flaky = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert_eq!(markdown(&flaky), markdown(&baseline));
    assert!(!markdown(&flaky).contains("partial garbage"));
    assert_eq!(model.calls_for(1), 3);
    assert_eq!(rec.failures, vec![(2, 1), (2, 2)]);
    // The partial fragment was still shown live.
    assert!(rec.fragments.contains(&(2, "partial garbage".to_string())));
    assert_eq!(flaky.into_output().unwrap().stats.failed_attempts, 2);
}

#[tokio::test]
async fn render_failures_count_as_attempts() {
    let raster = FakeRasterizer::with_render_failures(2, 0, 2);
    let model = ScriptedModel::new();
    let d = driver(raster.clone(), model.clone(), true);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(1, 2), &mut rec).await);

    assert_eq!(rec.failures, vec![(1, 1), (1, 2)]);
    assert_eq!(model.calls_for(0), 1);
    assert_eq!(raster.rendered(), vec![0, 1]);
    assert!(markdown(&outcome).starts_with("--- Page 1 ---\n\ntext 1"));
}

#[tokio::test]
async fn empty_page_reports_no_content() {
    let model = ScriptedModel::new().with(1, vec![Reply::Text(vec![])]);
    let d = driver(FakeRasterizer::new(3), model, true);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert_eq!(rec.no_content, vec![2]);
    assert!(rec.fragments.iter().all(|(ordinal, _)| *ordinal != 2));
    assert!(markdown(&outcome).contains("--- Page 2 ---\n\n\n\n--- Page 3 ---"));
    let stats = outcome.into_output().unwrap().stats;
    assert_eq!(stats.empty_pages, 1);
    assert_eq!(stats.converted_pages, 3);
}

#[tokio::test]
async fn default_observer_shows_no_content_as_status_text() {
    #[derive(Default)]
    struct Fragments(Vec<String>);
    impl ConversionObserver for Fragments {
        fn on_fragment(&mut self, _ordinal: usize, text: &str) {
            self.0.push(text.to_string());
        }
    }

    let model = ScriptedModel::new().with(0, vec![Reply::Text(vec![])]);
    let d = driver(FakeRasterizer::new(1), model, true);
    let mut obs = Fragments::default();
    assert_ok!(d.spawn(request(1, 1)).observe(&mut obs).await);
    assert_eq!(obs.0, vec![NO_CONTENT_STATUS.to_string()]);
}

#[tokio::test]
async fn whitespace_only_page_is_not_empty() {
    let model = ScriptedModel::new().with(1, vec![text(&["  \n"])]);
    let d = driver(FakeRasterizer::new(3), model, true);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert!(rec.no_content.is_empty());
    assert_eq!(outcome.into_output().unwrap().stats.empty_pages, 0);
}

// ── Backoff ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn attempts_are_spaced_by_a_fixed_delay() {
    let delay = ConversionConfig::default().retry_delay_ms;
    assert_eq!(delay, 2000);
    let model = ScriptedModel::new().with(0, vec![fail("timeout"), fail("timeout")]);
    let d = driver_with_delay(FakeRasterizer::new(1), model.clone(), true, delay);
    let mut rec = Recorder::default();

    let outcome = assert_ok!(observe(&d, request(1, 1), &mut rec).await);
    assert_eq!(markdown(&outcome), "--- Page 1 ---\n\ntext 1");

    let times = model.call_times(0);
    assert_eq!(times.len(), 3);
    let first = times[1] - times[0];
    let second = times[2] - times[1];
    let slack = Duration::from_millis(5);
    assert!(first >= Duration::from_secs(2) && first < Duration::from_secs(2) + slack);
    assert!(second >= Duration::from_secs(2) && second < Duration::from_secs(2) + slack);
    // Fixed, not exponential.
    assert!(second.abs_diff(first) < slack);
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_cancels_without_another_attempt() {
    let raster = FakeRasterizer::new(1);
    let model = ScriptedModel::new().with(0, vec![fail("timeout"), fail("timeout")]);
    let d = driver_with_delay(raster.clone(), model.clone(), true, 2000);
    let mut job = d.spawn(request(1, 1));

    let mut events = Vec::new();
    while let Some(event) = job.next_event().await {
        if matches!(event, ConversionEvent::AttemptFailed { attempt: 1, .. }) {
            job.stop();
        }
        events.push(event);
    }
    let outcome = assert_ok!(job.join().await);

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert!(matches!(events.last(), Some(ConversionEvent::Cancelled)));
    assert_eq!(model.calls_for(0), 1);
    assert_eq!(raster.rendered(), vec![0]);
}

// ── Escalation ───────────────────────────────────────────────────────────────

fn always_failing(times: usize) -> Vec<Reply> {
    (0..times).map(|n| fail(&format!("503 overloaded #{n}"))).collect()
}

#[tokio::test]
async fn skip_after_exhausted_attempts() {
    let model = ScriptedModel::new().with(1, always_failing(3));
    let d = driver(FakeRasterizer::new(3), model.clone(), true);
    let mut rec = Recorder::answering(&[Decision::Skip]);

    let outcome = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert_eq!(
        markdown(&outcome),
        "--- Page 1 ---\n\ntext 1\n\n--- Page 3 ---\n\ntext 3"
    );
    assert_eq!(model.calls_for(1), 3);
    assert_eq!(rec.escalations.len(), 1);
    let info = &rec.escalations[0];
    assert_eq!((info.ordinal, info.absolute_page), (2, 2));
    assert!(info.last_error.contains("503 overloaded #2"));

    let stats = outcome.into_output().unwrap().stats;
    assert_eq!(stats.skipped_pages, 1);
    assert_eq!(stats.escalations, 1);
    assert_eq!(stats.failed_attempts, 3);
}

#[tokio::test]
async fn retry_resets_the_attempt_budget() {
    // Four failures: three exhaust the budget, one more after the retry.
    let model = ScriptedModel::new().with(0, always_failing(4));
    let d = driver(FakeRasterizer::new(1), model.clone(), true);
    let mut rec = Recorder::answering(&[Decision::Retry]);

    let outcome = assert_ok!(observe(&d, request(1, 1), &mut rec).await);

    assert_eq!(markdown(&outcome), "--- Page 1 ---\n\ntext 1");
    assert_eq!(model.calls_for(0), 5);
    assert_eq!(rec.escalations.len(), 1);
    assert_eq!(
        rec.failures,
        vec![(1, 1), (1, 2), (1, 3), (1, 1)],
        "attempt numbering restarts after a retry"
    );
}

#[tokio::test]
async fn repeated_escalations_for_one_page() {
    let model = ScriptedModel::new().with(0, always_failing(6));
    let d = driver(FakeRasterizer::new(2), model.clone(), true);
    let mut rec = Recorder::answering(&[Decision::Retry, Decision::Skip]);

    let outcome = assert_ok!(observe(&d, request(1, 2), &mut rec).await);

    assert_eq!(rec.escalations.len(), 2);
    assert_eq!(model.calls_for(0), 6);
    assert_eq!(markdown(&outcome), "--- Page 2 ---\n\ntext 2");
}

#[tokio::test]
async fn abort_ends_the_job_without_touching_later_pages() {
    let raster = FakeRasterizer::new(3);
    let model = ScriptedModel::new().with(1, always_failing(3));
    let d = driver(raster.clone(), model.clone(), true);
    let mut rec = Recorder::answering(&[Decision::Abort]);

    let outcome = assert_ok!(observe(&d, request(1, 3), &mut rec).await);

    assert!(matches!(outcome, ConversionOutcome::Aborted { ordinal: 2 }));
    assert_eq!(rec.errors, vec![ENDED_BY_USER.to_string()]);
    assert!(rec.finished.is_none());
    assert!(!raster.rendered().contains(&2));
    assert_eq!(model.calls_for(2), 0);
    assert_eq!(rec.kinds.last(), Some(&"error"));
}

#[tokio::test]
async fn dropped_escalation_counts_as_abort() {
    let model = ScriptedModel::new().with(0, always_failing(3));
    let d = driver(FakeRasterizer::new(2), model, true);
    let mut job = d.spawn(request(1, 2));

    while let Some(event) = job.next_event().await {
        if let ConversionEvent::Escalation(req) = event {
            drop(req);
        }
    }
    let outcome = assert_ok!(job.join().await);
    assert!(matches!(outcome, ConversionOutcome::Aborted { ordinal: 1 }));
}

#[tokio::test]
async fn observer_without_decide_aborts() {
    let model = ScriptedModel::new().with(0, always_failing(3));
    let d = driver(FakeRasterizer::new(1), model, true);
    let outcome = assert_ok!(
        d.spawn(request(1, 1))
            .observe(&mut pdf2mcq::progress::NoopObserver)
            .await
    );
    assert!(matches!(outcome, ConversionOutcome::Aborted { ordinal: 1 }));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_while_streaming_cancels_the_job() {
    let raster = FakeRasterizer::new(3);
    let model = ScriptedModel::new().with(1, vec![Reply::Hang]);
    let d = driver(raster.clone(), model, true);
    let mut job = d.spawn(request(1, 3));

    let mut events = Vec::new();
    while let Some(event) = job.next_event().await {
        let second_page = matches!(event, ConversionEvent::PageStarted { ordinal: 2, .. });
        events.push(event);
        if second_page {
            job.stop();
        }
    }
    let outcome = assert_ok!(job.join().await);

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert!(matches!(events.last(), Some(ConversionEvent::Cancelled)));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(!raster.rendered().contains(&2));
}

#[tokio::test]
async fn stop_while_waiting_for_a_decision() {
    let model = ScriptedModel::new().with(0, always_failing(3));
    let d = driver(FakeRasterizer::new(2), model.clone(), true);
    let mut job = d.spawn(request(1, 2));

    let mut held = None;
    let mut events = Vec::new();
    while let Some(event) = job.next_event().await {
        match event {
            ConversionEvent::Escalation(req) => {
                job.stop();
                held = Some(req);
            }
            other => events.push(other),
        }
    }
    let outcome = assert_ok!(job.join().await);

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert!(matches!(events.last(), Some(ConversionEvent::Cancelled)));
    // The driver is gone; a late answer has nobody to reach.
    let late = held.expect("an escalation was raised");
    assert!(!late.resolve(Decision::Retry));
    assert_eq!(model.calls_for(1), 0);
}

#[tokio::test]
async fn stopped_before_start_renders_nothing() {
    let raster = FakeRasterizer::new(3);
    let d = driver(raster.clone(), ScriptedModel::new(), true);
    let cancel = CancelFlag::new();
    cancel.stop();

    let (events, outcome) = drain(d.spawn_with(request(1, 3), cancel)).await;

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert_eq!(events.len(), 1);
    assert!(raster.rendered().is_empty());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let model = ScriptedModel::new().with(0, vec![Reply::Hang]);
    let d = driver(FakeRasterizer::new(1), model, true);
    let job = d.spawn(request(1, 1));
    let handle = job.stop_handle();
    handle.stop();
    handle.stop();
    job.stop();
    assert!(handle.is_stopped());
    let (events, outcome) = drain(job).await;
    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unopenable_document_is_fatal() {
    let d = driver(FakeRasterizer::unopenable(), ScriptedModel::new(), true);
    let mut rec = Recorder::default();

    let err = assert_err!(observe(&d, request(1, 1), &mut rec).await);

    assert!(matches!(err, Pdf2McqError::CorruptPdf { .. }));
    assert_eq!(rec.kinds, vec!["error"]);
    assert!(rec.errors[0].contains("xref table missing"));
}

#[tokio::test]
async fn range_beyond_document_is_fatal() {
    let raster = FakeRasterizer::new(5);
    let d = driver(raster.clone(), ScriptedModel::new(), true);

    let err = assert_err!(d.spawn(request(3, 7)).join().await);

    assert!(matches!(
        err,
        Pdf2McqError::PageOutOfRange { page: 7, total: 5 }
    ));
    assert!(raster.rendered().is_empty());
}

#[tokio::test]
async fn unreadable_instruction_is_fatal() {
    let config = ConversionConfig::builder()
        .retry_delay_ms(0)
        .instruction(InstructionSource::File(PathBuf::from(
            "/nonexistent/instruction.txt",
        )))
        .build()
        .unwrap();
    let raster = FakeRasterizer::new(2);
    let d = ConversionDriver::new(raster.clone(), ScriptedModel::new(), config);

    let mut job = d.spawn(request(1, 2));
    let mut events = Vec::new();
    while let Some(e) = job.next_event().await {
        events.push(e);
    }
    let err = assert_err!(job.join().await);

    assert!(matches!(err, Pdf2McqError::InstructionUnreadable { .. }));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ConversionEvent::Error { .. }));
    assert!(raster.rendered().is_empty());
}

// ── Determinism ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_runs_give_identical_markdown() {
    let script = || {
        ScriptedModel::new()
            .with(0, vec![text(&["# Cohort", " studies"])])
            .with(2, vec![fail("timeout"), text(&["Relative ", "risk"])])
    };

    let first = driver(FakeRasterizer::new(4), script(), true)
        .spawn(request(1, 4))
        .join()
        .await
        .unwrap();
    let second = driver(FakeRasterizer::new(4), script(), true)
        .spawn(request(1, 4))
        .join()
        .await
        .unwrap();

    assert_eq!(markdown(&first), markdown(&second));
    assert_eq!(
        markdown(&first),
        "--- Page 1 ---\n\n# Cohort studies\n\n--- Page 2 ---\n\ntext 2\n\n\
         --- Page 3 ---\n\nRelative risk\n\n--- Page 4 ---\n\ntext 4"
    );
}

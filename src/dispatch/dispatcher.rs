//! Batch dispatch loop.
//!
//! `BatchDispatcher` walks a [`BatchPlan`] one batch at a time:
//! - every item of the current batch is launched on its own task (fan-out),
//! - the dispatcher joins all of them, whatever their outcome (fan-in),
//! - a [`BatchReport`] is logged and published, then the run advances.
//!
//! Batches never overlap, so at most `batch_size` requests are in flight.
//! Per-item failures are counted, not raised; only a request task that
//! panics aborts the run, and only after its batch has fully joined.

use crate::dispatch::batch::BatchPlan;
use crate::dispatch::item::IdentifierScheme;
use crate::request::client::ItemRequester;
use crate::request::outcome::RequestOutcome;
use crate::runtime::progress::DispatchRun;
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Result};
use futures::future::join_all;
use std::any::Any;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching { start: u64 },
    Joining { start: u64 },
    Advancing { start: u64 },
    Done,
}

/// Completion signal for one settled batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub index: u64,
    pub range: Range<u64>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn start(&self) -> u64 {
        self.range.start
    }

    pub fn len(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: Vec<BatchReport>,
    pub succeeded: u64,
    pub failed: u64,
    /// The run stopped early because its cancellation token fired.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed
    }

    fn record(&mut self, report: BatchReport) {
        self.succeeded += report.succeeded as u64;
        self.failed += report.failed as u64;
        self.batches.push(report);
    }
}

pub struct BatchDispatcher<R: ItemRequester> {
    requester: Arc<R>,
    ids: Arc<dyn IdentifierScheme>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    state: watch::Sender<DispatchState>,
    batch_events: Option<mpsc::Sender<BatchReport>>,
}

impl<R: ItemRequester> BatchDispatcher<R> {
    pub fn new<S: IdentifierScheme>(requester: R, ids: S) -> Self {
        let (state, _) = watch::channel(DispatchState::Idle);
        Self {
            requester: Arc::new(requester),
            ids: Arc::new(ids),
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
            state,
            batch_events: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Cancellation is honoured between batches; a batch already launched is
    /// always joined first.
    pub fn with_cancellation_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Publishes every [`BatchReport`] to `sender` as soon as its batch settles.
    /// Reports that do not fit in the channel are dropped; the run never waits
    /// on the receiver.
    pub fn with_batch_events(mut self, sender: mpsc::Sender<BatchReport>) -> Self {
        self.batch_events = Some(sender);
        self
    }

    pub fn requester(&self) -> &Arc<R> {
        &self.requester
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> DispatchState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    /// Dispatches every item of `plan`, batch by batch.
    pub async fn run(&self, plan: BatchPlan) -> Result<RunSummary> {
        let run = DispatchRun::new(plan);
        self.run_with_progress(&run).await
    }

    /// Like [`Self::run`], advancing a caller-owned [`DispatchRun`] so progress
    /// can be observed from outside.
    pub async fn run_with_progress(&self, run: &DispatchRun) -> Result<RunSummary> {
        let plan = run.plan();
        tracing::info!(
            total_items = plan.total(),
            batch_size = plan.batch_size(),
            batches = plan.batch_count(),
            "starting dispatch run"
        );

        let mut summary = RunSummary::default();
        let mut index = 0u64;

        while let Some(range) = run.current_batch() {
            if self.shutdown.is_cancelled() {
                tracing::info!(
                    next_start = range.start,
                    "dispatch cancelled; remaining batches skipped"
                );
                summary.cancelled = true;
                break;
            }

            let report = match self.dispatch_batch(index, range.clone()).await {
                Ok(report) => report,
                Err(err) => {
                    self.state.send_replace(DispatchState::Done);
                    return Err(err);
                }
            };

            self.state.send_replace(DispatchState::Advancing { start: range.start });
            self.telemetry.record_batch_completed();
            tracing::info!(
                batch = index,
                batch_start = range.start,
                batch_end = range.end,
                succeeded = report.succeeded,
                failed = report.failed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "batch {} done",
                range.start
            );

            if let Some(events) = &self.batch_events {
                match events.try_send(report.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(batch_start = range.start, "batch event channel full");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("batch event receiver dropped");
                    }
                }
            }

            summary.record(report);
            run.advance(&range);
            index += 1;
        }

        self.state.send_replace(DispatchState::Done);
        tracing::info!(
            batches = summary.batches.len(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "dispatch run finished"
        );
        Ok(summary)
    }

    async fn dispatch_batch(&self, index: u64, range: Range<u64>) -> Result<BatchReport> {
        let started = Instant::now();
        self.state
            .send_replace(DispatchState::Dispatching { start: range.start });

        let mut handles = Vec::with_capacity((range.end - range.start) as usize);
        for item_index in range.clone() {
            let item = self.ids.work_item(item_index);
            let requester = Arc::clone(&self.requester);
            let telemetry = Arc::clone(&self.telemetry);

            telemetry.record_dispatched();
            handles.push(tokio::spawn(async move {
                let outcome = requester.issue(item).await;
                match &outcome {
                    RequestOutcome::Success { .. } => telemetry.record_success(),
                    RequestOutcome::Failure { error } => {
                        telemetry.record_failure(error.is_timeout())
                    }
                }
                outcome
            }));
        }

        self.state
            .send_replace(DispatchState::Joining { start: range.start });
        let results = join_all(handles).await;

        let mut succeeded = 0;
        let mut failed = 0;
        let mut first_fault = None;

        for (offset, result) in results.into_iter().enumerate() {
            let item_index = range.start + offset as u64;
            match result {
                Ok(outcome) if outcome.is_success() => succeeded += 1,
                Ok(_) => failed += 1,
                Err(join_err) => {
                    self.telemetry.record_aborted();
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic().as_ref())
                    } else {
                        join_err.to_string()
                    };
                    tracing::error!(
                        index = item_index,
                        panic = %message,
                        "item request task aborted"
                    );
                    first_fault.get_or_insert((item_index, message));
                }
            }
        }

        if let Some((item_index, message)) = first_fault {
            bail!(
                "request task for item {item_index} in batch {} aborted: {message}",
                range.start
            );
        }

        Ok(BatchReport {
            index,
            range,
            succeeded,
            failed,
            elapsed: started.elapsed(),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

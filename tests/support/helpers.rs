use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use batchcast::{DispatchRun, ItemRequester, RequestError, RequestOutcome, WorkItem};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launched(u64),
    Settled(u64),
}

type FailurePredicate = Box<dyn Fn(u64) -> bool + Send + Sync>;

/// Fake requester recording launch/settle order, in-flight peaks, and the
/// identifiers it was asked for.
pub struct RecordingRequester {
    events: Mutex<Vec<Event>>,
    identifiers: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fail_when: FailurePredicate,
    delay: Duration,
}

impl RecordingRequester {
    pub fn new() -> Self {
        Self::failing_when(|_| false)
    }

    pub fn failing_when<F>(predicate: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self {
            events: Mutex::new(Vec::new()),
            identifiers: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            fail_when: Box::new(predicate),
            delay: Duration::from_millis(2),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.identifiers
            .lock()
            .expect("identifier log poisoned")
            .clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl ItemRequester for RecordingRequester {
    fn issue(&self, item: WorkItem) -> BoxFuture<'_, RequestOutcome> {
        Box::pin(async move {
            let index = item.index();
            self.events
                .lock()
                .expect("event log poisoned")
                .push(Event::Launched(index));
            self.identifiers
                .lock()
                .expect("identifier log poisoned")
                .push(item.identifier().to_owned());
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

            // Staggered delays so completion order differs from launch order.
            let stagger = Duration::from_millis(index % 3);
            sleep(self.delay + stagger).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.events
                .lock()
                .expect("event log poisoned")
                .push(Event::Settled(index));

            if (self.fail_when)(index) {
                RequestOutcome::failure(RequestError::transport("boom"))
            } else {
                RequestOutcome::success(index.to_string())
            }
        })
    }
}

/// Asserts that no launch of batch `k + 1` precedes a settle of batch `k`.
pub fn assert_batches_do_not_overlap(events: &[Event], batch_size: u64) {
    let mut settled_per_batch = std::collections::HashMap::<u64, u64>::new();
    let mut launched_per_batch = std::collections::HashMap::<u64, u64>::new();

    for event in events {
        match event {
            Event::Launched(index) => {
                let batch = index / batch_size;
                if batch > 0 {
                    let previous_launched = launched_per_batch.get(&(batch - 1)).copied();
                    let previous_settled = settled_per_batch.get(&(batch - 1)).copied();
                    assert_eq!(
                        previous_launched, previous_settled,
                        "item {index} launched before batch {} fully settled",
                        batch - 1
                    );
                }
                *launched_per_batch.entry(batch).or_default() += 1;
            }
            Event::Settled(index) => {
                *settled_per_batch.entry(index / batch_size).or_default() += 1;
            }
        }
    }
}

pub async fn wait_for_completed_start(
    run: &Arc<DispatchRun>,
    target: u64,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = run.last_completed_start();
        if current.is_some_and(|completed| completed >= target) {
            return Ok(());
        }

        if start.elapsed() > timeout {
            let reported = current
                .map(|start| start.to_string())
                .unwrap_or_else(|| "<none>".to_owned());
            bail!(
                "dispatcher did not complete batch {target} within {:?} (last completed: {reported})",
                timeout
            );
        }

        sleep(Duration::from_millis(10)).await;
    }
}

//! Per-requester counters, broken down by how each request settled.

use crate::request::outcome::RequestError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct RequestMetrics {
    succeeded: AtomicU64,
    timeouts: AtomicU64,
    connect_errors: AtomicU64,
    status_errors: AtomicU64,
    body_errors: AtomicU64,
    transport_errors: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl RequestMetrics {
    /// Records one settled request; `error` is `None` for a success.
    pub(crate) fn observe(&self, error: Option<&RequestError>, latency: Duration) {
        let counter = match error {
            None => &self.succeeded,
            Some(RequestError::Timeout { .. }) => &self.timeouts,
            Some(RequestError::Connect { .. }) => &self.connect_errors,
            Some(RequestError::Status { .. }) => &self.status_errors,
            Some(RequestError::Body { .. }) => &self.body_errors,
            Some(RequestError::Transport { .. }) => &self.transport_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_sum_us.fetch_add(micros, Ordering::Relaxed);
        self.latency_max_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RequestMetricsSnapshot {
        let mut snapshot = RequestMetricsSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            connect_errors: self.connect_errors.load(Ordering::Relaxed),
            status_errors: self.status_errors.load(Ordering::Relaxed),
            body_errors: self.body_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            mean_latency: Duration::ZERO,
            max_latency: Duration::from_micros(self.latency_max_us.load(Ordering::Relaxed)),
        };

        let requests = snapshot.requests();
        if requests > 0 {
            let sum = self.latency_sum_us.load(Ordering::Relaxed);
            snapshot.mean_latency = Duration::from_micros(sum / requests);
        }
        snapshot
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RequestMetricsSnapshot {
    pub succeeded: u64,
    pub timeouts: u64,
    pub connect_errors: u64,
    pub status_errors: u64,
    pub body_errors: u64,
    pub transport_errors: u64,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

impl RequestMetricsSnapshot {
    pub fn failed(&self) -> u64 {
        self.timeouts
            + self.connect_errors
            + self.status_errors
            + self.body_errors
            + self.transport_errors
    }

    pub fn requests(&self) -> u64 {
        self.succeeded + self.failed()
    }
}

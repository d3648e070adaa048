use crate::dispatch::batch::BatchPlan;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

const UNINITIALIZED: u64 = u64::MAX;

/// Process-local state of one dispatch run: the plan and the start offset of
/// the next batch. Only the dispatcher advances it, after a batch has joined.
#[derive(Debug)]
pub struct DispatchRun {
    plan: BatchPlan,
    next_start: AtomicU64,
    last_completed: AtomicU64,
}

impl DispatchRun {
    pub fn new(plan: BatchPlan) -> Self {
        Self {
            plan,
            next_start: AtomicU64::new(0),
            last_completed: AtomicU64::new(UNINITIALIZED),
        }
    }

    pub fn plan(&self) -> BatchPlan {
        self.plan
    }

    /// Start offset of the batch that will be dispatched next.
    pub fn next_start(&self) -> u64 {
        self.next_start.load(Ordering::SeqCst)
    }

    /// Batch that will be dispatched next, or `None` once the run is exhausted.
    pub fn current_batch(&self) -> Option<Range<u64>> {
        self.plan.batch_at(self.next_start())
    }

    pub fn is_done(&self) -> bool {
        self.current_batch().is_none()
    }

    /// Start offset of the last fully settled batch.
    pub fn last_completed_start(&self) -> Option<u64> {
        match self.last_completed.load(Ordering::SeqCst) {
            UNINITIALIZED => None,
            value => Some(value),
        }
    }

    pub(crate) fn advance(&self, completed: &Range<u64>) {
        self.last_completed.store(completed.start, Ordering::SeqCst);
        self.next_start.store(completed.end, Ordering::SeqCst);
    }
}

use anyhow::{bail, Result};
use std::ops::Range;

/// Fixed-size partitioning of `[0, total)` into contiguous batches.
///
/// Batches tile the range exactly; only the final batch may be shorter than
/// `batch_size`, and only when `batch_size` does not divide `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total: u64,
    batch_size: usize,
}

impl BatchPlan {
    pub fn new(total: u64, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }
        Ok(Self { total, batch_size })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches needed to cover every item.
    pub fn batch_count(&self) -> u64 {
        self.total.div_ceil(self.batch_size as u64)
    }

    /// Batch starting at `start`, clamped to `total`. `None` once `start >= total`.
    pub fn batch_at(&self, start: u64) -> Option<Range<u64>> {
        if start >= self.total {
            return None;
        }
        let len = (self.batch_size as u64).min(self.total - start);
        Some(start..start + len)
    }

    pub fn batches(&self) -> Batches {
        Batches {
            plan: *self,
            next_start: 0,
        }
    }
}

impl IntoIterator for BatchPlan {
    type Item = Range<u64>;
    type IntoIter = Batches;

    fn into_iter(self) -> Self::IntoIter {
        self.batches()
    }
}

/// Iterator over the batches of a [`BatchPlan`] in increasing start order.
#[derive(Debug, Clone)]
pub struct Batches {
    plan: BatchPlan,
    next_start: u64,
}

impl Iterator for Batches {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.plan.batch_at(self.next_start)?;
        self.next_start = range.end;
        Some(range)
    }
}

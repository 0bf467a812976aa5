//! Per-driver document buffer.
//!
//! A [`Batch`] is owned by exactly one driver instance. Appending the item that
//! reaches capacity hands the whole buffer back to the caller for a bulk write
//! and leaves the batch empty, so a document can neither be sent twice nor
//! fall between two flushes as long as calls are not interleaved.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Batch<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Configuration("batch capacity must be at least 1".into()));
        }
        Ok(Self { items: Vec::with_capacity(capacity.min(DEFAULT_BATCH_SIZE)), capacity })
    }

    /// Appends `item`; returns the full batch when capacity has been reached.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.capacity { Some(self.drain()) } else { None }
    }

    /// Takes whatever is buffered, `None` when empty (completion barrier).
    pub fn take(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() { None } else { Some(self.drain()) }
    }

    fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity.min(DEFAULT_BATCH_SIZE)))
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }
}

/// What to do when a backend accepts a bulk write but rejects some items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectPolicy {
    /// Log and count rejected items, keep ingesting.
    #[default]
    Skip,
    /// Turn the flush into an ingest error.
    Abort,
}

/// Outcome of one bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl FlushReport {
    pub fn new(submitted: usize, failed: usize) -> Self {
        let failed = failed.min(submitted);
        Self { submitted, succeeded: submitted - failed, failed }
    }

    pub fn all_succeeded(submitted: usize) -> Self {
        Self::new(submitted, 0)
    }

    /// Logs the report and applies `policy` to rejected items.
    pub fn settle(self, engine: &str, policy: RejectPolicy) -> Result<Self> {
        if self.failed == 0 {
            tracing::debug!(engine, documents = self.succeeded, "wrote batch");
            return Ok(self);
        }
        tracing::warn!(
            engine,
            succeeded = self.succeeded,
            failed = self.failed,
            "backend rejected part of a batch"
        );
        match policy {
            RejectPolicy::Skip => Ok(self),
            RejectPolicy::Abort => Err(Error::Ingest(format!(
                "{} rejected {} of {} documents",
                engine, self.failed, self.submitted
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_exactly_once_at_capacity() {
        let mut batch = Batch::new(3).expect("batch");
        assert!(batch.push(1).is_none());
        assert!(batch.push(2).is_none());
        assert_eq!(batch.push(3), Some(vec![1, 2, 3]));
        assert!(batch.is_empty());
        assert!(batch.take().is_none());
    }

    #[test]
    fn no_document_lost_across_forced_flush() {
        let mut batch = Batch::new(4).expect("batch");
        let mut flushed = Vec::new();
        for i in 0..10 {
            if let Some(full) = batch.push(i) {
                flushed.push(full);
            }
            if i == 5 {
                flushed.extend(batch.take());
            }
        }
        flushed.extend(batch.take());
        let all: Vec<i32> = flushed.iter().flatten().copied().collect();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(flushed.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 2, 4]);
    }

    #[test]
    fn zero_capacity_is_a_configuration_error() {
        assert!(matches!(Batch::<u8>::new(0), Err(Error::Configuration(_))));
    }

    #[test]
    fn abort_policy_rejects_partial_batches() {
        let report = FlushReport::new(10, 2);
        assert_eq!(report.succeeded, 8);
        assert!(report.settle("test", RejectPolicy::Skip).is_ok());
        assert!(matches!(report.settle("test", RejectPolicy::Abort), Err(Error::Ingest(_))));
        assert!(FlushReport::all_succeeded(5).settle("test", RejectPolicy::Abort).is_ok());
    }
}

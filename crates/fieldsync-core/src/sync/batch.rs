//! Batch orchestrator

use serde::Serialize;

use super::operation::RawOperation;
use super::processor::OperationProcessor;
use super::result::{OperationResult, Outcome};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::Identity;

/// Default ceiling on operations per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Overall status of a processed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every operation succeeded (applied or cached)
    Completed,
    /// At least one operation conflicted or failed
    Partial,
}

/// Per-outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub applied: usize,
    pub cached: usize,
    pub conflicted: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Cached => self.cached += 1,
            Outcome::Conflicted => self.conflicted += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Results of one batch, in submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub summary: BatchSummary,
    pub results: Vec<OperationResult>,
}

/// Runs each operation of a batch as its own unit of work, in order.
///
/// No operation can affect another's outcome, other than through the
/// entity state an earlier one committed.
#[derive(Debug, Clone, Copy)]
pub struct BatchOrchestrator<'a> {
    processor: OperationProcessor<'a>,
    max_batch_size: usize,
}

impl<'a> BatchOrchestrator<'a> {
    pub const fn new(db: &'a Database, max_batch_size: usize) -> Self {
        Self {
            processor: OperationProcessor::new(db),
            max_batch_size,
        }
    }

    /// Process `operations` for `identity`.
    ///
    /// Rejects the whole batch with [`Error::CapacityExceeded`] before
    /// touching storage when it holds more than the configured maximum.
    pub fn process_batch(
        &self,
        operations: &[RawOperation],
        identity: &Identity,
    ) -> Result<BatchReport> {
        if operations.len() > self.max_batch_size {
            return Err(Error::CapacityExceeded {
                size: operations.len(),
                max: self.max_batch_size,
            });
        }

        let mut summary = BatchSummary::default();
        let results: Vec<_> = operations
            .iter()
            .enumerate()
            .map(|(index, operation)| {
                let processed = self.processor.process(index, operation, identity);
                summary.count(processed.outcome);
                processed.result
            })
            .collect();

        let status = if summary.conflicted + summary.failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Partial
        };

        tracing::info!(
            total = summary.total,
            applied = summary.applied,
            cached = summary.cached,
            conflicted = summary.conflicted,
            failed = summary.failed,
            "Processed sync batch"
        );

        Ok(BatchReport {
            status,
            summary,
            results,
        })
    }
}

//! Batch synchronization and conflict detection engine
//!
//! Leaves first: [`IdempotencyLedger`], [`VersionGuard`] and
//! [`ConflictRecorder`] are composed by the [`OperationProcessor`], which the
//! [`BatchOrchestrator`] runs once per operation.

mod batch;
mod conflicts;
mod guard;
mod ledger;
mod operation;
mod processor;
mod result;

pub use batch::{BatchOrchestrator, BatchReport, BatchStatus, BatchSummary, DEFAULT_MAX_BATCH_SIZE};
pub use conflicts::ConflictRecorder;
pub use guard::{Guarded, VersionGuard};
pub use ledger::{IdempotencyLedger, LedgerLookup};
pub use operation::{
    validate_idempotency_key, CreateInspection, DeleteInspection, Operation, OperationType,
    RawOperation, ReviewInspection, UpdateInspection, MAX_IDEMPOTENCY_KEY_LEN,
};
pub use processor::OperationProcessor;
pub use result::{
    ConflictData, ConflictResult, ErrorCode, FailureResult, OperationError, OperationResult,
    Outcome, Processed, SuccessResult,
};

//! Idempotency ledger record

use serde::{Deserialize, Serialize};

/// One accepted mutation, keyed by its client-generated idempotency key.
///
/// Written exactly once, in the same transaction as the mutation it
/// describes, and never updated or expired afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub idempotency_key: String,
    pub operation_type: String,
    /// Inspection the operation targeted
    pub entity_id: String,
    /// User id that submitted the operation
    pub user_id: String,
    /// Processing timestamp (Unix ms)
    pub processed_at: i64,
    /// Serialized success payload, replayed verbatim on duplicates
    pub result: String,
}

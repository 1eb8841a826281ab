//! Operation processor
//!
//! Runs one operation as one unit of work. The idempotency lookup happens
//! before any entity read or permission check, and the ledger record is
//! written in the same transaction as the mutation it describes.

use rusqlite::Transaction;
use serde_json::Value;

use super::conflicts::ConflictRecorder;
use super::guard::{Guarded, VersionGuard};
use super::ledger::{IdempotencyLedger, LedgerLookup};
use super::operation::{
    validate_idempotency_key, CreateInspection, DeleteInspection, Operation, RawOperation,
    ReviewInspection, UpdateInspection,
};
use super::result::{ConflictData, OperationError, OperationResult, Outcome, Processed};
use crate::db::{
    Database, InspectionRepository, SqliteInspectionRepository, SqliteTemplateRepository,
    TemplateRepository,
};
use crate::error::Error;
use crate::models::{Identity, Inspection, InspectionId, InspectionStatus, SyncOperation};

/// How a unit of work settled when its transaction commits
enum Settled {
    Cached(SyncOperation),
    Applied { entity_id: InspectionId, data: Value },
    Conflicted(ConflictData),
}

/// Why a unit of work rolled back
enum Aborted {
    Failed(OperationError),
    /// Another request recorded the same key first; replay its result
    AlreadyRecorded,
}

impl From<OperationError> for Aborted {
    fn from(error: OperationError) -> Self {
        Self::Failed(error)
    }
}

impl From<Error> for Aborted {
    fn from(error: Error) -> Self {
        Self::Failed(error.into())
    }
}

/// What a mutation produced before it is recorded
enum Mutated {
    Applied(Inspection),
    Conflicted(ConflictData),
}

/// Processes single operations against the authoritative database
#[derive(Debug, Clone, Copy)]
pub struct OperationProcessor<'a> {
    db: &'a Database,
}

impl<'a> OperationProcessor<'a> {
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Process one operation, reporting the result at position `index`.
    ///
    /// Never fails as a whole: every error is folded into the returned result.
    pub fn process(&self, index: usize, raw: &RawOperation, identity: &Identity) -> Processed {
        let key = raw.idempotency_key.as_str();
        let operation_type = raw.operation_type.as_str();

        let attempt = validate_idempotency_key(key)
            .map_err(Aborted::Failed)
            .and_then(|()| self.db.write(|tx| settle(tx, raw, identity)));
        let settled = self.recover(raw, attempt);

        let processed = match settled {
            Ok(Settled::Cached(operation)) => match parse_stored_result(&operation) {
                Ok(data) => Processed {
                    outcome: Outcome::Cached,
                    result: OperationResult::success(index, key, operation_type, data),
                },
                Err(error) => failed(
                    index,
                    raw,
                    OperationError::internal(format!("Stored result is unreadable: {error}")),
                ),
            },
            Ok(Settled::Applied { entity_id, data }) => {
                tracing::debug!(operation_type, entity_id = %entity_id, "Operation applied");
                Processed {
                    outcome: Outcome::Applied,
                    result: OperationResult::success(index, key, operation_type, data),
                }
            }
            Ok(Settled::Conflicted(conflict)) => Processed {
                outcome: Outcome::Conflicted,
                result: OperationResult::conflict(index, key, operation_type, conflict),
            },
            Err(error) => failed(index, raw, error),
        };

        if let Some(code) = processed.result.error_code() {
            tracing::info!(
                operation_type,
                outcome = processed.outcome.as_str(),
                error = code.as_str(),
                "Operation not applied"
            );
        }
        processed
    }

    /// Turn a rolled-back attempt into its final settlement.
    ///
    /// A unique violation on the ledger insert means another unit of work
    /// recorded the same key between our lookup and our insert. Our own
    /// mutation was rolled back, so the winner's stored result is replayed.
    fn recover(
        &self,
        raw: &RawOperation,
        attempt: Result<Settled, Aborted>,
    ) -> Result<Settled, OperationError> {
        match attempt {
            Ok(settled) => Ok(settled),
            Err(Aborted::AlreadyRecorded) => {
                tracing::debug!(
                    operation_type = %raw.operation_type,
                    "Idempotency key recorded concurrently; replaying"
                );
                self.replay(&raw.idempotency_key)
            }
            Err(Aborted::Failed(error)) => Err(error),
        }
    }

    fn replay(&self, key: &str) -> Result<Settled, OperationError> {
        match self.db.read(|conn| IdempotencyLedger::new(conn).lookup(key))? {
            LedgerLookup::Hit(operation) => Ok(Settled::Cached(operation)),
            LedgerLookup::Miss => Err(OperationError::internal(format!(
                "Ledger record for key `{key}` vanished"
            ))),
        }
    }
}

fn parse_stored_result(operation: &SyncOperation) -> serde_json::Result<Value> {
    serde_json::from_str(&operation.result)
}

fn failed(index: usize, raw: &RawOperation, error: OperationError) -> Processed {
    if error.code == super::ErrorCode::InternalError {
        tracing::error!(
            operation_type = %raw.operation_type,
            error = %error.message,
            "Operation failed"
        );
    }
    Processed {
        outcome: Outcome::Failed,
        result: OperationResult::failure(index, &raw.idempotency_key, &raw.operation_type, error),
    }
}

/// The whole unit of work for one operation, inside one write transaction
fn settle(
    tx: &Transaction<'_>,
    raw: &RawOperation,
    identity: &Identity,
) -> Result<Settled, Aborted> {
    let ledger = IdempotencyLedger::new(tx);
    if let LedgerLookup::Hit(operation) = ledger.lookup(&raw.idempotency_key)? {
        return Ok(Settled::Cached(operation));
    }

    let operation = Operation::decode(&raw.operation_type, &raw.data)?;
    let mutated = match &operation {
        Operation::Create(payload) => create(tx, payload, identity)?,
        Operation::Update(payload) => update(tx, payload, &raw.data, identity)?,
        Operation::Delete(payload) => delete(tx, payload, &raw.data, identity)?,
        Operation::Approve(payload) => {
            review(tx, payload, &raw.data, identity, InspectionStatus::Approved)?
        }
        Operation::Reject(payload) => {
            review(tx, payload, &raw.data, identity, InspectionStatus::Rejected)?
        }
    };

    let inspection = match mutated {
        Mutated::Applied(inspection) => inspection,
        Mutated::Conflicted(conflict) => return Ok(Settled::Conflicted(conflict)),
    };

    let data = inspection.snapshot()?;
    let record = SyncOperation {
        idempotency_key: raw.idempotency_key.clone(),
        operation_type: operation.operation_type().as_str().to_string(),
        entity_id: inspection.id.as_str(),
        user_id: identity.user_id.clone(),
        processed_at: chrono::Utc::now().timestamp_millis(),
        result: serde_json::to_string(&data).map_err(Error::from)?,
    };

    match ledger.record(&record) {
        Ok(()) => Ok(Settled::Applied {
            entity_id: inspection.id,
            data,
        }),
        Err(error) if error.is_unique_violation() => Err(Aborted::AlreadyRecorded),
        Err(error) => Err(error.into()),
    }
}

fn create(
    tx: &Transaction<'_>,
    payload: &CreateInspection,
    identity: &Identity,
) -> Result<Mutated, OperationError> {
    if SqliteTemplateRepository::new(tx).get(&payload.template_id)?.is_none() {
        return Err(OperationError::integrity(format!(
            "Template {} does not exist",
            payload.template_id
        )));
    }

    let repo = SqliteInspectionRepository::new(tx);
    let id = payload.id.unwrap_or_default();
    if repo.get_including_deleted(&id)?.is_some() {
        return Err(OperationError::integrity(format!("Inspection {id} already exists")));
    }

    let mut inspection = Inspection::new(
        id,
        payload.template_id,
        identity.user_id.clone(),
        payload.facility_name.trim(),
    );
    if let Some(address) = &payload.facility_address {
        inspection.facility_address.clone_from(address);
    }
    if let Some(responses) = &payload.responses {
        inspection.responses = responses.clone();
    }
    if let Some(status) = payload.status {
        inspection.transition_to(status, inspection.created_at);
    }

    match repo.insert(&inspection) {
        Ok(()) => Ok(Mutated::Applied(inspection)),
        Err(error) if error.is_unique_violation() => Err(OperationError::integrity(format!(
            "Inspection {id} already exists"
        ))),
        Err(error) => Err(error.into()),
    }
}

fn update(
    tx: &Transaction<'_>,
    payload: &UpdateInspection,
    client_payload: &Value,
    identity: &Identity,
) -> Result<Mutated, OperationError> {
    let guard = VersionGuard::new(tx);
    let current = guard.load(&payload.id)?;
    ensure_owner_or_manager(&current, identity)?;

    let outcome = guard.check_and_apply(&current, payload.version, |next| {
        if next.status == InspectionStatus::Approved {
            return Err(OperationError::invalid_state(
                "Approved inspections can no longer be edited",
            ));
        }
        if let Some(name) = &payload.facility_name {
            name.trim().clone_into(&mut next.facility_name);
        }
        if let Some(address) = &payload.facility_address {
            next.facility_address.clone_from(address);
        }
        if let Some(responses) = &payload.responses {
            next.responses = responses.clone();
        }
        if let Some(status) = payload.status {
            next.transition_to(status, chrono::Utc::now().timestamp_millis());
        }
        Ok(())
    })?;

    settle_guarded(tx, outcome, payload.version, client_payload)
}

fn delete(
    tx: &Transaction<'_>,
    payload: &DeleteInspection,
    client_payload: &Value,
    identity: &Identity,
) -> Result<Mutated, OperationError> {
    let guard = VersionGuard::new(tx);
    let current = guard.load(&payload.id)?;
    ensure_owner_or_manager(&current, identity)?;

    let outcome = guard.check_and_apply(&current, payload.version, |next| {
        next.is_deleted = true;
        next.deleted_by = Some(identity.user_id.clone());
        next.deleted_at = Some(chrono::Utc::now().timestamp_millis());
        Ok(())
    })?;

    settle_guarded(tx, outcome, payload.version, client_payload)
}

fn review(
    tx: &Transaction<'_>,
    payload: &ReviewInspection,
    client_payload: &Value,
    identity: &Identity,
    decision: InspectionStatus,
) -> Result<Mutated, OperationError> {
    let guard = VersionGuard::new(tx);
    let current = guard.load(&payload.id)?;
    if !identity.is_manager() {
        return Err(OperationError::permission_denied(
            "Only managers can review inspections",
        ));
    }

    let outcome = guard.check_and_apply(&current, payload.version, |next| {
        if next.status != InspectionStatus::Submitted {
            return Err(OperationError::invalid_state(format!(
                "Only submitted inspections can be {decision}, this one is {}",
                next.status
            )));
        }
        let now = chrono::Utc::now().timestamp_millis();
        next.status = decision;
        next.approved_by = Some(identity.user_id.clone());
        if decision == InspectionStatus::Approved {
            next.approved_at = Some(now);
            next.approval_notes.clone_from(&payload.notes);
        } else {
            next.rejected_at = Some(now);
            next.rejection_notes.clone_from(&payload.notes);
        }
        Ok(())
    })?;

    settle_guarded(tx, outcome, payload.version, client_payload)
}

/// Record a conflict, or pass the applied state through
fn settle_guarded(
    tx: &Transaction<'_>,
    outcome: Guarded,
    client_version: i64,
    client_payload: &Value,
) -> Result<Mutated, OperationError> {
    match outcome {
        Guarded::Applied { state, .. } => Ok(Mutated::Applied(state)),
        Guarded::Conflict {
            server_version,
            server_state,
        } => {
            let server_data = server_state.snapshot()?;
            let conflict_id = ConflictRecorder::new(tx).record(
                &server_state.id,
                client_version,
                server_version,
                client_payload,
                &server_data,
            )?;
            tracing::info!(
                entity_id = %server_state.id,
                client_version,
                server_version,
                conflict_id,
                "Version conflict recorded"
            );
            Ok(Mutated::Conflicted(ConflictData {
                client_version,
                server_version,
                server_data,
                conflict_id,
            }))
        }
    }
}

fn ensure_owner_or_manager(
    inspection: &Inspection,
    identity: &Identity,
) -> Result<(), OperationError> {
    if identity.is_manager() || inspection.inspector == identity.user_id {
        Ok(())
    } else {
        Err(OperationError::permission_denied(
            "Inspection belongs to another inspector",
        ))
    }
}

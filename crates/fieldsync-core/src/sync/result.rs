//! Per-operation result shapes and the stable error code taxonomy

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Error;
use crate::models::ConflictId;

/// Stable, contractual error codes. Human-readable messages are not contractual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Version mismatch; not a failure, carried by conflict results only
    Conflict,
    /// Malformed operation payload or idempotency key
    ValidationError,
    /// `operation_type` is not one the engine knows
    UnknownOperationType,
    /// Target entity does not exist (or is soft-deleted)
    NotFound,
    /// Referenced entity missing or identifier collision
    IntegrityError,
    /// Identity may not perform this mutation
    PermissionDenied,
    /// Mutation not allowed from the entity's current status
    InvalidState,
    /// Conflict record was already resolved
    AlreadyResolved,
    /// Storage or other unexpected failure
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::ValidationError => "validation_error",
            Self::UnknownOperationType => "unknown_operation_type",
            Self::NotFound => "not_found",
            Self::IntegrityError => "integrity_error",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidState => "invalid_state",
            Self::AlreadyResolved => "already_resolved",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure local to one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
}

impl OperationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IntegrityError, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for OperationError {}

impl From<Error> for OperationError {
    fn from(error: Error) -> Self {
        match &error {
            Error::NotFound(_) => Self::not_found(error.to_string()),
            Error::InvalidInput(_) => Self::validation(error.to_string()),
            Error::PermissionDenied(_) => Self::permission_denied(error.to_string()),
            Error::AlreadyResolved(_) => Self::new(ErrorCode::AlreadyResolved, error.to_string()),
            Error::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::integrity(error.to_string())
            }
            _ => Self::internal(error.to_string()),
        }
    }
}

/// Both sides of a rejected write, as reported to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictData {
    /// Base version the client submitted
    pub client_version: i64,
    /// Authoritative version at detection time
    pub server_version: i64,
    /// Authoritative state at detection time
    pub server_data: Value,
    /// Audit record created for this detection
    pub conflict_id: ConflictId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResult {
    pub index: usize,
    pub success: bool,
    pub idempotency_key: String,
    pub operation_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResult {
    pub index: usize,
    pub success: bool,
    pub error: ErrorCode,
    pub idempotency_key: String,
    pub operation_type: String,
    pub conflict_data: ConflictData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResult {
    pub index: usize,
    pub success: bool,
    pub error: ErrorCode,
    pub idempotency_key: String,
    pub operation_type: String,
    pub message: String,
}

/// Result of one operation, in one of three wire shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Success(SuccessResult),
    Conflict(ConflictResult),
    Failure(FailureResult),
}

impl OperationResult {
    pub fn success(
        index: usize,
        idempotency_key: impl Into<String>,
        operation_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self::Success(SuccessResult {
            index,
            success: true,
            idempotency_key: idempotency_key.into(),
            operation_type: operation_type.into(),
            data,
        })
    }

    pub fn conflict(
        index: usize,
        idempotency_key: impl Into<String>,
        operation_type: impl Into<String>,
        conflict_data: ConflictData,
    ) -> Self {
        Self::Conflict(ConflictResult {
            index,
            success: false,
            error: ErrorCode::Conflict,
            idempotency_key: idempotency_key.into(),
            operation_type: operation_type.into(),
            conflict_data,
        })
    }

    pub fn failure(
        index: usize,
        idempotency_key: impl Into<String>,
        operation_type: impl Into<String>,
        error: OperationError,
    ) -> Self {
        Self::Failure(FailureResult {
            index,
            success: false,
            error: error.code,
            idempotency_key: idempotency_key.into(),
            operation_type: operation_type.into(),
            message: error.message,
        })
    }

    /// Position of the operation in its batch
    pub const fn index(&self) -> usize {
        match self {
            Self::Success(result) => result.index,
            Self::Conflict(result) => result.index,
            Self::Failure(result) => result.index,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Error code for conflict and failure results
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success(_) => None,
            Self::Conflict(_) => Some(ErrorCode::Conflict),
            Self::Failure(result) => Some(result.error),
        }
    }
}

/// Terminal state an operation reached inside the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Key already known; stored result replayed
    Cached,
    /// Mutation committed and recorded in the ledger
    Applied,
    /// Version mismatch recorded; nothing applied
    Conflicted,
    /// Rejected; nothing written
    Failed,
}

impl Outcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Applied => "applied",
            Self::Conflicted => "conflicted",
            Self::Failed => "failed",
        }
    }
}

/// One processed operation: the wire result plus how it was reached
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub outcome: Outcome,
    pub result: OperationResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn success_shape_matches_wire_contract() {
        let result = OperationResult::success(
            0,
            "key-1",
            "CREATE_INSPECTION",
            json!({"id": "abc", "version": 1}),
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "index": 0,
                "success": true,
                "idempotency_key": "key-1",
                "operation_type": "CREATE_INSPECTION",
                "data": {"id": "abc", "version": 1}
            })
        );
    }

    #[test]
    fn conflict_shape_matches_wire_contract() {
        let result = OperationResult::conflict(
            3,
            "key-2",
            "UPDATE_INSPECTION",
            ConflictData {
                client_version: 2,
                server_version: 3,
                server_data: json!({"version": 3}),
                conflict_id: 9,
            },
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"], json!("conflict"));
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["index"], json!(3));
        assert_eq!(value["conflict_data"]["client_version"], json!(2));
        assert_eq!(value["conflict_data"]["server_version"], json!(3));
        assert_eq!(value["conflict_data"]["server_data"], json!({"version": 3}));
    }

    #[test]
    fn failure_shape_carries_stable_code() {
        let result = OperationResult::failure(
            1,
            "key-3",
            "BOGUS",
            OperationError::new(ErrorCode::UnknownOperationType, "nope"),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"], json!("unknown_operation_type"));
        assert_eq!(result.error_code(), Some(ErrorCode::UnknownOperationType));
        assert_eq!(result.index(), 1);
        assert!(!result.is_success());
    }

    #[test]
    fn core_errors_map_to_codes() {
        assert_eq!(
            OperationError::from(Error::NotFound("x".into())).code,
            ErrorCode::NotFound
        );
        assert_eq!(
            OperationError::from(Error::InvalidInput("x".into())).code,
            ErrorCode::ValidationError
        );
        assert_eq!(
            OperationError::from(Error::Database("x".into())).code,
            ErrorCode::InternalError
        );
    }
}

//! Operation envelope and typed payload decoding

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::result::{ErrorCode, OperationError};
use crate::models::{InspectionId, InspectionStatus, TemplateId};

/// Longest accepted idempotency key
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
const MAX_FACILITY_NAME_LEN: usize = 255;
const MAX_FACILITY_ADDRESS_LEN: usize = 500;
const MAX_NOTES_LEN: usize = 4_000;

/// One client-queued operation as handed over by the transport.
///
/// `operation_type` stays a raw string so that an unknown type is reported
/// on its own result instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    pub operation_type: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub data: Value,
}

impl RawOperation {
    pub fn new(
        operation_type: impl Into<String>,
        idempotency_key: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            idempotency_key: idempotency_key.into(),
            data,
        }
    }
}

/// Known operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    CreateInspection,
    UpdateInspection,
    DeleteInspection,
    ApproveInspection,
    RejectInspection,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInspection => "CREATE_INSPECTION",
            Self::UpdateInspection => "UPDATE_INSPECTION",
            Self::DeleteInspection => "DELETE_INSPECTION",
            Self::ApproveInspection => "APPROVE_INSPECTION",
            Self::RejectInspection => "REJECT_INSPECTION",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE_INSPECTION" => Ok(Self::CreateInspection),
            "UPDATE_INSPECTION" => Ok(Self::UpdateInspection),
            "DELETE_INSPECTION" => Ok(Self::DeleteInspection),
            "APPROVE_INSPECTION" => Ok(Self::ApproveInspection),
            "REJECT_INSPECTION" => Ok(Self::RejectInspection),
            other => Err(OperationError::new(
                ErrorCode::UnknownOperationType,
                format!("Invalid operation type: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateInspection {
    /// Client-minted id for records created offline; minted server-side when absent
    #[serde(default)]
    pub id: Option<InspectionId>,
    pub template_id: TemplateId,
    pub facility_name: String,
    #[serde(default)]
    pub facility_address: Option<String>,
    #[serde(default)]
    pub responses: Option<Value>,
    #[serde(default)]
    pub status: Option<InspectionStatus>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateInspection {
    pub id: InspectionId,
    /// Base version the edit was made against
    pub version: i64,
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub facility_address: Option<String>,
    #[serde(default)]
    pub responses: Option<Value>,
    #[serde(default)]
    pub status: Option<InspectionStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteInspection {
    pub id: InspectionId,
    pub version: i64,
}

/// Payload of approve/reject
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewInspection {
    pub id: InspectionId,
    pub version: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A decoded, validated operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CreateInspection),
    Update(UpdateInspection),
    Delete(DeleteInspection),
    Approve(ReviewInspection),
    Reject(ReviewInspection),
}

impl Operation {
    /// Decode and validate the payload for `operation_type`
    pub fn decode(operation_type: &str, data: &Value) -> Result<Self, OperationError> {
        let operation = match operation_type.parse::<OperationType>()? {
            OperationType::CreateInspection => Self::Create(parse_payload(data)?),
            OperationType::UpdateInspection => Self::Update(parse_payload(data)?),
            OperationType::DeleteInspection => Self::Delete(parse_payload(data)?),
            OperationType::ApproveInspection => Self::Approve(parse_payload(data)?),
            OperationType::RejectInspection => Self::Reject(parse_payload(data)?),
        };
        operation.validate()?;
        Ok(operation)
    }

    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::Create(_) => OperationType::CreateInspection,
            Self::Update(_) => OperationType::UpdateInspection,
            Self::Delete(_) => OperationType::DeleteInspection,
            Self::Approve(_) => OperationType::ApproveInspection,
            Self::Reject(_) => OperationType::RejectInspection,
        }
    }

    fn validate(&self) -> Result<(), OperationError> {
        match self {
            Self::Create(payload) => {
                validate_facility_name(&payload.facility_name)?;
                validate_address(payload.facility_address.as_deref())?;
                validate_responses(payload.responses.as_ref())?;
                validate_status(payload.status)
            }
            Self::Update(payload) => {
                validate_base_version(payload.version)?;
                if let Some(name) = &payload.facility_name {
                    validate_facility_name(name)?;
                }
                validate_address(payload.facility_address.as_deref())?;
                validate_responses(payload.responses.as_ref())?;
                validate_status(payload.status)
            }
            Self::Delete(payload) => validate_base_version(payload.version),
            Self::Approve(payload) | Self::Reject(payload) => {
                validate_base_version(payload.version)?;
                match &payload.notes {
                    Some(notes) if notes.chars().count() > MAX_NOTES_LEN => Err(
                        OperationError::validation(format!(
                            "notes must be at most {MAX_NOTES_LEN} characters"
                        )),
                    ),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Check an idempotency key before anything else touches the operation
pub fn validate_idempotency_key(key: &str) -> Result<(), OperationError> {
    if key.trim().is_empty() {
        return Err(OperationError::validation("idempotency_key is required"));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(OperationError::validation(format!(
            "idempotency_key must be at most {MAX_IDEMPOTENCY_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

fn parse_payload<T: DeserializeOwned>(data: &Value) -> Result<T, OperationError> {
    if !data.is_object() {
        return Err(OperationError::validation("data must be a JSON object"));
    }
    serde_json::from_value(data.clone())
        .map_err(|error| OperationError::validation(format!("Invalid payload: {error}")))
}

fn validate_base_version(version: i64) -> Result<(), OperationError> {
    if version < 1 {
        return Err(OperationError::validation("version must be at least 1"));
    }
    Ok(())
}

fn validate_facility_name(name: &str) -> Result<(), OperationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(OperationError::validation("facility_name must not be empty"));
    }
    if trimmed.chars().count() > MAX_FACILITY_NAME_LEN {
        return Err(OperationError::validation(format!(
            "facility_name must be at most {MAX_FACILITY_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_address(address: Option<&str>) -> Result<(), OperationError> {
    match address {
        Some(address) if address.chars().count() > MAX_FACILITY_ADDRESS_LEN => {
            Err(OperationError::validation(format!(
                "facility_address must be at most {MAX_FACILITY_ADDRESS_LEN} characters"
            )))
        }
        _ => Ok(()),
    }
}

fn validate_responses(responses: Option<&Value>) -> Result<(), OperationError> {
    match responses {
        Some(value) if !value.is_object() => Err(OperationError::validation(
            "responses must be a JSON object",
        )),
        _ => Ok(()),
    }
}

fn validate_status(status: Option<InspectionStatus>) -> Result<(), OperationError> {
    match status {
        Some(status) if !status.is_client_settable() => Err(OperationError::validation(format!(
            "status `{status}` can only be set by review"
        ))),
        _ => Ok(()),
    }
}

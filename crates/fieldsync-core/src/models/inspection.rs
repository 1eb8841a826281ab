//! Inspection model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::TemplateId;
use crate::error::Error;

/// A unique identifier for an inspection, using UUID v7 (time-sortable)
///
/// Clients working offline may mint their own ids; any UUID is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InspectionId(Uuid);

impl InspectionId {
    /// Create a new unique inspection ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for InspectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InspectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InspectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of an inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InspectionStatus {
    #[default]
    Draft,
    Submitted,
    Rejected,
    Approved,
}

impl InspectionStatus {
    /// Storage/wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
        }
    }

    /// Statuses an inspector may set directly through create/update.
    /// Approval and rejection only happen through the review operations.
    pub const fn is_client_settable(self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "rejected" => Ok(Self::Rejected),
            "approved" => Ok(Self::Approved),
            other => Err(Error::InvalidInput(format!(
                "unknown inspection status: {other}"
            ))),
        }
    }
}

/// An inspection record
///
/// `version` starts at 1 and is only ever advanced by the storage layer,
/// by exactly one per successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    /// Unique identifier
    pub id: InspectionId,
    /// Template the checklist responses answer
    pub template_id: TemplateId,
    /// User id of the inspector who created the record
    pub inspector: String,
    pub facility_name: String,
    pub facility_address: String,
    /// Checklist responses keyed by item
    pub responses: Value,
    pub status: InspectionStatus,
    /// Optimistic concurrency version
    pub version: i64,
    pub submitted_at: Option<i64>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
    pub approval_notes: Option<String>,
    pub rejected_at: Option<i64>,
    pub rejection_notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag; deleted rows are hidden from default reads
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<i64>,
}

impl Inspection {
    /// Create a fresh draft at version 1
    #[must_use]
    pub fn new(
        id: InspectionId,
        template_id: TemplateId,
        inspector: impl Into<String>,
        facility_name: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            template_id,
            inspector: inspector.into(),
            facility_name: facility_name.into(),
            facility_address: String::new(),
            responses: Value::Object(serde_json::Map::new()),
            status: InspectionStatus::Draft,
            version: 1,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            rejected_at: None,
            rejection_notes: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
        }
    }

    /// Move to a new status, stamping `submitted_at` on the first draft -> submitted edge
    pub fn transition_to(&mut self, status: InspectionStatus, now: i64) {
        if status == InspectionStatus::Submitted && self.status == InspectionStatus::Draft {
            self.submitted_at = Some(now);
        }
        self.status = status;
    }

    /// Full JSON snapshot, as returned to clients and captured in conflict records
    pub fn snapshot(&self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspection_id_unique() {
        assert_ne!(InspectionId::new(), InspectionId::new());
    }

    #[test]
    fn test_inspection_id_parse() {
        let id = InspectionId::new();
        let parsed: InspectionId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_new_inspection_starts_at_version_one() {
        let inspection = Inspection::new(InspectionId::new(), TemplateId::new(), "u-1", "Plant A");
        assert_eq!(inspection.version, 1);
        assert_eq!(inspection.status, InspectionStatus::Draft);
        assert!(!inspection.is_deleted);
        assert_eq!(inspection.created_at, inspection.updated_at);
    }

    #[test]
    fn test_submit_stamps_submitted_at_once() {
        let mut inspection =
            Inspection::new(InspectionId::new(), TemplateId::new(), "u-1", "Plant A");
        inspection.transition_to(InspectionStatus::Submitted, 42);
        assert_eq!(inspection.submitted_at, Some(42));

        inspection.transition_to(InspectionStatus::Submitted, 99);
        assert_eq!(inspection.submitted_at, Some(42));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            InspectionStatus::Draft,
            InspectionStatus::Submitted,
            InspectionStatus::Rejected,
            InspectionStatus::Approved,
        ] {
            assert_eq!(status.as_str().parse::<InspectionStatus>().unwrap(), status);
        }
        assert!(!InspectionStatus::Approved.is_client_settable());
    }

    #[test]
    fn test_snapshot_carries_id_and_version() {
        let inspection = Inspection::new(InspectionId::new(), TemplateId::new(), "u-1", "Plant A");
        let snapshot = inspection.snapshot().unwrap();
        assert_eq!(snapshot["id"], Value::String(inspection.id.to_string()));
        assert_eq!(snapshot["version"], Value::from(1));
        assert_eq!(snapshot["status"], Value::String("draft".to_string()));
    }
}

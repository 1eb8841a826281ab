//! Version conflict audit model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::InspectionId;
use crate::error::Error;

/// Conflict row identifier
pub type ConflictId = i64;

/// How a user chose to settle a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Client copy wins; the client resubmits against the server version
    KeepMine,
    /// Server copy wins; the client discards its edit
    KeepTheirs,
    /// User merged both sides by hand
    Merge,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepMine => "keep_mine",
            Self::KeepTheirs => "keep_theirs",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_mine" => Ok(Self::KeepMine),
            "keep_theirs" => Ok(Self::KeepTheirs),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution strategy: {other}"
            ))),
        }
    }
}

/// Snapshot of both sides of a rejected write, taken at detection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    /// Inspection the write targeted
    pub entity_id: InspectionId,
    /// Base version the client submitted
    pub client_version: i64,
    /// Authoritative version at detection time
    pub server_version: i64,
    /// Full payload the client submitted
    pub client_snapshot: Value,
    /// Full authoritative state at detection time
    pub server_snapshot: Value,
    pub resolved: bool,
    pub resolved_at: Option<i64>,
    pub resolved_by: Option<String>,
    pub resolution_strategy: Option<ResolutionStrategy>,
    /// Detection timestamp (Unix ms)
    pub created_at: i64,
}

/// Query parameters for listing conflicts
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConflictFilter {
    #[serde(default)]
    pub entity_id: Option<InspectionId>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(ResolutionStrategy::KeepTheirs).unwrap(),
            Value::String("keep_theirs".to_string())
        );
        assert_eq!(
            "keep_mine".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::KeepMine
        );
        assert!("overwrite".parse::<ResolutionStrategy>().is_err());
    }
}

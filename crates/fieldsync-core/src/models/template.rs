//! Inspection template model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(Uuid);

impl TemplateId {
    /// Create a new unique template ID
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

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TemplateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A checklist template that inspections are filled against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier
    pub id: TemplateId,
    pub name: String,
    /// Template revision
    pub version: i64,
    /// Array of checklist questions
    pub checklist_items: Value,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Template {
    /// Create a new template at revision 1
    #[must_use]
    pub fn new(name: impl Into<String>, checklist_items: Value) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            version: 1,
            checklist_items,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

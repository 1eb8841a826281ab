//! Authenticated principal model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Role granted to an authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Field inspector; may only touch inspections they created
    #[default]
    Inspector,
    /// Manager; may read and modify any inspection and run approvals
    Manager,
}

impl Role {
    /// Wire/storage name of the role
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inspector => "inspector",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inspector" => Ok(Self::Inspector),
            "manager" => Ok(Self::Manager),
            other => Err(Error::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

/// Identity resolved by the transport's auth layer and passed opaquely into
/// every engine call for attribution and permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier (JWT `sub`)
    pub user_id: String,
    /// Granted role
    pub role: Role,
}

impl Identity {
    /// Create an identity
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Shorthand for an inspector identity
    pub fn inspector(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Inspector)
    }

    /// Shorthand for a manager identity
    pub fn manager(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Manager)
    }

    pub const fn is_manager(&self) -> bool {
        matches!(self.role, Role::Manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!(" inspector ".parse::<Role>().unwrap(), Role::Inspector);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn identity_shorthands_set_role() {
        assert!(Identity::manager("m-1").is_manager());
        assert!(!Identity::inspector("i-1").is_manager());
    }
}

//! Acting principal and role definitions.
//!
//! The engine never consults ambient session state; every call receives an
//! explicit principal (or `None` for an unauthenticated caller).

use crate::id::ForgeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application roles, as assigned to user accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Administrator,
    Manager,
    TeamMember,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "ADMINISTRATOR",
            Role::Manager => "MANAGER",
            Role::TeamMember => "TEAM_MEMBER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: ForgeId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: ForgeId, role: Role) -> Self {
        Self { user_id, role }
    }
}

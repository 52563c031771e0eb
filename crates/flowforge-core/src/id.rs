//! Entity identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier shared by every Flowforge entity (workflows, phases, tasks,
/// edges, project records).
///
/// A random v4 uuid behind a newtype, serialized transparently so the wire
/// form is the plain hyphenated string. Duplication relies on fresh ids
/// being drawn per copied row rather than on any derivation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForgeId(Uuid);

impl ForgeId {
    /// Draw a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse the hyphenated string form, as stored in SQLite columns.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ForgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ForgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ForgeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ForgeId> for Uuid {
    fn from(id: ForgeId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ForgeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! Type-safe identifier for tracked agents.
//!
//! Agent identities are assigned by the caller (the driver app reports its
//! own numeric ID), so unlike generated identifiers there is no `new()`
//! constructor -- only conversions from the raw integer.

use serde::{Deserialize, Serialize};

/// Unique identifier for an agent (driver) tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub i64);

impl AgentId {
    /// Return the inner integer value.
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for AgentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AgentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<AgentId> for i64 {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_integer() {
        let id = AgentId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let back: AgentId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(AgentId::from(-7).to_string(), "-7");
        assert_eq!(i64::from(AgentId(9)), 9);
    }
}

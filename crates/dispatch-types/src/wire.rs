//! JSON payloads exchanged with driver apps and dispatch clients.
//!
//! Every response carries the `{success, message}` envelope; query
//! responses extend it with their result field.

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::location::Location;

/// A position ping sent by a driver app.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Unix timestamp (seconds) at which the position was observed.
    pub timestamp: i64,
    /// Identity of the reporting driver.
    #[serde(alias = "agentID", alias = "driver_id")]
    pub agent_id: AgentId,
    /// Reported position.
    pub location: Location,
}

/// Generic success/failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl DefaultResponse {
    /// Build a successful envelope.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Build a failure envelope.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Response to a point lookup by agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The agent that was found.
    pub agent: AgentId,
}

/// Response to a k-nearest query. `agents` is ordered nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Agent IDs by ascending distance; possibly empty.
    pub agents: Vec<AgentId>,
}

/// One recorded observation in an agent's position history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Observation timestamp (Unix seconds).
    pub timestamp: i64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Response listing an agent's recent positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The agent the history belongs to.
    pub agent: AgentId,
    /// Observations from least to most recently used.
    pub history: Vec<HistoryPoint>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_accepts_legacy_field_names() {
        let raw = r#"{"timestamp": 1700000000, "driver_id": 5, "location": {"lat": 1.5, "lon": 2.5}}"#;
        let payload: Payload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.agent_id, AgentId(5));
        assert_eq!(payload.timestamp, 1_700_000_000);
        assert_eq!(payload.location, Location::new(1.5, 2.5));

        let camel = r#"{"timestamp": 1, "agentID": 6, "location": {"lat": 0.0, "lon": 0.0}}"#;
        let payload: Payload = serde_json::from_str(camel).unwrap();
        assert_eq!(payload.agent_id, AgentId(6));
    }

    #[test]
    fn failure_envelope_serializes_flag() {
        let json = serde_json::to_value(DefaultResponse::failure("nope")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "nope");
    }
}

//! Error types for the `dispatch-store` crate.
//!
//! All fallible operations in this crate return [`StoreError`] through the
//! standard [`Result`] type alias.

use dispatch_types::AgentId;

/// Errors that can occur during store, cache, or index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A history cache was created with a non-positive capacity.
    #[error("history capacity must be greater than 0 (got {0})")]
    InvalidCapacity(usize),

    /// The spatial index fan-out cannot form a valid tree.
    #[error("invalid index fan-out: min {min}, max {max} (need 1 <= min <= max / 2)")]
    InvalidFanout {
        /// Minimum children per node.
        min: usize,
        /// Maximum children per node.
        max: usize,
    },

    /// A reported position has a NaN or infinite coordinate.
    #[error("agent {0} reported a non-finite location")]
    InvalidLocation(AgentId),

    /// No live agent has the requested identity.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The spatial index and the identity map disagree about an agent.
    ///
    /// Indicates a consistency bug; retrying will not help.
    #[error("spatial index removal failed for agent {0}")]
    RemovalFailed(AgentId),
}

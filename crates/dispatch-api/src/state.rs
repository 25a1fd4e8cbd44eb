//! Shared application state for the driver API.
//!
//! [`AppState`] holds the [`AgentStore`] and the [`ExpiryPolicy`] used to
//! turn ping timestamps into expiry deadlines. The store synchronizes
//! itself, so the state needs no extra locking.

use std::sync::Arc;

use dispatch_store::AgentStore;
use serde::Deserialize;

/// Default time-to-live for a position report, in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Derives an agent's expiry deadline from each ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExpiryPolicy {
    /// Seconds a report stays live. Zero or negative disables expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl ExpiryPolicy {
    /// Deadline for a ping observed at `timestamp`, or `None` if pings
    /// never expire.
    pub const fn expires_at(&self, timestamp: i64) -> Option<i64> {
        if self.ttl_secs <= 0 {
            return None;
        }
        Some(timestamp.saturating_add(self.ttl_secs))
    }
}

const fn default_ttl_secs() -> i64 {
    DEFAULT_TTL_SECS
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The live driver store.
    pub store: Arc<AgentStore>,
    /// How ping timestamps translate into expiry deadlines.
    pub expiry: ExpiryPolicy,
}

impl AppState {
    /// Create application state around an existing store.
    pub const fn new(store: Arc<AgentStore>, expiry: ExpiryPolicy) -> Self {
        Self { store, expiry }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(AgentStore::default()), ExpiryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_added_to_timestamp() {
        let policy = ExpiryPolicy { ttl_secs: 60 };
        assert_eq!(policy.expires_at(1_000), Some(1_060));
        assert_eq!(policy.expires_at(i64::MAX), Some(i64::MAX));
    }

    #[test]
    fn non_positive_ttl_never_expires() {
        assert_eq!(ExpiryPolicy { ttl_secs: 0 }.expires_at(1_000), None);
        assert_eq!(ExpiryPolicy { ttl_secs: -5 }.expires_at(1_000), None);
    }
}

//! Construction parameters for the [`AgentStore`](crate::AgentStore).
//!
//! Mirrors the `store` section of `dispatch-config.yaml`. All fields have
//! defaults so a partial section (or none at all) deserializes cleanly.

use serde::Deserialize;

use crate::error::StoreError;
use crate::spatial::check_fanout;

/// Default number of observations remembered per agent.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default minimum children per spatial index node.
pub const DEFAULT_MIN_CHILDREN: usize = 25;

/// Default maximum children per spatial index node.
pub const DEFAULT_MAX_CHILDREN: usize = 50;

/// Store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Capacity of each agent's position history cache.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Minimum children per spatial index node (root exempt).
    #[serde(default = "default_min_children")]
    pub min_children: usize,

    /// Maximum children per spatial index node before it splits.
    #[serde(default = "default_max_children")]
    pub max_children: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            min_children: DEFAULT_MIN_CHILDREN,
            max_children: DEFAULT_MAX_CHILDREN,
        }
    }
}

impl StoreConfig {
    /// Check that the parameters describe a constructible store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCapacity`] for a zero history capacity,
    /// or [`StoreError::InvalidFanout`] when the node fan-out cannot be
    /// split into two halves that each meet the minimum.
    pub const fn validate(&self) -> Result<(), StoreError> {
        if self.history_capacity == 0 {
            return Err(StoreError::InvalidCapacity(self.history_capacity));
        }
        check_fanout(self.min_children, self.max_children)
    }
}

const fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

const fn default_min_children() -> usize {
    DEFAULT_MIN_CHILDREN
}

const fn default_max_children() -> usize {
    DEFAULT_MAX_CHILDREN
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::spatial::SpatialIndex;

    #[test]
    fn defaults_are_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = StoreConfig {
            history_capacity: 0,
            ..StoreConfig::default()
        };
        assert_eq!(config.validate(), Err(StoreError::InvalidCapacity(0)));
    }

    #[test]
    fn fanout_must_allow_a_split() {
        let config = StoreConfig {
            min_children: 4,
            max_children: 6,
            ..StoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(StoreError::InvalidFanout { min: 4, max: 6 })
        );

        let zero_min = StoreConfig {
            min_children: 0,
            ..StoreConfig::default()
        };
        assert!(zero_min.validate().is_err());
    }

    #[test]
    fn config_and_index_agree_on_fanout() {
        for min_children in 0..6 {
            for max_children in 0..12 {
                let config = StoreConfig {
                    min_children,
                    max_children,
                    ..StoreConfig::default()
                };
                assert_eq!(
                    config.validate().is_ok(),
                    SpatialIndex::new(min_children, max_children).is_ok(),
                    "min {min_children}, max {max_children}"
                );
            }
        }
    }

    #[test]
    fn partial_section_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"history_capacity": 8}"#).unwrap();
        assert_eq!(config.history_capacity, 8);
        assert_eq!(config.min_children, DEFAULT_MIN_CHILDREN);
        assert_eq!(config.max_children, DEFAULT_MAX_CHILDREN);
    }
}

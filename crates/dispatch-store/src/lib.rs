//! Concurrent spatial store of live driver positions.
//!
//! This crate is the core of the dispatch service: it keeps the latest
//! position of every tracked agent, answers point lookups and
//! k-nearest-neighbour queries, remembers a bounded position history per
//! agent, and evicts agents whose reports have gone stale.
//!
//! # Modules
//!
//! - [`config`] -- [`StoreConfig`] construction parameters and defaults.
//! - [`error`] -- [`StoreError`] for every fallible operation.
//! - [`history`] -- [`HistoryCache`], an O(1) least-recently-used cache.
//! - [`spatial`] -- [`SpatialIndex`], an R-tree with best-first
//!   nearest-neighbour search.
//! - [`store`] -- [`AgentStore`], which binds the identity map, index, and
//!   histories into one consistent view behind a read/write lock.
//!
//! Expiration is passive: records carry a deadline and callers drive
//! [`AgentStore::sweep_expired`] with their own clock.

pub mod config;
pub mod error;
pub mod history;
pub mod spatial;
pub mod store;

// Re-export primary types at crate root.
pub use config::StoreConfig;
pub use error::StoreError;
pub use history::HistoryCache;
pub use spatial::{Neighbor, Rect, SpatialIndex};
pub use store::{AgentRecord, AgentSnapshot, AgentStore, SweepReport, is_expired};

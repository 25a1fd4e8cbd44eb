//! Shared type definitions for the dispatch service.
//!
//! This crate is the single source of truth for the value types passed
//! between the position store and its HTTP adapter.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier for tracked agents (drivers)
//! - [`location`] -- Geographic coordinates and planar distance
//! - [`wire`] -- JSON request payloads and response envelopes

pub mod ids;
pub mod location;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use ids::AgentId;
pub use location::Location;
pub use wire::{
    AgentResponse, DefaultResponse, HistoryPoint, HistoryResponse, NearestResponse, Payload,
};

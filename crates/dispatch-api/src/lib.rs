//! HTTP/JSON adapter for the dispatch driver-position store.
//!
//! Exposes [`dispatch_store::AgentStore`] over a small REST surface:
//! drivers post position pings, and dispatch clients look drivers up,
//! query the nearest ones to a point, read recent history, or remove
//! them.
//!
//! # Architecture
//!
//! - [`state`] -- [`AppState`] (the shared store) and [`ExpiryPolicy`]
//! - [`handlers`] -- REST endpoint handlers
//! - [`router`] -- Axum router assembly with CORS and request tracing
//! - [`server`] -- listener configuration and lifecycle
//! - [`error`] -- [`ApiError`] rendered as the JSON failure envelope

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::{AppState, ExpiryPolicy};

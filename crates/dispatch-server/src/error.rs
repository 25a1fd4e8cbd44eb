//! Error types for the dispatch server binary.

/// Top-level error for the dispatch server binary.
///
/// Each variant wraps a subsystem error so `main` can propagate any
/// startup failure with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: config::ConfigError,
    },

    /// The store rejected its construction parameters.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: dispatch_store::StoreError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: dispatch_api::ServerError,
    },
}

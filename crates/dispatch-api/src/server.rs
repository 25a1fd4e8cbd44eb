//! Dispatch HTTP server lifecycle management.
//!
//! Provides [`start_server`] which binds to a TCP port and runs the
//! Axum server until `Ctrl-C` is received.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// The TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Parse a `host:port` bind address. An empty host (`:8080`) binds
    /// every interface.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address has no port or the
    /// port is not a valid `u16`.
    pub fn from_bind_addr(addr: &str) -> Result<Self, ServerError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ServerError::Bind(format!("missing port in {addr:?}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ServerError::Bind(format!("invalid port in {addr:?}: {e}")))?;
        let host = if host.is_empty() {
            default_host()
        } else {
            host.trim_start_matches('[').trim_end_matches(']').to_owned()
        };
        Ok(Self { host, port })
    }

    /// Resolve the configured host and port into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the host is not an IP literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = self
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| ServerError::Bind(format!("invalid address {}: {e}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Start the dispatch HTTP server.
///
/// Binds to the configured address, builds the router, and serves
/// requests until `Ctrl-C`. Returns `Ok(())` on clean shutdown.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = config.socket_addr()?;
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "dispatch server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("dispatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_with_empty_host_uses_all_interfaces() {
        let config = ServerConfig::from_bind_addr(":9090").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:9090");
    }

    #[test]
    fn bind_addr_accepts_ipv6_brackets() {
        let config = ServerConfig::from_bind_addr("[::1]:7000").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.socket_addr().unwrap().port(), 7000);
    }

    #[test]
    fn bind_addr_rejects_missing_or_bad_port() {
        assert!(ServerConfig::from_bind_addr("localhost").is_err());
        assert!(ServerConfig::from_bind_addr("127.0.0.1:http").is_err());
        assert!(ServerConfig::from_bind_addr("127.0.0.1:70000").is_err());
    }
}

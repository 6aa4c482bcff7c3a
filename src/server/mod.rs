//! HTTP server components for conda-firewall
//!
//! This module provides the HTTP server infrastructure including:
//! - The gatekeeper router
//! - Logging and tracing middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{logging_middleware, tracing_middleware};
pub use router::{build_router, classify, AppState, ProxyRoute};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{Config, ServerConfig};
use crate::filter::parse_list;
use crate::models::NameSet;

/// HTTP Server for conda-firewall
///
/// Manages the axum server lifecycle, including:
/// - Binding to configured address
/// - Applying middleware layers
/// - Graceful shutdown handling
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the server from configuration, loading the filename index
    pub async fn from_config(config: Arc<Config>) -> Result<Self, ServerError> {
        let allowed = load_filename_index(&config).await?;
        let state = AppState::new(Arc::clone(&config), allowed)?;
        Ok(Self::new(config.server.clone(), state))
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([127, 0, 0, 1].into()),
            self.config.port,
        )
    }

    /// Run the server until shutdown signal is received
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Future that resolves when the server should shut down
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();
        let app = build_router(self.state).layer(tower_http::trace::TraceLayer::new_for_http());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Load the admitted-filename index written by the last sync
///
/// Returns `None` when package gating is disabled. When it is enabled the
/// index must exist; serving without it would forward everything.
pub async fn load_filename_index(config: &Config) -> Result<Option<NameSet>, ServerError> {
    if !config.server.gate_package_files {
        tracing::warn!("Package file gating disabled, every package request is forwarded");
        return Ok(None);
    }

    let path = config.filenames_index_path();
    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        ServerError::Config(format!(
            "Failed to read filename index {}: {} (run `conda-firewall sync` first)",
            path.display(),
            e
        ))
    })?;

    let names = parse_list(&content);
    tracing::info!(path = %path.display(), count = names.len(), "Loaded filename index");
    Ok(Some(names))
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn indexed_config(temp: &TempDir) -> Config {
        let config = Config {
            filtered_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        std::fs::write(config.filenames_index_path(), "c/noarch/a-1-0.conda\n").unwrap();
        config
    }

    // Test 1: from_config takes the listen address from the server section
    #[tokio::test]
    async fn test_from_config_bind_addr() {
        let temp = TempDir::new().unwrap();
        let mut config = indexed_config(&temp);
        config.server.host = "0.0.0.0".to_string();
        config.server.port = 9090;

        let server = Server::from_config(Arc::new(config.clone())).await.unwrap();
        assert_eq!(server.bind_addr().to_string(), "0.0.0.0:9090");

        config.server.host = "not-an-ip".to_string();
        let server = Server::from_config(Arc::new(config)).await.unwrap();
        assert_eq!(server.bind_addr().to_string(), "127.0.0.1:9090");
    }

    // Test 2: Without a synced index the server refuses to start
    #[tokio::test]
    async fn test_from_config_requires_sync() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            filtered_dir: temp.path().join("never-synced"),
            ..Default::default()
        };

        match Server::from_config(Arc::new(config)).await {
            Err(ServerError::Config(message)) => {
                assert!(message.contains("filenames.txt"));
                assert!(message.contains("conda-firewall sync"));
            }
            Err(other) => panic!("Expected ServerError::Config, got {:?}", other),
            Ok(_) => panic!("Expected the server to refuse to start"),
        }
    }

    // Test 3: Gating requires the filename index
    #[tokio::test]
    async fn test_load_filename_index_required_when_gating() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            filtered_dir: temp.path().to_path_buf(),
            ..Default::default()
        };

        let result = load_filename_index(&config).await;
        assert!(matches!(result, Err(ServerError::Config(_))));

        std::fs::write(
            config.filenames_index_path(),
            "conda-forge/noarch/a-1-0.conda\nconda-forge/noarch/b-1-0.conda\n",
        )
        .unwrap();
        let names = load_filename_index(&config).await.unwrap().unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("conda-forge/noarch/a-1-0.conda"));
    }

    // Test 4: Gating disabled needs no index
    #[tokio::test]
    async fn test_load_filename_index_disabled() {
        let temp = TempDir::new().unwrap();
        let mut config = Config {
            filtered_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        config.server.gate_package_files = false;

        assert_eq!(load_filename_index(&config).await.unwrap(), None);
    }

    // Test 5: from_config wires the index into the state
    #[tokio::test]
    async fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let config = indexed_config(&temp);

        let server = Server::from_config(Arc::new(config)).await.unwrap();
        let allowed = server.state.allowed_filenames.as_ref().unwrap();
        assert!(allowed.contains("c/noarch/a-1-0.conda"));
    }
}

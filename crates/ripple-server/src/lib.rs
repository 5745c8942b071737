//! Server layer for the ripple reactive notebook.
//!
//! One process hosts many Coordinators (one per live notebook), each with
//! its own kernel worker process, notebook mutex and background reader. The
//! mutation API is a thin translation layer over the Coordinator operations;
//! no business logic lives in the routes.

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod storage;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::auth::BearerIdentity;
use crate::coordinator::CoordinatorConfig;
use crate::registry::{KernelFactory, Registry};
use crate::routes::{create_router, AppState};
use crate::storage::{FsStore, MemoryStore, NotebookStore};

pub use crate::error::{ApiError, ApiResult};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface.
    pub bind_addr: SocketAddr,
    /// Storage root directory; `None` keeps notebooks in memory.
    pub storage_root: Option<PathBuf>,
    /// Override for the kernel binary path.
    pub kernel_path: Option<PathBuf>,
    /// Budget for synchronous registration round-trips, in seconds.
    pub register_timeout_secs: u64,
    /// Budget for `run_cell(wait=true)`, in seconds.
    pub run_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let timeouts = CoordinatorConfig::default();
        Self {
            bind_addr: ([127, 0, 0, 1], 8765).into(),
            storage_root: None,
            kernel_path: None,
            register_timeout_secs: timeouts.register_timeout.as_secs(),
            run_timeout_secs: timeouts.run_timeout.as_secs(),
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides (`RIPPLE_BIND_ADDR`,
    /// `RIPPLE_STORAGE_ROOT`, `RIPPLE_KERNEL_PATH`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("RIPPLE_BIND_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            }
        }
        if let Ok(root) = std::env::var("RIPPLE_STORAGE_ROOT") {
            config.storage_root = Some(PathBuf::from(root));
        }
        if let Ok(path) = std::env::var("RIPPLE_KERNEL_PATH") {
            config.kernel_path = Some(PathBuf::from(path));
        }
        config
    }
}

/// Build the shared application state for a configuration.
pub fn build_state(config: &ServerConfig) -> Arc<AppState> {
    let storage: Arc<dyn NotebookStore> = match &config.storage_root {
        Some(root) => Arc::new(FsStore::new(root.clone())),
        None => Arc::new(MemoryStore::new()),
    };
    let kernel_path = config.kernel_path.clone();
    let kernel_factory: KernelFactory = Arc::new(move || match &kernel_path {
        Some(path) => ripple_core::ipc::link::spawn_kernel_at(path),
        None => ripple_core::ipc::spawn_kernel(),
    });
    let coordinator_config = CoordinatorConfig {
        register_timeout: std::time::Duration::from_secs(config.register_timeout_secs),
        run_timeout: std::time::Duration::from_secs(config.run_timeout_secs),
        ..CoordinatorConfig::default()
    };
    let registry = Arc::new(Registry::new(storage, kernel_factory, coordinator_config));
    Arc::new(AppState {
        registry,
        auth: Arc::new(BearerIdentity),
    })
}

/// Serve the mutation API until ctrl-c.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config);
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("ripple server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    state.registry.shutdown_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8765);
        assert!(config.storage_root.is_none());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bind_addr.port(), 8765);
        let config: ServerConfig =
            serde_json::from_str(r#"{"bind_addr": "0.0.0.0:9000"}"#).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
    }
}

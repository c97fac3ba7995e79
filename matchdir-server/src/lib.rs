//! Matchdir Server - HTTP front door for the match directory
//!
//! Exposes the registry's named RPCs over HTTP:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   MatchDirServer                      │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │          matchdir-core::MatchRegistry           │  │
//! │  │           (all logic lives here)                │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                         │                             │
//! │      ┌──────────────────┼──────────────────┐         │
//! │      ▼                  ▼                  ▼         │
//! │   /health       /v1/rpc/:method       /rpc/:method    │
//! │                  (tagged JSON)       (legacy text)    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators are chosen from [`ServerConfig`]: file or in-memory
//! storage, HTTP or in-process accounts/provisioner, and an HTTP oracle or,
//! without one, an oracle that treats every match as live.

pub mod remote;
pub mod routes;
mod config;

pub use config::{ServerConfig, ServerConfigBuilder};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use matchdir_core::{
    AlwaysLiveOracle, FileStorage, InMemoryAccounts, MatchRegistry, NoopProvisioner,
    RegistryError, RpcMethod,
};

use remote::{http_client, HttpAccountManager, HttpMatchOracle, HttpProvisioner};

/// Shared application state
pub struct AppState {
    pub registry: MatchRegistry,
}

impl AppState {
    pub fn new(registry: MatchRegistry) -> Self {
        Self { registry }
    }
}

/// Assemble a registry from the server configuration
pub fn build_registry(config: &ServerConfig) -> Result<MatchRegistry, RegistryError> {
    let client = http_client(config.request_timeout_ms).map_err(|e| {
        RegistryError::InternalError {
            reason: format!("failed to build http client: {}", e),
        }
    })?;

    let mut builder = MatchRegistry::builder().config(config.registry.clone());

    if let Some(dir) = &config.storage_dir {
        tracing::info!("Using file storage at {:?}", dir);
        builder = builder.storage(Arc::new(FileStorage::new(dir.clone())?));
    }

    builder = match &config.oracle_url {
        Some(url) => builder.oracle(Arc::new(HttpMatchOracle::new(client.clone(), url)?)),
        None => {
            tracing::warn!("No oracle url configured; every match is treated as live");
            builder.oracle(Arc::new(AlwaysLiveOracle))
        }
    };

    builder = match &config.accounts_url {
        Some(url) => builder.accounts(Arc::new(HttpAccountManager::new(client.clone(), url)?)),
        None => builder.accounts(Arc::new(InMemoryAccounts::new())),
    };

    builder = match &config.provision_url {
        Some(url) => builder.provisioner(Arc::new(HttpProvisioner::new(client, url)?)),
        None => builder.provisioner(Arc::new(NoopProvisioner::new())),
    };

    Ok(builder.build())
}

/// Match directory HTTP server
///
/// # Example
///
/// ```rust,ignore
/// use matchdir_server::{build_registry, MatchDirServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ServerConfig::builder().port(8430).build();
///     let registry = build_registry(&config).unwrap();
///
///     let server = MatchDirServer::new(registry, config);
///     server.run().await.unwrap();
/// }
/// ```
pub struct MatchDirServer {
    state: Arc<AppState>,
    config: ServerConfig,
}

impl MatchDirServer {
    pub fn new(registry: MatchRegistry, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(registry)),
            config,
        }
    }

    /// Build the Axum router with all routes
    pub fn router(&self) -> Router {
        routes::create_router(Arc::clone(&self.state), self.config.cors_enabled)
    }

    /// Get the socket address for the server
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.config.port))
    }

    /// Run the server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();
        let addr = self.addr();

        tracing::info!("Matchdir Server listening on http://{}", addr);
        tracing::info!(
            "Storage: {}, page size {}",
            self.state.registry.storage_name(),
            self.state.registry.config().page_size
        );
        tracing::info!("Endpoints:");
        tracing::info!("  GET  /health");
        for method in RpcMethod::ALL {
            tracing::info!("  POST /v1/rpc/{}", method);
        }
        tracing::info!("  POST /rpc/:method (legacy)");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

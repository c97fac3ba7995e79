//! Matchdir Server Binary
//!
//! HTTP server exposing the match directory RPCs.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (port 8430, in-memory storage)
//! matchdir-server
//!
//! # Persist records and ask the game backend about match liveness
//! MATCHDIR_STORAGE_DIR=./data MATCHDIR_ORACLE_URL=http://backend:7350/v2 matchdir-server
//!
//! # Flags override the environment
//! matchdir-server --port 3000 --provision-url http://allocator:9000/nakama
//! ```

use std::path::PathBuf;

use clap::Parser;
use matchdir_server::{build_registry, MatchDirServer, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "matchdir-server")]
#[command(about = "Directory of joinable game matches")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for file-backed storage (in-memory when omitted)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Base URL of the match existence service
    #[arg(long)]
    oracle_url: Option<String>,

    /// Base URL of the account service
    #[arg(long)]
    accounts_url: Option<String>,

    /// Allocator URL notified when no joinable match exists
    #[arg(long)]
    provision_url: Option<String>,

    /// Records fetched per storage page
    #[arg(long)]
    page_size: Option<usize>,

    /// Disable CORS
    #[arg(long)]
    no_cors: bool,
}

impl Args {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.storage_dir {
            config.storage_dir = Some(dir);
        }
        if let Some(url) = self.oracle_url {
            config.oracle_url = Some(url);
        }
        if let Some(url) = self.accounts_url {
            config.accounts_url = Some(url);
        }
        if let Some(url) = self.provision_url {
            config.provision_url = Some(url);
        }
        if let Some(size) = self.page_size {
            config.registry.page_size = size.max(1);
        }
        if self.no_cors {
            config.cors_enabled = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "matchdir_server=info,matchdir_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().apply(ServerConfig::from_env());
    let registry = build_registry(&config)?;

    tracing::info!("Starting Matchdir Server v{}", env!("CARGO_PKG_VERSION"));

    let server = MatchDirServer::new(registry, config);
    server.run().await?;

    Ok(())
}

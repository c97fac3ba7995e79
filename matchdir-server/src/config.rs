//! Server configuration

use std::path::PathBuf;

use matchdir_core::{JoinSelection, RegistryConfig};

const DEFAULT_PORT: u16 = 8430;
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Directory for file storage; in-memory storage when unset
    pub storage_dir: Option<PathBuf>,
    /// Base URL of the match existence service; in-memory oracle when unset
    pub oracle_url: Option<String>,
    /// Base URL of the account service; in-memory accounts when unset
    pub accounts_url: Option<String>,
    /// Allocator notified when no joinable match exists; dropped when unset
    pub provision_url: Option<String>,
    /// Timeout for every outbound HTTP call
    pub request_timeout_ms: u64,
    pub registry: RegistryConfig,
}

impl ServerConfig {
    /// Create a new configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Read `MATCHDIR_*` environment variables, falling back to defaults
    ///
    /// | variable | field |
    /// |---|---|
    /// | `MATCHDIR_PORT` | `port` |
    /// | `MATCHDIR_CORS` | `cors_enabled` (`false`/`0` disables) |
    /// | `MATCHDIR_STORAGE_DIR` | `storage_dir` |
    /// | `MATCHDIR_ORACLE_URL` | `oracle_url` |
    /// | `MATCHDIR_ACCOUNTS_URL` | `accounts_url` |
    /// | `MATCHDIR_PROVISION_URL` | `provision_url` |
    /// | `MATCHDIR_TIMEOUT_MS` | `request_timeout_ms` |
    /// | `MATCHDIR_PAGE_SIZE` | `registry.page_size` |
    /// | `MATCHDIR_JOIN_SAMPLE` | `registry.join_selection` (random over N candidates) |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        let mut registry = RegistryConfig::builder();
        if let Some(size) = parse("MATCHDIR_PAGE_SIZE") {
            registry = registry.page_size(size as usize);
        }
        if let Some(sample) = parse("MATCHDIR_JOIN_SAMPLE").filter(|s| *s > 1) {
            registry = registry.join_selection(JoinSelection::Random {
                sample: sample as usize,
            });
        }

        let mut builder = ServerConfig::builder().registry(registry.build());
        if let Some(port) = parse("MATCHDIR_PORT").and_then(|p| u16::try_from(p).ok()) {
            builder = builder.port(port);
        }
        if let Some(cors) = lookup("MATCHDIR_CORS") {
            builder = builder.cors(!matches!(cors.trim(), "0" | "false" | "off"));
        }
        if let Some(dir) = lookup("MATCHDIR_STORAGE_DIR").filter(|v| !v.is_empty()) {
            builder = builder.storage_dir(dir);
        }
        if let Some(url) = lookup("MATCHDIR_ORACLE_URL").filter(|v| !v.is_empty()) {
            builder = builder.oracle_url(url);
        }
        if let Some(url) = lookup("MATCHDIR_ACCOUNTS_URL").filter(|v| !v.is_empty()) {
            builder = builder.accounts_url(url);
        }
        if let Some(url) = lookup("MATCHDIR_PROVISION_URL").filter(|v| !v.is_empty()) {
            builder = builder.provision_url(url);
        }
        if let Some(ms) = parse("MATCHDIR_TIMEOUT_MS") {
            builder = builder.request_timeout_ms(ms);
        }
        builder.build()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::default().build()
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    port: Option<u16>,
    cors_enabled: Option<bool>,
    storage_dir: Option<PathBuf>,
    oracle_url: Option<String>,
    accounts_url: Option<String>,
    provision_url: Option<String>,
    request_timeout_ms: Option<u64>,
    registry: Option<RegistryConfig>,
}

impl ServerConfigBuilder {
    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enable or disable CORS
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors_enabled = Some(enabled);
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn oracle_url(mut self, url: impl Into<String>) -> Self {
        self.oracle_url = Some(url.into());
        self
    }

    pub fn accounts_url(mut self, url: impl Into<String>) -> Self {
        self.accounts_url = Some(url.into());
        self
    }

    pub fn provision_url(mut self, url: impl Into<String>) -> Self {
        self.provision_url = Some(url.into());
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = Some(ms);
        self
    }

    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            port: self.port.unwrap_or(DEFAULT_PORT),
            cors_enabled: self.cors_enabled.unwrap_or(true),
            storage_dir: self.storage_dir,
            oracle_url: self.oracle_url,
            accounts_url: self.accounts_url,
            provision_url: self.provision_url,
            request_timeout_ms: self.request_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            registry: self.registry.unwrap_or_default(),
        }
    }
}

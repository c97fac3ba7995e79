//! Registry configuration

use serde::{Deserialize, Serialize};

/// Page size used when scanning a namespace
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How `find_joinable` picks among candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum JoinSelection {
    /// Stop at the first joinable match in listing order
    #[default]
    First,
    /// Collect up to `sample` joinable matches and pick one uniformly
    Random { sample: usize },
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Records fetched per list call during scans
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Extra attempts for an update that lost a version race
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,

    /// Also delete the storage entry of an orphaned record, not just the owner account
    #[serde(default = "default_true")]
    pub purge_orphaned_records: bool,

    /// Refuse to register a match the oracle does not know
    #[serde(default = "default_true")]
    pub verify_on_create: bool,

    #[serde(default)]
    pub join_selection: JoinSelection,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_update_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl RegistryConfig {
    /// Create a new configuration builder
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_update_retries: 3,
            purge_orphaned_records: true,
            verify_on_create: true,
            join_selection: JoinSelection::First,
        }
    }
}

/// Builder for RegistryConfig
#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    page_size: Option<usize>,
    max_update_retries: Option<u32>,
    purge_orphaned_records: Option<bool>,
    verify_on_create: Option<bool>,
    join_selection: Option<JoinSelection>,
}

impl RegistryConfigBuilder {
    /// Set the scan page size (clamped to at least 1)
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn max_update_retries(mut self, retries: u32) -> Self {
        self.max_update_retries = Some(retries);
        self
    }

    pub fn purge_orphaned_records(mut self, enabled: bool) -> Self {
        self.purge_orphaned_records = Some(enabled);
        self
    }

    pub fn verify_on_create(mut self, enabled: bool) -> Self {
        self.verify_on_create = Some(enabled);
        self
    }

    pub fn join_selection(mut self, selection: JoinSelection) -> Self {
        self.join_selection = Some(selection);
        self
    }

    /// Build the configuration
    pub fn build(self) -> RegistryConfig {
        let defaults = RegistryConfig::default();
        RegistryConfig {
            page_size: self.page_size.unwrap_or(defaults.page_size),
            max_update_retries: self.max_update_retries.unwrap_or(defaults.max_update_retries),
            purge_orphaned_records: self
                .purge_orphaned_records
                .unwrap_or(defaults.purge_orphaned_records),
            verify_on_create: self.verify_on_create.unwrap_or(defaults.verify_on_create),
            join_selection: self.join_selection.unwrap_or(defaults.join_selection),
        }
    }
}

//! # Matchdir Core - a directory of joinable matches
//!
//! Game-server processes advertise the matches they host; clients ask for a
//! match they can join or learn that none exists. Records live in an
//! external key-value store that only offers point read/write/delete and
//! cursor-paginated listing, so filtering, pagination and consistency repair
//! all happen here.
//!
//! ## Components
//!
//! - [`storage`]: the key-value substrate ([`StorageBackend`])
//! - [`record`]: the [`MatchRecord`] and its stored encoding
//! - [`liveness`]: "does this match still exist?" ([`MatchOracle`])
//! - [`gc`]: cleanup of orphaned records ([`AccountManager`])
//! - [`query`]: point lookups and filtered, bounded scans
//! - [`mutation`]: init / update / delete
//! - [`registry`]: the [`MatchRegistry`] facade
//! - [`rpc`]: named RPC dispatch with tagged replies
//!
//! The registry is lazily consistent: a record whose match has ended stays in
//! the store until the next read that touches it prunes it.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use matchdir_core::{InMemoryMatchOracle, InitParams, MatchRegistry, UpdateParams};
//!
//! # tokio_block_on(async {
//! let oracle = Arc::new(InMemoryMatchOracle::with_matches(["m1"]));
//! let registry = MatchRegistry::builder().oracle(oracle).build();
//!
//! registry
//!     .create_match(InitParams {
//!         namespace: "arena".to_string(),
//!         owner_id: "srv1".to_string(),
//!         match_id: "m1".to_string(),
//!         max_capacity: 10,
//!     })
//!     .await
//!     .unwrap();
//!
//! registry
//!     .update_match(UpdateParams {
//!         namespace: "arena".to_string(),
//!         owner_id: "srv1".to_string(),
//!         current_players: 4,
//!         current_clients: 5,
//!     })
//!     .await
//!     .unwrap();
//!
//! let entry = registry.query_one("arena", "srv1").await.unwrap().unwrap();
//! assert_eq!(entry.record.match_id, "m1");
//! assert_eq!(entry.record.current_players, 4);
//!
//! assert_eq!(registry.find_joinable("arena", Some(10)).await.unwrap().as_deref(), Some("m1"));
//! # });
//! # fn tokio_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gc;
pub mod liveness;
pub mod mutation;
pub mod provision;
pub mod query;
pub mod record;
pub mod registry;
pub mod rpc;
pub mod storage;

pub use config::{JoinSelection, RegistryConfig, RegistryConfigBuilder};
pub use error::{ErrorCategory, ErrorResponse, RegistryError, Result};
pub use gc::{AccountManager, GarbageCollector, InMemoryAccounts, PruneOutcome, PruneReason};
pub use liveness::{
    AlwaysLiveOracle, InMemoryMatchOracle, Liveness, LivenessVerifier, MatchOracle,
};
pub use mutation::{InitParams, MatchWriter, UpdateParams};
pub use provision::{NoopProvisioner, Provisioner, RecordingProvisioner};
pub use query::{MatchEntry, QueryEngine, QueryRequest};
pub use record::{record_key, MatchRecord, MATCH_RECORD_KIND};
pub use registry::{MatchRegistry, MatchRegistryBuilder};
pub use rpc::{dispatch, RpcMethod, RpcReply};
pub use storage::{
    FileStorage, InMemoryStorage, ListPage, ObjectKey, ReadPermission, StorageBackend,
    StorageWrite, StoredObject, WriteCondition, WritePermission,
};

/// Version of the matchdir-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

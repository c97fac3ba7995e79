//! Match liveness checks
//!
//! A record is only worth returning if the match it points at still exists.
//! The registry asks an external [`MatchOracle`]; the verifier turns the
//! answer into a [`Liveness`] verdict and never cleans anything up itself.
//! Cleanup is the [`GarbageCollector`](crate::gc::GarbageCollector)'s job.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{RegistryError, Result};
use crate::record::MatchRecord;

/// Answers "does match X still exist?"
#[async_trait]
pub trait MatchOracle: Send + Sync {
    async fn match_exists(&self, match_id: &str) -> Result<bool>;

    /// Oracle name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Verdict for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Live,
    /// Oracle reports the match is gone
    Gone,
    /// Oracle call failed; counts as not live
    Unreachable(String),
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live)
    }
}

/// Checks records against a match oracle
#[derive(Clone)]
pub struct LivenessVerifier {
    oracle: Arc<dyn MatchOracle>,
}

impl LivenessVerifier {
    pub fn new(oracle: Arc<dyn MatchOracle>) -> Self {
        Self { oracle }
    }

    pub async fn verify(&self, record: &MatchRecord) -> Liveness {
        self.verify_match(&record.match_id).await
    }

    pub async fn verify_match(&self, match_id: &str) -> Liveness {
        match self.oracle.match_exists(match_id).await {
            Ok(true) => Liveness::Live,
            Ok(false) => Liveness::Gone,
            Err(e) => {
                tracing::debug!(match_id, oracle = self.oracle.name(), "liveness check failed: {}", e);
                Liveness::Unreachable(e.to_string())
            }
        }
    }
}

/// In-process oracle backed by a set of live match ids
#[derive(Debug, Default)]
pub struct InMemoryMatchOracle {
    live: RwLock<HashSet<String>>,
}

impl InMemoryMatchOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle that already knows the given matches
    pub fn with_matches<I, S>(matches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            live: RwLock::new(matches.into_iter().map(Into::into).collect()),
        }
    }

    pub fn start_match(&self, match_id: impl Into<String>) {
        if let Ok(mut live) = self.live.write() {
            live.insert(match_id.into());
        }
    }

    pub fn end_match(&self, match_id: &str) {
        if let Ok(mut live) = self.live.write() {
            live.remove(match_id);
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.read().map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MatchOracle for InMemoryMatchOracle {
    async fn match_exists(&self, match_id: &str) -> Result<bool> {
        let live = self.live.read().map_err(|_| RegistryError::OracleUnavailable {
            reason: "oracle lock poisoned".to_string(),
        })?;
        Ok(live.contains(match_id))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Oracle that reports every match as live
///
/// Fallback when no match existence service is configured. Records are then
/// only removed by their owners.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysLiveOracle;

#[async_trait]
impl MatchOracle for AlwaysLiveOracle {
    async fn match_exists(&self, _match_id: &str) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "always-live"
    }
}

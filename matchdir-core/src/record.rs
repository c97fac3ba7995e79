//! Match record and its stored encoding
//!
//! A [`MatchRecord`] is what one game-server process advertises: which match
//! it hosts, how many players fit, and how many are currently connected. It
//! is stored as JSON under `(namespace, "MatchInfo", owner_id)` using the
//! field names existing game servers already emit:
//!
//! ```json
//! {"GameTag":"arena","ServerId":"srv1","MatchId":"m1","MaxNumPlayers":10,"NumPlayers":4,"NumClients":5}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::storage::ObjectKey;

/// Record kind identifier under which every match record is stored
pub const MATCH_RECORD_KIND: &str = "MatchInfo";

/// One advertised match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Matchmaking pool the record belongs to
    #[serde(rename = "GameTag")]
    pub namespace: String,

    /// Advertising server process
    #[serde(rename = "ServerId")]
    pub owner_id: String,

    /// Handle of the externally managed match instance
    #[serde(rename = "MatchId")]
    pub match_id: String,

    /// Advertised player capacity
    #[serde(rename = "MaxNumPlayers")]
    pub max_capacity: u32,

    #[serde(rename = "NumPlayers")]
    pub current_players: u32,

    /// Connected clients, may exceed players (spectators, reconnects)
    #[serde(rename = "NumClients")]
    pub current_clients: u32,
}

impl MatchRecord {
    /// Fresh record with zero occupancy
    pub fn new(
        namespace: impl Into<String>,
        owner_id: impl Into<String>,
        match_id: impl Into<String>,
        max_capacity: u32,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            owner_id: owner_id.into(),
            match_id: match_id.into(),
            max_capacity,
            current_players: 0,
            current_clients: 0,
        }
    }

    /// Storage key of this record
    pub fn key(&self) -> ObjectKey {
        record_key(&self.namespace, &self.owner_id)
    }

    /// Capacity predicate used by scans.
    ///
    /// `None` accepts everything; `Some(n)` accepts records with fewer than
    /// `n` current players. `maxCapacity` itself is not consulted.
    pub fn is_joinable(&self, capacity_filter: Option<u32>) -> bool {
        capacity_filter.map_or(true, |limit| self.current_players < limit)
    }

    /// Serialize to the stored representation
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored value.
    ///
    /// `key` only labels the error; a payload that does not match the record
    /// shape (including negative counts) is a `CorruptPayload`.
    pub fn decode(raw: &str, key: &ObjectKey) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RegistryError::CorruptPayload {
            namespace: key.namespace.clone(),
            owner_id: key.owner_id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Storage key for a `(namespace, owner_id)` pair
pub fn record_key(namespace: &str, owner_id: &str) -> ObjectKey {
    ObjectKey::new(namespace, MATCH_RECORD_KIND, owner_id)
}

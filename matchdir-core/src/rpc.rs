//! RPC dispatch
//!
//! Game servers and clients call the registry through seven named RPCs
//! carrying small JSON payloads. [`dispatch`] decodes the payload, runs the
//! operation and answers with an [`RpcReply`]: a tagged result that keeps
//! "nothing found", "bad input" and "backend down" apart. Older clients
//! that only understand "payload or empty string" get that via
//! [`RpcReply::into_legacy`].
//!
//! | method | payload fields | success payload |
//! |---|---|---|
//! | `RPCJoinOrNewMatch` | GameTag, MaxNumPlayers | match id |
//! | `RPCRemoveUserAccount` | UserId | empty |
//! | `RPCCreateMatch` | GameTag, ServerId, MatchId, MaxNumPlayers | `success` |
//! | `RPCUpdateMatch` | GameTag, ServerId, NumPlayers, NumClients | `success` |
//! | `RPCCleanMatch` | GameTag, ServerId | `success` |
//! | `RPCQueryMatch` | GameTag, ServerId | stored record JSON |
//! | `RPCQueryMatches` | GameTag, MaxNumPlayers, MaxNumRecords | JSON list of record JSON strings |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, RegistryError, Result};
use crate::mutation::{InitParams, UpdateParams};
use crate::query::QueryRequest;
use crate::registry::MatchRegistry;

const SUCCESS: &str = "success";

/// The registry's RPC surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    JoinOrNewMatch,
    RemoveUserAccount,
    CreateMatch,
    UpdateMatch,
    CleanMatch,
    QueryMatch,
    QueryMatches,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 7] = [
        RpcMethod::JoinOrNewMatch,
        RpcMethod::RemoveUserAccount,
        RpcMethod::CreateMatch,
        RpcMethod::UpdateMatch,
        RpcMethod::CleanMatch,
        RpcMethod::QueryMatch,
        RpcMethod::QueryMatches,
    ];

    /// Registered RPC name
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::JoinOrNewMatch => "RPCJoinOrNewMatch",
            RpcMethod::RemoveUserAccount => "RPCRemoveUserAccount",
            RpcMethod::CreateMatch => "RPCCreateMatch",
            RpcMethod::UpdateMatch => "RPCUpdateMatch",
            RpcMethod::CleanMatch => "RPCCleanMatch",
            RpcMethod::QueryMatch => "RPCQueryMatch",
            RpcMethod::QueryMatches => "RPCQueryMatches",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum RpcReply {
    Success(String),
    /// Well-formed request, nothing matched
    NoMatch,
    InvalidInput(String),
    BackendError(String),
}

impl RpcReply {
    /// Map a registry error onto the reply taxonomy
    pub fn from_error(err: &RegistryError) -> Self {
        match err.category() {
            ErrorCategory::NotFound => RpcReply::NoMatch,
            ErrorCategory::Validation => RpcReply::InvalidInput(err.to_string()),
            _ => RpcReply::BackendError(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RpcReply::Success(_))
    }

    /// Short status label
    pub fn status(&self) -> &'static str {
        match self {
            RpcReply::Success(_) => "success",
            RpcReply::NoMatch => "no_match",
            RpcReply::InvalidInput(_) => "invalid_input",
            RpcReply::BackendError(_) => "backend_error",
        }
    }

    /// Legacy wire format: the payload on success, an empty string otherwise
    pub fn into_legacy(self) -> String {
        match self {
            RpcReply::Success(payload) => payload,
            _ => String::new(),
        }
    }
}

fn no_filter() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct JoinOrNewMatchPayload {
    #[serde(rename = "GameTag", default)]
    game_tag: String,
    #[serde(rename = "MaxNumPlayers", default = "no_filter")]
    max_num_players: i64,
}

#[derive(Debug, Deserialize)]
struct RemoveUserAccountPayload {
    #[serde(rename = "UserId", default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateMatchPayload {
    #[serde(rename = "GameTag", default)]
    game_tag: String,
    #[serde(rename = "ServerId", default)]
    server_id: String,
    #[serde(rename = "MatchId", default)]
    match_id: String,
    #[serde(rename = "MaxNumPlayers")]
    max_num_players: u32,
}

#[derive(Debug, Deserialize)]
struct UpdateMatchPayload {
    #[serde(rename = "GameTag", default)]
    game_tag: String,
    #[serde(rename = "ServerId", default)]
    server_id: String,
    #[serde(rename = "NumPlayers")]
    num_players: u32,
    #[serde(rename = "NumClients")]
    num_clients: u32,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    #[serde(rename = "GameTag", default)]
    game_tag: String,
    #[serde(rename = "ServerId", default)]
    server_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryMatchesPayload {
    #[serde(rename = "GameTag", default)]
    game_tag: String,
    #[serde(rename = "MaxNumPlayers", default = "no_filter")]
    max_num_players: i64,
    #[serde(rename = "MaxNumRecords", default = "no_filter")]
    max_num_records: i64,
}

fn parse<T: DeserializeOwned>(method: RpcMethod, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| {
        tracing::error!(rpc = %method, payload, "received invalid payload: {}", e);
        RegistryError::MalformedRequest {
            reason: format!("invalid {} payload: {}", method, e),
        }
    })
}

/// Run the named RPC against the registry
pub async fn dispatch(registry: &MatchRegistry, method: &str, payload: &str) -> RpcReply {
    let Some(rpc) = RpcMethod::from_name(method) else {
        tracing::error!(method, "unknown rpc method");
        return RpcReply::InvalidInput(format!("unknown rpc method '{}'", method));
    };

    match call(registry, rpc, payload).await {
        Ok(reply) => reply,
        Err(e) => {
            let reply = RpcReply::from_error(&e);
            if matches!(reply, RpcReply::BackendError(_)) {
                tracing::error!(rpc = %rpc, code = e.error_code(), "rpc failed: {}", e);
            } else {
                tracing::info!(rpc = %rpc, code = e.error_code(), "rpc rejected: {}", e);
            }
            reply
        }
    }
}

async fn call(registry: &MatchRegistry, rpc: RpcMethod, payload: &str) -> Result<RpcReply> {
    match rpc {
        RpcMethod::JoinOrNewMatch => {
            let req: JoinOrNewMatchPayload = parse(rpc, payload)?;
            let filter = QueryRequest::from_legacy(&req.game_tag, "", req.max_num_players, -1);
            let found = registry
                .find_joinable(&req.game_tag, filter.capacity_filter)
                .await?;
            Ok(found.map_or(RpcReply::NoMatch, RpcReply::Success))
        }
        RpcMethod::RemoveUserAccount => {
            let req: RemoveUserAccountPayload = parse(rpc, payload)?;
            registry.remove_owner_account(&req.user_id).await?;
            Ok(RpcReply::Success(String::new()))
        }
        RpcMethod::CreateMatch => {
            let req: CreateMatchPayload = parse(rpc, payload)?;
            registry
                .create_match(InitParams {
                    namespace: req.game_tag,
                    owner_id: req.server_id,
                    match_id: req.match_id,
                    max_capacity: req.max_num_players,
                })
                .await?;
            Ok(RpcReply::Success(SUCCESS.to_string()))
        }
        RpcMethod::UpdateMatch => {
            let req: UpdateMatchPayload = parse(rpc, payload)?;
            registry
                .update_match(UpdateParams {
                    namespace: req.game_tag,
                    owner_id: req.server_id,
                    current_players: req.num_players,
                    current_clients: req.num_clients,
                })
                .await?;
            Ok(RpcReply::Success(SUCCESS.to_string()))
        }
        RpcMethod::CleanMatch => {
            let req: OwnerPayload = parse(rpc, payload)?;
            registry.delete_match(&req.game_tag, &req.server_id).await?;
            Ok(RpcReply::Success(SUCCESS.to_string()))
        }
        RpcMethod::QueryMatch => {
            let req: OwnerPayload = parse(rpc, payload)?;
            let entry = registry.query_one(&req.game_tag, &req.server_id).await?;
            Ok(entry.map_or(RpcReply::NoMatch, |e| RpcReply::Success(e.payload)))
        }
        RpcMethod::QueryMatches => {
            let req: QueryMatchesPayload = parse(rpc, payload)?;
            let request = QueryRequest::from_legacy(
                req.game_tag,
                "",
                req.max_num_players,
                req.max_num_records,
            );
            let entries = registry.query(&request).await?;
            if entries.is_empty() {
                return Ok(RpcReply::NoMatch);
            }
            let payloads: Vec<String> = entries.into_iter().map(|e| e.payload).collect();
            Ok(RpcReply::Success(serde_json::to_string(&payloads)?))
        }
    }
}

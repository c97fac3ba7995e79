//! RPC routes
//!
//! Both routes take the raw request body as the RPC payload and hand it to
//! [`matchdir_core::dispatch`]; they differ only in how the reply is framed.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use matchdir_core::{dispatch, RpcReply};

use crate::AppState;

fn status_code(reply: &RpcReply) -> StatusCode {
    match reply {
        RpcReply::Success(_) => StatusCode::OK,
        RpcReply::NoMatch => StatusCode::NOT_FOUND,
        RpcReply::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RpcReply::BackendError(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /v1/rpc/:method`: the tagged reply as JSON
pub async fn call_tagged(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    body: String,
) -> (StatusCode, Json<RpcReply>) {
    let reply = dispatch(&state.registry, &method, &body).await;
    tracing::debug!(method = %method, status = reply.status(), "rpc handled");
    (status_code(&reply), Json(reply))
}

/// `POST /rpc/:method`: payload on success, empty body otherwise, always 200
pub async fn call_legacy(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    body: String,
) -> String {
    let reply = dispatch(&state.registry, &method, &body).await;
    tracing::debug!(method = %method, status = reply.status(), "legacy rpc handled");
    reply.into_legacy()
}

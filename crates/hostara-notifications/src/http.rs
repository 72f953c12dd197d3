// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client notification channel: `GET /v1/ws` upgraded to a WebSocket.
//!
//! The connecting user is named by the `X-User-Id` header set by the
//! authenticating gateway. Frames from the server are JSON
//! `{"type": ..., "payload": ...}`.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hostara_protocol::RpcError;
use tracing::warn;
use uuid::Uuid;

use crate::connection::{self, ConnectionConfig};
use crate::error::HubError;
use crate::hub::Hub;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct WsState {
    pub hub: Hub,
    pub connection: ConnectionConfig,
}

pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/v1/ws", get(connect))
        .with_state(state)
}

fn caller(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

async fn connect(
    State(state): State<WsState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Some(owner) = caller(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(RpcError::new(
                "UNAUTHENTICATED",
                "missing or invalid X-User-Id header",
            )),
        )
            .into_response();
    };

    if state.hub.is_stopped() {
        warn!(%owner, "Rejecting connection, hub is shutting down");
        let e = HubError::ShuttingDown;
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RpcError::new(e.error_code(), e.to_string())),
        )
            .into_response();
    }

    let hub = state.hub;
    let config = state.connection;
    upgrade
        .max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            let tracked = hub.clone();
            // Registered only once the handshake completed.
            tracked.track(async move {
                match hub.register(owner).await {
                    Ok(client) => connection::serve(socket, client, hub, config).await,
                    Err(e) => warn!(%owner, error = %e, "Dropping upgraded connection"),
                }
            })
        })
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public HTTP/JSON API.
//!
//! | Method | Path                      | Body                  | Reply                  |
//! |--------|---------------------------|-----------------------|------------------------|
//! | POST   | `/v1/plans`               | `CreatePlanRequest`   | 201 `Plan`             |
//! | GET    | `/v1/plans?page=&size=`   |                       | `PageDocument<Plan>`   |
//! | GET    | `/v1/plans/{id}`          |                       | `Plan`                 |
//! | POST   | `/v1/servers`             | `CreateServerRequest` | 202 `Server`           |
//! | GET    | `/v1/servers?page=&size=` |                       | `PageDocument<Server>` |
//! | GET    | `/v1/servers/{id}`        |                       | `Server`               |
//! | DELETE | `/v1/servers/{id}`        |                       | 204                    |
//! | POST   | `/v1/servers/{id}/start`  |                       | `Server`               |
//! | POST   | `/v1/servers/{id}/stop`   |                       | `Server`               |
//!
//! Server routes act on behalf of the user named by the `X-User-Id` header,
//! which the authenticating gateway sets.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hostara_protocol::{Page, PageDocument, RpcError};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorKind, PlanError, ServerError};
use crate::plan::{Plan, PlanManager};
use crate::server::Server;
use crate::service::ServerService;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct ApiState {
    pub servers: Arc<dyn ServerService>,
    pub plans: PlanManager,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub name: String,
    pub cpu_cores: i32,
    pub ram_mb: i32,
    pub disk_gb: i32,
    pub ip_count: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    pub name: String,
    pub plan_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Error rendered as a status code plus `RpcError` body.
pub enum ApiError {
    Unauthenticated,
    Server(ServerError),
    Plan(PlanError),
}

impl From<ServerError> for ApiError {
    fn from(e: ServerError) -> Self {
        Self::Server(e)
    }
}

impl From<PlanError> for ApiError {
    fn from(e: PlanError) -> Self {
        Self::Plan(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                RpcError::new("UNAUTHENTICATED", "missing or invalid X-User-Id header"),
            ),
            Self::Server(e) => (status_for(e.kind()), RpcError::new(e.error_code(), e.to_string())),
            Self::Plan(e) => (status_for(e.kind()), RpcError::new(e.error_code(), e.to_string())),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn caller(headers: &HeaderMap) -> ApiResult<Uuid> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(ApiError::Unauthenticated)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/plans", get(search_plans).post(create_plan))
        .route("/v1/plans/{id}", get(get_plan))
        .route("/v1/servers", get(search_servers).post(create_server))
        .route("/v1/servers/{id}", get(get_server).delete(delete_server))
        .route("/v1/servers/{id}/start", post(start_server))
        .route("/v1/servers/{id}/stop", post(stop_server))
        .with_state(state)
}

async fn create_plan(
    State(state): State<ApiState>,
    Json(request): Json<CreatePlanRequest>,
) -> ApiResult<(StatusCode, Json<Plan>)> {
    let plan = state
        .plans
        .create(
            &request.name,
            request.cpu_cores,
            request.ram_mb,
            request.disk_gb,
            request.ip_count,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn search_plans(
    State(state): State<ApiState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PageDocument<Plan>>> {
    let page = Page::parse(query.page, query.size);
    let (plans, total) = state.plans.search(page).await?;
    Ok(Json(PageDocument::new(plans, page, total)))
}

async fn get_plan(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Plan>> {
    Ok(Json(state.plans.find_by_id(id).await?))
}

async fn create_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateServerRequest>,
) -> ApiResult<(StatusCode, Json<Server>)> {
    let owner = caller(&headers)?;
    let server = state
        .servers
        .create(&request.name, request.plan_id, owner)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(server)))
}

async fn search_servers(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PageDocument<Server>>> {
    let owner = caller(&headers)?;
    let page = Page::parse(query.page, query.size);
    let (servers, total) = state.servers.search(page, owner).await?;
    Ok(Json(PageDocument::new(servers, page, total)))
}

async fn get_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Server>> {
    let owner = caller(&headers)?;
    Ok(Json(state.servers.find_by_id(id, owner).await?))
}

async fn delete_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let owner = caller(&headers)?;
    state.servers.delete(id, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Server>> {
    let owner = caller(&headers)?;
    Ok(Json(state.servers.start(id, owner).await?))
}

async fn stop_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Server>> {
    let owner = caller(&headers)?;
    Ok(Json(state.servers.stop(id, owner).await?))
}

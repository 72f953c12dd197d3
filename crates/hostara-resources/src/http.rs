// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP/JSON boundary of the allocator.
//!
//! | Method | Path                          | Body              | Reply            |
//! |--------|-------------------------------|-------------------|------------------|
//! | POST   | `/v1/resources/consume`       | `ConsumeRequest`  | `ConsumeReply`   |
//! | POST   | `/v1/resources/return`        | `ReturnRequest`   | 204              |
//! | POST   | `/v1/pools`                   | `CreatePoolRequest` | 201 `Pool`     |
//! | GET    | `/v1/pools?page=&size=`       |                   | `PageDocument<Pool>` |
//! | GET    | `/v1/pools/{id}`              |                   | `Pool`           |
//! | POST   | `/v1/pools/{id}/resources`    | `Resource`        | `Pool`           |
//!
//! Errors are returned as `RpcError` bodies with a matching status code.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hostara_protocol::{ConsumeReply, ConsumeRequest, Page, PageDocument, Resource, ReturnRequest};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PoolError;
use crate::pool::Pool;
use crate::service::PoolService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub name: String,
    pub resource: Resource,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Error wrapper that renders a `PoolError` as a status + `RpcError` body.
pub struct ApiError(PoolError);

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PoolError::Validation(_) => StatusCode::BAD_REQUEST,
            PoolError::NotEnoughResources => StatusCode::CONFLICT,
            PoolError::PoolNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_rpc_error())).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(service: Arc<dyn PoolService>) -> Router {
    Router::new()
        .route("/v1/resources/consume", post(consume))
        .route("/v1/resources/return", post(return_resources))
        .route("/v1/pools", get(search_pools).post(create_pool))
        .route("/v1/pools/{id}", get(get_pool))
        .route("/v1/pools/{id}/resources", post(add_resources))
        .with_state(service)
}

async fn consume(
    State(service): State<Arc<dyn PoolService>>,
    Json(request): Json<ConsumeRequest>,
) -> ApiResult<Json<ConsumeReply>> {
    let pool_id = service.consume(request.resource).await?;
    Ok(Json(ConsumeReply { pool_id }))
}

async fn return_resources(
    State(service): State<Arc<dyn PoolService>>,
    Json(request): Json<ReturnRequest>,
) -> ApiResult<StatusCode> {
    service
        .return_resources(request.resource, request.pool_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_pool(
    State(service): State<Arc<dyn PoolService>>,
    Json(request): Json<CreatePoolRequest>,
) -> ApiResult<(StatusCode, Json<Pool>)> {
    let pool = service.create_pool(&request.name, request.resource).await?;
    Ok((StatusCode::CREATED, Json(pool)))
}

async fn search_pools(
    State(service): State<Arc<dyn PoolService>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PageDocument<Pool>>> {
    let page = Page::parse(query.page, query.size);
    let (pools, total) = service.search(page).await?;
    Ok(Json(PageDocument::new(pools, page, total)))
}

async fn get_pool(
    State(service): State<Arc<dyn PoolService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pool>> {
    Ok(Json(service.find_by_id(id).await?))
}

async fn add_resources(
    State(service): State<Arc<dyn PoolService>>,
    Path(id): Path<Uuid>,
    Json(resource): Json<Resource>,
) -> ApiResult<Json<Pool>> {
    Ok(Json(service.add_resources(resource, id).await?))
}

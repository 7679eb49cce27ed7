//! JSON routes used by the tracking script and the dashboard

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth;
use super::routing::{allocator, swap, VisitContext};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub company_id: i64,
    /// Identity the page persisted from an earlier swap
    pub guuid: Option<Uuid>,
    pub user_agent: Option<String>,
    pub http_referrer: Option<String>,
    pub landing_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapResponse {
    pub phone_number_id: i64,
    pub phone_number: String,
    pub guuid: Option<Uuid>,
    pub pool_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub phone_number_id: i64,
    pub ended_sessions: u64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/swap", post(swap_number))
        .route("/v1/pools/{pool_id}/numbers/{phone_number_id}", delete(release_pool_number))
}

async fn swap_number(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SwapRequest>,
) -> Result<Json<SwapResponse>, StatusCode> {
    let user_agent = req
        .user_agent
        .clone()
        .or_else(|| {
            headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();
    let ctx = VisitContext::new(&user_agent, req.http_referrer.as_deref(), req.landing_url.as_deref());

    let mut tx = state.store.begin().await.map_err(|e| {
        tracing::error!("Swap for company {} failed: {}", req.company_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let outcome = swap::swap(tx.as_mut(), req.company_id, req.guuid, &ctx, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!("Swap for company {} failed: {}", req.company_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    tx.commit().await.map_err(|e| {
        tracing::error!("Swap commit for company {} failed: {}", req.company_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(SwapResponse {
        phone_number_id: outcome.phone_number.id,
        phone_number: outcome.phone_number.e164(),
        guuid: outcome.guuid,
        pool_id: outcome.pool_id,
    }))
}

async fn release_pool_number(
    State(state): State<Arc<AppState>>,
    claims: auth::Claims,
    Path((pool_id, phone_number_id)): Path<(i64, i64)>,
) -> Result<Json<ReleaseResponse>, StatusCode> {
    let internal = |e: crate::server::store::StoreError| {
        tracing::error!("Releasing number {} from pool {} failed: {}", phone_number_id, pool_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let mut tx = state.store.begin().await.map_err(internal)?;

    let pool = tx.pool(pool_id).await.map_err(internal)?.ok_or(StatusCode::NOT_FOUND)?;
    let company = tx
        .company(pool.company_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if company.account_id != claims.account_id {
        tracing::warn!("User {} may not release numbers of pool {}", claims.sub, pool_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let ended = allocator::release_number(tx.as_mut(), pool_id, phone_number_id, Utc::now())
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    tx.commit().await.map_err(internal)?;

    Ok(Json(ReleaseResponse {
        phone_number_id,
        ended_sessions: ended,
    }))
}

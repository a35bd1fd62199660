//! HTTP surface over the retrieval engine: `/retrieve`, `/neighbors`,
//! `/by_ids`, `/health`. Parameter defaults match the tool-calling bridge's
//! expectations; malformed parameters are a 400, transient backend failures a
//! 503, and an empty result set is still a 200.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::context::RetrievalContext;
use crate::search::{by_ids, neighbors, retrieve};
use crate::types::{RetrieveError, RetrieveParams, Signal};

#[derive(Debug, Deserialize)]
struct RetrieveQuery {
    q: String,
    #[serde(default = "default_app")]
    app_name: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_pool")]
    pool: usize,
    #[serde(default = "default_signal")]
    signal: String,
    #[serde(default)]
    must: String,
    #[serde(default)]
    must_phrases: String,
    #[serde(default)]
    min_hits: usize,
    #[serde(default)]
    proximity: usize,
}

#[derive(Debug, Deserialize)]
struct NeighborsQuery {
    #[serde(default = "default_app")]
    app_name: String,
    source_path: String,
    seq_idx: u32,
    #[serde(default = "default_radius")]
    radius: u32,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct ByIdsQuery {
    #[serde(default = "default_app")]
    app_name: String,
}

#[derive(Debug, Deserialize)]
struct IdsBody {
    ids: Vec<String>,
}

fn default_app() -> String {
    "claims".to_string()
}

fn default_top_k() -> usize {
    8
}

fn default_pool() -> usize {
    50
}

fn default_signal() -> String {
    "hybrid".to_string()
}

fn default_radius() -> u32 {
    1
}

fn default_limit() -> usize {
    10
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn map_error(err: RetrieveError) -> ApiError {
    let status = match &err {
        RetrieveError::BadRequest(_) => StatusCode::BAD_REQUEST,
        RetrieveError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        RetrieveError::Internal(e) => {
            tracing::error!(error = %e, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

async fn handle_retrieve(
    State(ctx): State<Arc<RetrievalContext>>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signal: Signal = query.signal.parse().map_err(map_error)?;

    let must: Vec<String> = query
        .must
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();
    let must_phrases: Vec<String> = query
        .must_phrases
        .split(';')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect();

    let params = RetrieveParams {
        q: query.q,
        app: query.app_name,
        top_k: query.top_k,
        pool: query.pool,
        signal,
        must,
        must_phrases,
        min_hits: query.min_hits,
        proximity: query.proximity,
    };

    let response = retrieve(&ctx, params).await.map_err(map_error)?;
    Ok(Json(serde_json::to_value(response).unwrap_or_default()))
}

async fn handle_neighbors(
    State(ctx): State<Arc<RetrievalContext>>,
    Query(query): Query<NeighborsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chunks = neighbors(
        &ctx,
        &query.app_name,
        &query.source_path,
        query.seq_idx,
        query.radius,
        query.limit,
    )
    .await
    .map_err(map_error)?;

    Ok(Json(serde_json::json!({
        "app": query.app_name,
        "source_path": query.source_path,
        "seq_idx": query.seq_idx,
        "results": chunks,
    })))
}

async fn handle_by_ids(
    State(ctx): State<Arc<RetrievalContext>>,
    Query(query): Query<ByIdsQuery>,
    Json(body): Json<IdsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chunks = by_ids(&ctx, &query.app_name, &body.ids)
        .await
        .map_err(map_error)?;

    Ok(Json(serde_json::json!({
        "app": query.app_name,
        "results": chunks,
    })))
}

async fn handle_health(
    State(ctx): State<Arc<RetrievalContext>>,
) -> Json<serde_json::Value> {
    let mut apps = BTreeMap::new();
    for collection in &ctx.config.collections {
        apps.insert(
            collection.app.clone(),
            serde_json::json!({
                "collection": collection.name,
                "sparse_available": ctx.lexical_for_app(&collection.app).is_some(),
                "neighbors_available": ctx.neighbors_for_app(&collection.app).is_some(),
            }),
        );
    }
    Json(serde_json::json!({ "status": "ok", "apps": apps }))
}

pub fn router(ctx: Arc<RetrievalContext>) -> Router {
    Router::new()
        .route("/retrieve", get(handle_retrieve))
        .route("/neighbors", get(handle_neighbors))
        .route("/by_ids", post(handle_by_ids))
        .route("/health", get(handle_health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}

pub async fn serve(ctx: Arc<RetrievalContext>, bind: &str) -> Result<()> {
    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(bind, "Serving retrieval API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Shutting down");
}

#![forbid(unsafe_code)]

//! Small Axum backend over the collected content. It lists rows, returns a
//! single row, reports totals, and flips the `consumed` flag; everything else
//! about a row is owned by the collector.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        Path as AxumPath, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use clap::Parser;
use content_feed_tools::{
    config::{ConfigOverrides, resolve_viewer_config},
    logging::init_tracing,
    store::{ConsumedFilter, ContentRecord, ContentStats, ContentStore},
};
use serde::Deserialize;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "viewer", about = "Serve collected content as a JSON API")]
struct ViewerArgs {
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
    /// Local database file; overrides CONTENT_DB_PATH and CONTENT_DB_URL.
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

impl ViewerArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            env_path: self.env_file,
            db_path: self.db_path,
            viewer_host: self.host,
            viewer_port: self.port,
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Clone)]
struct AppState {
    store: ContentStore,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Logs the full chain but only returns a generic message to the client.
    fn internal(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    filter: Option<ConsumedFilter>,
}

#[derive(Debug, Deserialize)]
struct ConsumedUpdate {
    consumed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("content_feed_tools=info,viewer=info");
    let args = ViewerArgs::parse();
    let config = resolve_viewer_config(args.into_overrides()).context("loading configuration")?;

    let host = parse_host(&config.host)?;
    let store = ContentStore::open(&config.store)
        .await
        .context("opening content store")?;

    let app = router(AppState { store });

    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, "viewer listening");
    println!("Viewer API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running viewer API")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/content", get(list_content))
        .route("/api/content/{id}", get(get_content))
        .route("/api/content/{id}/consumed", put(update_consumed))
        .route("/api/stats", get(get_stats))
        .fallback(|| async { ApiError::not_found("endpoint not found") })
        .with_state(state)
}

fn parse_host(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .with_context(|| format!("expected an IPv4 or IPv6 address for VIEWER_HOST, got {value:?}"))
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {err}");
    }
}

/// Defaults to unconsumed rows, the viewer's reading queue.
async fn list_content(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<ContentRecord>>> {
    let Query(params) = params.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let filter = params.filter.unwrap_or(ConsumedFilter::Unconsumed);
    let records = state
        .store
        .list_content(filter)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(records))
}

async fn get_content(
    State(state): State<AppState>,
    id: Result<AxumPath<i64>, PathRejection>,
) -> ApiResult<Json<ContentRecord>> {
    let AxumPath(id) = id.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    match state.store.get_content(id).await.map_err(ApiError::internal)? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::not_found(format!("content {id} not found"))),
    }
}

async fn update_consumed(
    State(state): State<AppState>,
    id: Result<AxumPath<i64>, PathRejection>,
    body: Result<Json<ConsumedUpdate>, JsonRejection>,
) -> ApiResult<Json<ContentRecord>> {
    let AxumPath(id) = id.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let Json(update) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let found = state
        .store
        .set_consumed(id, update.consumed)
        .await
        .map_err(ApiError::internal)?;
    if !found {
        return Err(ApiError::not_found(format!("content {id} not found")));
    }
    info!(id, consumed = update.consumed, "updated consumed flag");

    match state.store.get_content(id).await.map_err(ApiError::internal)? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::not_found(format!("content {id} not found"))),
    }
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<ContentStats>> {
    let stats = state.store.stats().await.map_err(ApiError::internal)?;
    Ok(Json(stats))
}

//! HTTP daemon/server mode for `addrgram`.
//!
//! This module exposes a small HTTP+JSON API over one loaded corpus and
//! index:
//!
//! - `POST /v1/search` – accepts a JSON-encoded `SearchRequest` and
//!   returns a `SearchResult` from the current snapshot.
//! - `POST /v1/index` – rebuilds the index from the server's
//!   `IndexConfig`, persists it, publishes the new snapshot and returns
//!   an `IndexSummary`.
//! - `GET /v1/index/info` – summary of the persisted index.
//! - `GET /v1/health` – simple health check endpoint.
//!
//! Queries never block on a rebuild: they run against whichever
//! snapshot was current when they started.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::index::{get_index_info, IndexError};
use crate::models::{IndexConfig, IndexSummary, SearchRequest, SearchResult};
use crate::search::{search_snapshot, SearchSnapshot, SnapshotHandle};

/// Simple health-check response payload.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    documents: usize,
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared state behind every handler.
pub struct AppState {
    config: IndexConfig,
    snapshot: SnapshotHandle,
    rebuild: Mutex<()>,
}

impl AppState {
    pub fn new(config: IndexConfig, snapshot: SearchSnapshot) -> Self {
        Self {
            config,
            snapshot: SnapshotHandle::new(snapshot),
            rebuild: Mutex::new(()),
        }
    }

    /// Load the persisted index for `config`, building it first when
    /// none exists yet.
    pub async fn load(config: IndexConfig) -> Result<Self> {
        let load_config = config.clone();
        let snapshot =
            tokio::task::spawn_blocking(move || SearchSnapshot::load_or_build(&load_config))
                .await??;
        Ok(Self::new(config, snapshot))
    }
}

/// Error type used by HTTP handlers to map internal failures into
/// JSON error responses.
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

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        match err.downcast_ref::<IndexError>() {
            Some(IndexError::NotFound(_)) => Self {
                status: StatusCode::NOT_FOUND,
                message,
            },
            Some(IndexError::CorpusMismatch { .. }) => Self {
                status: StatusCode::CONFLICT,
                message,
            },
            _ => ApiError::bad_request(message),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::internal(format!("worker task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the Axum router for the addrgram HTTP API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/search", post(search))
        .route("/v1/index", post(index))
        .route("/v1/index/info", get(index_info))
        .with_state(state)
}

/// Run the HTTP server bound to the provided socket address.
///
/// This is used by the CLI `addrgram serve` subcommand.
pub async fn run(addr: SocketAddr, config: IndexConfig) -> Result<()> {
    let state = AppState::load(config).await?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "addrgram server listening");
    serve_with_listener(listener, Arc::new(state)).await
}

/// Run the HTTP server using an existing `TcpListener`.
///
/// This is primarily used in tests to bind to an ephemeral port.
pub async fn serve_with_listener(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        documents: state.snapshot.load().corpus().len(),
    })
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResult>, ApiError> {
    // Verification can touch every record; keep it off the async workers.
    let snapshot = state.snapshot.load();
    let result = tokio::task::spawn_blocking(move || {
        search_snapshot(&snapshot, &request.keyword, &request.options)
    })
    .await?;
    Ok(Json(result))
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Json<IndexSummary>, ApiError> {
    let worker = Arc::clone(&state);
    let summary = tokio::task::spawn_blocking(move || -> Result<IndexSummary> {
        let _guard = worker
            .rebuild
            .lock()
            .map_err(|_| anyhow!("a previous rebuild panicked"))?;
        let (snapshot, summary) = SearchSnapshot::rebuild(&worker.config)?;
        worker.snapshot.publish(snapshot);
        Ok(summary)
    })
    .await??;

    Ok(Json(summary))
}

async fn index_info(State(state): State<Arc<AppState>>) -> Result<Json<IndexSummary>, ApiError> {
    let summary = tokio::task::spawn_blocking(move || get_index_info(&state.config)).await??;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::index::run_index;
    use crate::models::{CorpusConfig, EmptyKeywordPolicy, IndexBackendKind, QueryOptions};

    const CSV: &str = "zip,pref,city,town\n\
                       150-0002,東京都,渋谷区,渋谷\n\
                       530-0001,大阪府,大阪市北区,梅田\n";

    fn config_for(dir: &Path) -> IndexConfig {
        let corpus_path = dir.join("addresses.csv");
        fs::write(&corpus_path, CSV).expect("write corpus");

        IndexConfig {
            corpus: CorpusConfig {
                path: corpus_path,
                fields: vec!["pref".to_string(), "city".to_string(), "town".to_string()],
                display_fields: vec!["zip".to_string(), "town".to_string()],
                delimiter: ',',
            },
            backend: IndexBackendKind::Sqlite,
            index_path: dir.join(".addrgram").join("index.sqlite"),
            ngram_size: 2,
            parallel: false,
        }
    }

    async fn state_for(dir: &Path) -> Arc<AppState> {
        Arc::new(AppState::load(config_for(dir)).await.expect("state"))
    }

    fn request(keyword: &str) -> Json<SearchRequest> {
        Json(SearchRequest {
            keyword: keyword.to_string(),
            options: QueryOptions::default(),
        })
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok_status() {
        let tmp = tempdir().expect("tempdir");
        let state = state_for(tmp.path()).await;

        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.documents, 2);
    }

    #[tokio::test]
    async fn startup_builds_missing_index() {
        let tmp = tempdir().expect("tempdir");
        let config = config_for(tmp.path());
        assert!(!config.index_path.exists());

        let _state = state_for(tmp.path()).await;
        assert!(config.index_path.exists());
    }

    #[tokio::test]
    async fn search_endpoint_returns_display_fields() {
        let tmp = tempdir().expect("tempdir");
        let state = state_for(tmp.path()).await;

        let Json(result) = search(State(state), request("渋谷"))
            .await
            .expect("search result");

        assert_eq!(result.query, "渋谷");
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].fields[0].value, "150-0002");
        assert_eq!(result.summary.total_matches, 1);
    }

    #[tokio::test]
    async fn search_endpoint_verifies_match_all_candidates() {
        let tmp = tempdir().expect("tempdir");
        let state = state_for(tmp.path()).await;

        let Json(result) = search(
            State(state),
            Json(SearchRequest {
                keyword: "渋".to_string(),
                options: QueryOptions {
                    verify: true,
                    empty_keyword: EmptyKeywordPolicy::MatchAll,
                    ..QueryOptions::default()
                },
            }),
        )
        .await
        .expect("search result");

        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].id.0, 0);
        assert_eq!(result.summary.rejected_by_verify, 1);
    }

    #[tokio::test]
    async fn index_endpoint_publishes_rebuilt_snapshot() {
        let tmp = tempdir().expect("tempdir");
        let state = state_for(tmp.path()).await;

        let Json(before) = search(State(Arc::clone(&state)), request("那覇"))
            .await
            .expect("search");
        assert!(before.hits.is_empty());

        fs::write(
            tmp.path().join("addresses.csv"),
            format!("{CSV}900-0001,沖縄県,那覇市,泉崎\n"),
        )
        .expect("grow corpus");

        let Json(summary) = index(State(Arc::clone(&state))).await.expect("rebuild");
        assert_eq!(summary.backend, IndexBackendKind::Sqlite);
        assert_eq!(summary.documents_indexed, 3);

        let Json(after) = search(State(state), request("那覇"))
            .await
            .expect("search");
        assert_eq!(after.hits.len(), 1);
        assert_eq!(after.hits[0].fields[0].value, "900-0001");
    }

    #[tokio::test]
    async fn index_info_endpoint_returns_summary() {
        let tmp = tempdir().expect("tempdir");
        let state = state_for(tmp.path()).await;

        let Json(info) = index_info(State(state)).await.expect("index info summary");
        assert_eq!(info.backend, IndexBackendKind::Sqlite);
        assert_eq!(info.documents_indexed, 2);
        assert!(info.created_at.is_some());
        assert!(info.updated_at.is_some());
    }

    #[test]
    fn missing_index_maps_to_not_found() {
        let tmp = tempdir().expect("tempdir");
        let config = config_for(tmp.path());

        let err = get_index_info(&config).expect_err("missing");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn corpus_mismatch_maps_to_conflict() {
        let tmp = tempdir().expect("tempdir");
        let config = config_for(tmp.path());
        run_index(config.clone()).expect("index");
        fs::write(&config.corpus.path, "zip,pref,city,town\n1,a,b,c\n").expect("rewrite");

        let err = SearchSnapshot::load(&config).expect_err("mismatch");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn other_errors_are_bad_requests() {
        let response = ApiError::from(anyhow!("corpus has no column named \"x\"")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

//! HTTP server for the course editor.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/courses/{id}/tree` | Current outline, metadata and version |
//! | `GET`  | `/courses/{id}/validate` | Integrity report and suggestions |
//! | `POST` | `/courses/{id}/reconcile` | Save an edited outline |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "course not found: c1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).
//!
//! `POST /courses/{id}/reconcile` maps the result's `error_code`: an invalid
//! submission is `400`, an unknown course `404`, a lock or version conflict
//! `409`. A save that passed those checks but failed while writing is not an
//! HTTP error: the response is `200` with the full result and
//! `success: false`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use course_reconciler_core::orchestrator::ValidationReport;
use course_reconciler_core::{
    ContentNode, CourseMetadata, ReconcileError, ReconciliationResult, Strategy,
};

use crate::config::Config;
use crate::course_cmd::{load_document, CourseDocument};
use crate::reconcile_cmd::{reconcile_course, validate_course, Submission};
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: SqliteStore,
}

impl AppState {
    pub fn new(config: Config, store: SqliteStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/courses/{id}/tree", get(handle_tree))
        .route("/courses/{id}/validate", get(handle_validate))
        .route("/courses/{id}/reconcile", post(handle_reconcile))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = SqliteStore::open(config).await?;
    let app = router(AppState::new(config.clone(), store));

    println!("courserec server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps engine errors to status codes; anything else is a 500.
fn classify(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<ReconcileError>() {
        Some(ReconcileError::CourseNotFound(_)) => not_found(err.to_string()),
        Some(ReconcileError::InvalidSubmission(_)) => bad_request(err.to_string()),
        Some(ReconcileError::CourseLocked(_)) | Some(ReconcileError::StaleVersion { .. }) => {
            conflict(err.to_string())
        }
        _ if err.to_string().contains("not found") => not_found(format!("{:#}", err)),
        _ => internal(format!("{:#}", err)),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /courses/{id}/tree ============

async fn handle_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CourseDocument>, AppError> {
    load_document(&state.store, &id)
        .await
        .map(Json)
        .map_err(classify)
}

// ============ GET /courses/{id}/validate ============

async fn handle_validate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ValidationReport>, AppError> {
    validate_course(&state.config, &state.store, &id)
        .await
        .map(Json)
        .map_err(classify)
}

// ============ POST /courses/{id}/reconcile ============

/// JSON body for `POST /courses/{id}/reconcile`.
#[derive(Debug, Deserialize)]
pub struct ReconcileBody {
    #[serde(default)]
    pub metadata: Option<CourseMetadata>,
    pub tree: Vec<ContentNode>,
    /// Falls back to `[reconcile].default_strategy`.
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub expected_version: Option<String>,
}

async fn handle_reconcile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReconcileBody>,
) -> Result<Json<ReconciliationResult>, AppError> {
    let strategy = match body.strategy {
        Some(s) => s,
        None => state
            .config
            .reconcile
            .strategy()
            .map_err(|e| internal(e.to_string()))?,
    };
    let submission = Submission {
        metadata: body.metadata,
        tree: body.tree,
    };

    let result = reconcile_course(
        &state.config,
        &state.store,
        &id,
        submission,
        strategy,
        body.expected_version,
    )
    .await
    .map_err(classify)?;

    info!(course = %id, success = result.success, "reconcile request served");

    let message = result.errors.join("; ");
    match result.error_code {
        Some("invalid_submission") => Err(bad_request(message)),
        Some("course_not_found") => Err(not_found(message)),
        Some("course_locked") | Some("stale_version") => Err(conflict(message)),
        _ => Ok(Json(result)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use course_reconciler_core::Store;
    use tempfile::TempDir;

    async fn state() -> (TempDir, AppState) {
        let tmp = TempDir::new().unwrap();
        let config: Config = toml::from_str(&format!(
            "[db]\npath = \"{}/data/c.sqlite\"\n",
            tmp.path().display()
        ))
        .unwrap();
        run_migrations(&config).await.unwrap();
        let store = SqliteStore::open(&config).await.unwrap();
        store
            .insert_course(
                "c1",
                &CourseMetadata {
                    title: "Rust 101".to_string(),
                    description: None,
                    published: false,
                },
            )
            .await
            .unwrap();
        (tmp, AppState::new(config, store))
    }

    fn body(tree: Vec<ContentNode>) -> ReconcileBody {
        ReconcileBody {
            metadata: None,
            tree,
            strategy: Some(Strategy::Incremental),
            expected_version: None,
        }
    }

    #[tokio::test]
    async fn test_tree_of_unknown_course_is_404() {
        let (_tmp, state) = state().await;
        let err = handle_tree(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");
    }

    #[tokio::test]
    async fn test_reconcile_then_tree() {
        let (_tmp, state) = state().await;
        let tree = vec![ContentNode::module("M").with_children(vec![
            ContentNode::lesson("L").with_children(vec![ContentNode::unit("U1")]),
        ])];

        let Json(result) = handle_reconcile(
            State(state.clone()),
            Path("c1".to_string()),
            Json(body(tree)),
        )
        .await
        .unwrap();
        assert!(result.success);
        assert_eq!(result.counts.created, 3);

        let Json(doc) = handle_tree(State(state.clone()), Path("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(doc.tree[0].children[0].children[0].title, "U1");
        assert_eq!(Some(doc.version), result.version_after);
    }

    #[tokio::test]
    async fn test_stale_version_is_409() {
        let (_tmp, state) = state().await;
        let mut b = body(vec![]);
        b.expected_version = Some("stale".to_string());
        let err = handle_reconcile(State(state), Path("c1".to_string()), Json(b))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_locked_course_is_409() {
        let (_tmp, state) = state().await;
        state.store.try_lock_course("c1", "other", 300).await.unwrap();
        let err = handle_reconcile(State(state), Path("c1".to_string()), Json(body(vec![])))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_tree_is_400() {
        let (_tmp, state) = state().await;
        let tree = vec![ContentNode::module("M").with_children(vec![ContentNode::unit("stray")])];
        let err = handle_reconcile(State(state.clone()), Path("c1".to_string()), Json(body(tree)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
        assert!(err.message.contains("module #1 > unit #1: expected a lesson"));
        assert!(state.store.fetch_tree("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_of_unknown_course_is_404() {
        let (_tmp, state) = state().await;
        let err = handle_reconcile(State(state), Path("nope".to_string()), Json(body(vec![])))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reconcile_runs_on_a_spawned_task() {
        let (_tmp, state) = state().await;
        let handle = tokio::spawn(async move {
            handle_reconcile(
                State(state),
                Path("c1".to_string()),
                Json(body(vec![ContentNode::module("M")])),
            )
            .await
            .map(|Json(r)| r.success)
            .map_err(|e| e.message)
        });
        assert_eq!(handle.await.unwrap(), Ok(true));
    }

    #[tokio::test]
    async fn test_validate_reports_score() {
        let (_tmp, state) = state().await;
        let Json(report) = handle_validate(State(state), Path("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(report.integrity.score, 100);
        assert_eq!(report.node_count, 0);
    }
}

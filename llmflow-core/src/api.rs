//! HTTP/WebSocket API built on axum.
//!
//! The boundary surface of the core: submit a search, stream an
//! interactive session over WebSocket, poll background jobs, and read
//! metrics. Everything else lives behind the dispatcher.

use crate::dispatcher::{Dispatcher, Submission};
use crate::error::LlmFlowError;
use crate::registry::{JobRecord, JobStats, SessionSummary};
use crate::task::{TaskMode, TaskStatus};
use futures_util::SinkExt;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use uuid::Uuid;

/// Shared application state for axum handlers.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Build the API router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/search", post(submit_search))
        .route("/ws/search/{session_id}", get(ws_search))
        .route("/api/sessions", get(list_sessions))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{job_id}", get(get_job))
        .route("/api/metrics", get(get_metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router on the given address until cancelled.
pub async fn run(state: SharedState, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default = "default_mode")]
    mode: TaskMode,
}

fn default_mode() -> TaskMode {
    TaskMode::Interactive
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

async fn submit_search(
    State(state): State<SharedState>,
    Json(request): Json<SearchRequest>,
) -> impl IntoResponse {
    match state
        .dispatcher
        .submit(&request.query, request.mode, request.max_iterations)
    {
        Ok(Submission::Interactive { session_id }) => (
            StatusCode::OK,
            Json(SearchResponse {
                status: "initialized".into(),
                session_id: Some(session_id),
                job_id: None,
            }),
        )
            .into_response(),
        Ok(Submission::Background { job_id }) => (
            StatusCode::OK,
            Json(SearchResponse {
                status: "queued".into(),
                session_id: None,
                job_id: Some(job_id),
            }),
        )
            .into_response(),
        Err(LlmFlowError::Validation { reason }) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, reason).into_response()
        }
        Err(err) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn ws_search(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_session(socket, session_id, state))
}

/// Attach to the session and forward progress events until a terminal
/// event, then close. Disconnecting never cancels the underlying task.
async fn stream_session(mut socket: WebSocket, session_id: Uuid, state: SharedState) {
    let mut rx = match state.dispatcher.sessions().attach(session_id) {
        Ok(rx) => rx,
        Err(err) => {
            let frame = serde_json::json!({ "type": "error", "message": err.to_string() });
            let _ = socket.send(WsMessage::Text(frame.to_string().into())).await;
            let _ = socket.close().await;
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        let Ok(json) = serde_json::to_string(&event) else {
            continue;
        };
        if socket.send(WsMessage::Text(json.into())).await.is_err() {
            debug!(%session_id, "subscriber disconnected mid-stream");
            return;
        }
        if terminal {
            break;
        }
    }

    let _ = socket.close().await;
}

#[derive(Debug, Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

async fn list_sessions(State(state): State<SharedState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.dispatcher.sessions().list(),
    })
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    status: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
struct JobsResponse {
    jobs: Vec<JobRecord>,
    stats: JobStats,
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(params): Query<JobsQuery>,
) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state.dispatcher.jobs().list(params.status),
        stats: state.dispatcher.jobs().stats(),
    })
}

async fn get_job(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.dispatcher.jobs().get(job_id) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(err) => error_response(StatusCode::NOT_FOUND, err.to_string()).into_response(),
    }
}

async fn get_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.dispatcher.metrics().snapshot())
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0);
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.dispatcher.sessions().total_count(),
        "jobs": state.dispatcher.jobs().total_count(),
        "uptime_secs": uptime,
    }))
}

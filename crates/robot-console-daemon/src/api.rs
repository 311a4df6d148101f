//! HTTP and WebSocket surface of the session control API.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::bridge::run_bridge;
use crate::config::DaemonConfig;
use crate::error::ConsoleError;
use crate::robots::{RobotCommand, RobotSummary, RobotTable};
use crate::supervisor::{SessionStatus, Supervisor};
use crate::validation::{ValidationReport, run_validation};

#[derive(Clone)]
pub struct AppState {
    robots: Arc<RobotTable>,
    supervisor: Arc<Supervisor>,
    validation_timeout: Duration,
    ws_queue_capacity: usize,
}

impl AppState {
    pub fn new(robots: RobotTable, supervisor: Arc<Supervisor>, config: &DaemonConfig) -> Self {
        Self {
            robots: Arc::new(robots),
            supervisor,
            validation_timeout: config.validation_timeout(),
            ws_queue_capacity: config.ws_queue_capacity(),
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    robot_id: String,
    command_index: i64,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    status: &'static str,
    command: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/robots", get(robots_handler))
        .route("/api/robots/:robot_id/commands", get(commands_handler))
        .route("/api/robots/:robot_id/validate", post(validate_handler))
        .route("/api/execute", post(execute_handler))
        .route("/api/terminate", post(terminate_handler))
        .route("/api/session", get(session_handler))
        .route("/ws/terminal", get(terminal_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn robots_handler(State(state): State<AppState>) -> Json<Vec<RobotSummary>> {
    Json(state.robots.summaries())
}

async fn commands_handler(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
) -> Result<Json<Vec<RobotCommand>>, ConsoleError> {
    Ok(Json(state.robots.commands(&robot_id)?.to_vec()))
}

async fn validate_handler(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
) -> Result<Json<ValidationReport>, ConsoleError> {
    let robot = state.robots.get(&robot_id)?;
    info!(robot_id = %robot_id, "Running validation");
    let report = run_validation(&robot.validation_script, state.validation_timeout).await;
    Ok(Json(report))
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ConsoleError> {
    let command = state
        .robots
        .resolve(&request.robot_id, request.command_index)?
        .clone();
    info!(
        robot_id = %request.robot_id,
        command_index = request.command_index,
        label = %command.label,
        "Executing command"
    );

    let supervisor = Arc::clone(&state.supervisor);
    let started = tokio::task::spawn_blocking(move || {
        supervisor.start(&command.label, &command.command_args)
    })
    .await
    .map_err(|err| ConsoleError::Internal(format!("Failed to start command: {err}")))??;

    Ok(Json(ExecuteResponse {
        status: "started",
        command: started.label,
    }))
}

async fn terminate_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = if state.supervisor.terminate() {
        "terminated"
    } else {
        "idle"
    };
    Json(StatusResponse { status })
}

async fn session_handler(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.supervisor.status())
}

async fn terminal_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let supervisor = Arc::clone(&state.supervisor);
    let capacity = state.ws_queue_capacity;
    ws.on_upgrade(move |socket| run_bridge(socket, supervisor, capacity))
}

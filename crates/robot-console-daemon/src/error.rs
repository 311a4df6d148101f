//! Error taxonomy surfaced by the session control API.

use std::path::PathBuf;
use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use thiserror::Error;

use robot_console_terminal::PtyError;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Internal(String),
    /// A bounded operation ran out of time. Validation reports this through
    /// `ValidationReport::message` rather than as a response; the 504 mapping
    /// only applies to handlers that return it directly, of which there are
    /// none today.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ConsoleError {
    pub fn robot_not_found(robot_id: &str) -> Self {
        ConsoleError::NotFound(format!("Robot not found: {robot_id}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ConsoleError::NotFound(_) => StatusCode::NOT_FOUND,
            ConsoleError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ConsoleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConsoleError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<PtyError> for ConsoleError {
    fn from(err: PtyError) -> Self {
        ConsoleError::Internal(format!("Failed to start command: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status_code: u16,
    message: String,
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors loading the robot table or daemon configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read robot table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse robot table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid robot table: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid listen address: {message}")]
    InvalidListen { message: String },
    #[error("server I/O error ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install signal handler: {0}")]
    SignalSetup(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

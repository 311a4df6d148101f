//! PTY errors with enough structure for the daemon to render them.

use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

impl SpawnErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => SpawnErrorKind::PermissionDenied,
            _ => SpawnErrorKind::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {reason}")]
    Open { reason: String },
    #[error("Failed to spawn process: {reason}")]
    Spawn {
        reason: String,
        kind: SpawnErrorKind,
    },
    #[error("Failed to write to PTY: {reason}")]
    Write {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: i32,
        #[source]
        source: io::Error,
    },
}

impl PtyError {
    pub fn operation(&self) -> &'static str {
        match self {
            PtyError::Open { .. } => "open",
            PtyError::Spawn { .. } => "spawn",
            PtyError::Write { .. } => "write",
            PtyError::Signal { .. } => "signal",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            PtyError::Open { reason } | PtyError::Spawn { reason, .. } => reason.clone(),
            PtyError::Write { reason, .. } => reason.clone(),
            PtyError::Signal { source, .. } => source.to_string(),
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            PtyError::Open { .. } => {
                "PTY allocation failed. Check system resource limits (ulimit -n)."
            }
            PtyError::Spawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => {
                    "Command not found. Check the robot table's argument vectors and scripts directory."
                }
                SpawnErrorKind::PermissionDenied => {
                    "Permission denied. Check that the script is executable."
                }
                SpawnErrorKind::Other => "Process spawn failed. Check the command's argument vector.",
            },
            PtyError::Write { .. } => "The command may have ended; start it again.",
            PtyError::Signal { .. } => "The process group could not be signalled.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_error_operation() {
        assert_eq!(
            PtyError::Open {
                reason: "x".into()
            }
            .operation(),
            "open"
        );
        assert_eq!(
            PtyError::Spawn {
                reason: "x".into(),
                kind: SpawnErrorKind::Other
            }
            .operation(),
            "spawn"
        );
        assert_eq!(
            PtyError::Write {
                reason: "x".into(),
                source: None
            }
            .operation(),
            "write"
        );
    }

    #[test]
    fn test_spawn_kind_from_io() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(SpawnErrorKind::from_io(&err), SpawnErrorKind::NotFound);
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(
            SpawnErrorKind::from_io(&err),
            SpawnErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_suggestion_mentions_permissions() {
        let err = PtyError::Spawn {
            reason: "Permission denied".into(),
            kind: SpawnErrorKind::PermissionDenied,
        };
        assert!(err.suggestion().contains("executable"));
        assert!(err.to_string().contains("Permission denied"));
    }
}

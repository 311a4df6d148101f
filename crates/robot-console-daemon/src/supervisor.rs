//! Owner of the single live terminal session.
//!
//! All mutation happens under one mutex: starting, replacing and terminating
//! a session are serialized, and a session's PTY handle and output pump are
//! created and torn down together inside that critical section.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use robot_console_common::mutex_lock_or_recover;
use robot_console_terminal::{DEFAULT_COLS, DEFAULT_ROWS, PtyError, PtyHandle, PtyWriter};

use crate::error::ConsoleError;
use crate::pump::{OutputPump, SubscriberSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the supervisor's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub live: bool,
    pub session_id: Option<SessionId>,
    pub label: Option<String>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exited: bool,
    pub exit_code: Option<u32>,
}

impl SessionStatus {
    fn idle() -> Self {
        Self {
            live: false,
            session_id: None,
            label: None,
            pid: None,
            started_at: None,
            exited: false,
            exit_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub label: String,
    pub pid: Option<u32>,
}

struct Session {
    id: SessionId,
    label: String,
    started_at: DateTime<Utc>,
    pty: PtyHandle,
    pump: OutputPump,
}

pub struct Supervisor {
    current: Mutex<Option<Session>>,
    next_id: AtomicU64,
    slot: Arc<SubscriberSlot>,
    terminate_grace: Duration,
}

impl Supervisor {
    pub fn new(slot: Arc<SubscriberSlot>, terminate_grace: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
            slot,
            terminate_grace,
        }
    }

    pub fn slot(&self) -> &Arc<SubscriberSlot> {
        &self.slot
    }

    /// Start `args` on a fresh PTY, terminating any session that is still
    /// around. Termination of the old session is best-effort.
    pub fn start(&self, label: &str, args: &[String]) -> Result<StartedSession, ConsoleError> {
        let mut current = mutex_lock_or_recover(&self.current);
        if let Some(old) = current.take() {
            self.retire(old);
        }

        let mut pty = PtyHandle::spawn(args, &[], DEFAULT_COLS, DEFAULT_ROWS).map_err(|err| {
            warn!(label = %label, error = %err, suggestion = err.suggestion(), "Failed to spawn command");
            ConsoleError::from(err)
        })?;
        let Some(read_rx) = pty.take_read_rx() else {
            // A fresh handle always carries its reader; dropping `pty` kills the child.
            return Err(ConsoleError::from(PtyError::Open {
                reason: "PTY reader unavailable".to_string(),
            }));
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.slot.activate(id);
        let pump = OutputPump::spawn(id, read_rx, Arc::clone(&self.slot));
        let pid = pty.pid();
        info!(session_id = %id, pid = ?pid, label = %label, "Session started");

        *current = Some(Session {
            id,
            label: label.to_string(),
            started_at: Utc::now(),
            pty,
            pump,
        });
        Ok(StartedSession {
            session_id: id,
            label: label.to_string(),
            pid,
        })
    }

    /// Terminate the live session, if any, without waiting for it to exit.
    /// Returns whether there was a session to terminate.
    pub fn terminate(&self) -> bool {
        let session = mutex_lock_or_recover(&self.current).take();
        match session {
            Some(session) => {
                self.retire(session);
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let mut current = mutex_lock_or_recover(&self.current);
        let Some(session) = current.as_mut() else {
            return SessionStatus::idle();
        };
        let exited = session.pty.has_exited();
        SessionStatus {
            live: true,
            session_id: Some(session.id),
            label: Some(session.label.clone()),
            pid: session.pty.pid(),
            started_at: Some(session.started_at),
            exited,
            exit_code: session.pty.exit_code(),
        }
    }

    /// Writer for the live session, handed out so writes never hold the lock.
    /// `None` when there is no session or its process has exited.
    pub fn input_writer(&self) -> Option<PtyWriter> {
        let mut current = mutex_lock_or_recover(&self.current);
        let session = current.as_mut()?;
        if session.pty.has_exited() {
            return None;
        }
        Some(session.pty.writer())
    }

    /// Write input to the live session. Input with no live session is dropped.
    pub fn write_input(&self, data: &[u8]) -> Result<bool, PtyError> {
        match self.input_writer() {
            Some(writer) => writer.write_all(data).map(|()| true),
            None => Ok(false),
        }
    }

    fn retire(&self, session: Session) {
        let Session {
            id, label, pty, mut pump, ..
        } = session;
        self.slot.deactivate(id);
        pump.stop();
        debug!(session_id = %id, pid = ?pty.pid(), label = %label, "Terminating session");
        pty.terminate_in_background(self.terminate_grace);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.terminate() {
            debug!("Supervisor dropped with a live session");
        }
    }
}

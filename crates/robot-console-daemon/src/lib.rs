#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Robot console daemon: one supervised PTY session, relayed to a single
//! WebSocket subscriber and driven by a small HTTP API.

pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod pump;
pub mod robots;
pub mod server;
#[cfg(unix)]
pub mod signal_handler;
pub mod supervisor;
pub mod validation;

pub use api::{AppState, build_router};
pub use bridge::FINISHED_NOTICE;
pub use config::DaemonConfig;
pub use error::{ConfigError, ConsoleError, ServerError};
pub use pump::{BridgeEvent, SubscriberSlot};
pub use robots::{RobotCommand, RobotConfig, RobotSummary, RobotTable};
pub use server::{bind_listener, build_state, serve};
pub use supervisor::{SessionId, SessionStatus, StartedSession, Supervisor};
pub use validation::{ValidationReport, run_validation};

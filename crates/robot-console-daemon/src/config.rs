//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use robot_console_common::env::{env_bool, env_string, parse_env_number};

use crate::error::ConfigError;
use crate::robots::RobotTable;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
const DEFAULT_SCRIPTS_DIR: &str = "./scripts";
const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TERMINATE_GRACE_MS: u64 = 2000;
const DEFAULT_WS_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    listen: String,
    allow_remote: bool,
    robots_path: Option<PathBuf>,
    scripts_dir: PathBuf,
    validation_timeout: Duration,
    terminate_grace: Duration,
    ws_queue_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let ws_queue_capacity =
            match parse_env_number("ROBOT_CONSOLE_WS_QUEUE", DEFAULT_WS_QUEUE_CAPACITY) {
                0 => DEFAULT_WS_QUEUE_CAPACITY,
                n => n,
            };
        Self {
            listen: env_string("ROBOT_CONSOLE_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            allow_remote: env_bool("ROBOT_CONSOLE_ALLOW_REMOTE").unwrap_or(false),
            robots_path: env_string("ROBOT_CONSOLE_ROBOTS").map(PathBuf::from),
            scripts_dir: env_string("ROBOT_CONSOLE_SCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPTS_DIR)),
            validation_timeout: Duration::from_secs(parse_env_number(
                "ROBOT_CONSOLE_VALIDATION_TIMEOUT",
                DEFAULT_VALIDATION_TIMEOUT_SECS,
            )),
            terminate_grace: Duration::from_millis(parse_env_number(
                "ROBOT_CONSOLE_TERMINATE_GRACE_MS",
                DEFAULT_TERMINATE_GRACE_MS,
            )),
            ws_queue_capacity,
        }
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn allow_remote(&self) -> bool {
        self.allow_remote
    }

    pub fn robots_path(&self) -> Option<&PathBuf> {
        self.robots_path.as_ref()
    }

    pub fn scripts_dir(&self) -> &PathBuf {
        &self.scripts_dir
    }

    pub fn validation_timeout(&self) -> Duration {
        self.validation_timeout
    }

    pub fn terminate_grace(&self) -> Duration {
        self.terminate_grace
    }

    pub fn ws_queue_capacity(&self) -> usize {
        self.ws_queue_capacity
    }

    /// The robot table file if one is configured, otherwise the built-in fleet.
    pub fn load_robot_table(&self) -> Result<RobotTable, ConfigError> {
        match &self.robots_path {
            Some(path) => RobotTable::load(path),
            None => Ok(RobotTable::builtin(&self.scripts_dir)),
        }
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    pub fn with_robots_path(mut self, path: PathBuf) -> Self {
        self.robots_path = Some(path);
        self
    }

    pub fn with_scripts_dir(mut self, dir: PathBuf) -> Self {
        self.scripts_dir = dir;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn with_ws_queue_capacity(mut self, capacity: usize) -> Self {
        self.ws_queue_capacity = capacity.max(1);
        self
    }
}

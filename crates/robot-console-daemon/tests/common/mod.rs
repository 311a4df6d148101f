#![allow(dead_code)]

//! Shared fixtures for daemon integration tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use robot_console_daemon::{
    AppState, DaemonConfig, RobotCommand, RobotConfig, RobotTable, ServerError, SubscriberSlot,
    Supervisor, bind_listener, build_router, serve,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const ECHO: i64 = 0;
pub const INTERACTIVE: i64 = 1;
pub const SLEEP: i64 = 2;
pub const TICKER: i64 = 3;

pub fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

fn command(label: &str, script: &str) -> RobotCommand {
    RobotCommand {
        label: label.to_string(),
        command_args: sh(script),
    }
}

/// Write a validation script into `dir`, returning the argv that runs it.
/// Scripts are read by `/bin/sh`, never exec'd directly (ETXTBSY).
pub fn write_script(dir: &Path, name: &str, body: &str) -> Vec<String> {
    let path = dir.join(name);
    std::fs::write(&path, format!("{body}\n")).unwrap();
    vec!["/bin/sh".to_string(), path.to_string_lossy().into_owned()]
}

pub fn test_robots(scripts: &Path) -> RobotTable {
    let commands = vec![
        command("Echo", "echo hello-from-robot"),
        command("Interactive", "read line; echo got:$line; sleep 1"),
        command("Sleep", "sleep 30"),
        command(
            "Ticker",
            "echo early-marker; sleep 0.5; while true; do echo tick; sleep 0.1; done",
        ),
    ];
    let robot = |id: &str, validation: Vec<String>| RobotConfig {
        id: id.to_string(),
        name: id.to_string(),
        image_key: id.to_string(),
        validation_script: validation,
        commands: commands.clone(),
    };
    RobotTable::new(vec![
        robot(
            "zippy6",
            write_script(scripts, "validate_ok.sh", "echo OK"),
        ),
        robot(
            "broken",
            write_script(scripts, "validate_fail.sh", "echo FAIL >&2\nexit 1"),
        ),
        robot(
            "slow",
            write_script(scripts, "validate_slow.sh", "echo checking\nsleep 10"),
        ),
    ])
    .unwrap()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Arc<AtomicBool>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    _scripts: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let scripts = TempDir::new().unwrap();
        let config = DaemonConfig::default()
            .with_listen("127.0.0.1:0")
            .with_validation_timeout(Duration::from_secs(1))
            .with_terminate_grace(Duration::from_millis(300))
            .with_ws_queue_capacity(64);
        let supervisor = Arc::new(Supervisor::new(
            Arc::new(SubscriberSlot::new()),
            config.terminate_grace(),
        ));
        let state = AppState::new(test_robots(scripts.path()), supervisor, &config);
        let (listener, addr) = bind_listener(&config).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(serve(listener, state.clone(), Arc::clone(&shutdown)));
        Self {
            addr,
            state,
            shutdown,
            task: Some(task),
            _scripts: scripts,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        self.state.supervisor()
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn execute(&self, robot_id: &str, index: i64) -> (StatusCode, Value) {
        self.request(
            "POST",
            "/api/execute",
            Some(serde_json::json!({ "robot_id": robot_id, "command_index": index })),
        )
        .await
    }

    /// Connect to the terminal channel and wait until the server has
    /// registered the subscriber.
    pub async fn attach(&self) -> Ws {
        let slot = self.supervisor().slot();
        let before = slot.attach_count();
        let url = format!("ws://{}/ws/terminal", self.addr);
        let (ws, _) = connect_async(url).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while slot.attach_count() == before {
            assert!(Instant::now() < deadline, "subscriber never attached");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ws
    }

    pub async fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Collect text frames until `needle` shows up or `timeout` passes.
pub async fn read_until(ws: &mut Ws, needle: &str, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    let mut out = String::new();
    while !out.contains(needle) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => out.push_str(&text),
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_)) | None) | Err(_) => break,
        }
    }
    out
}

/// Collect everything that arrives within `window`.
pub async fn drain_for(ws: &mut Ws, window: Duration) -> String {
    read_until(ws, "\u{0}never\u{0}", window).await
}

#[cfg(target_os = "linux")]
pub fn process_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let path = format!("/proc/{pid}/stat");
    loop {
        // A zombie waiting on its new parent counts as gone.
        match std::fs::read_to_string(&path) {
            Err(_) => return true,
            Ok(stat) => {
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                if state.starts_with('Z') {
                    return true;
                }
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

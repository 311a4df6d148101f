//! Listener setup and the serve loop.

use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use crate::api::{AppState, build_router};
use crate::config::DaemonConfig;
use crate::error::ServerError;
use crate::pump::SubscriberSlot;
use crate::supervisor::Supervisor;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Resolve and bind the configured address, refusing non-loopback
/// addresses unless remote access is allowed.
pub fn bind_listener(
    config: &DaemonConfig,
) -> Result<(std::net::TcpListener, SocketAddr), ServerError> {
    let mut addrs = config
        .listen()
        .to_socket_addrs()
        .map_err(|e| ServerError::InvalidListen {
            message: e.to_string(),
        })?;
    let addr = addrs.next().ok_or_else(|| ServerError::InvalidListen {
        message: "no resolved address".to_string(),
    })?;

    if !config.allow_remote() && !addr.ip().is_loopback() {
        return Err(ServerError::InvalidListen {
            message: "refusing to bind non-loopback address without ROBOT_CONSOLE_ALLOW_REMOTE=1"
                .to_string(),
        });
    }

    let listener = std::net::TcpListener::bind(addr).map_err(|e| ServerError::Io {
        operation: "bind",
        source: e,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| ServerError::Io {
            operation: "set non-blocking",
            source: e,
        })?;
    let local_addr = listener.local_addr().map_err(|e| ServerError::Io {
        operation: "read local address",
        source: e,
    })?;
    Ok((listener, local_addr))
}

/// Build the application state for `config`: robot table, subscriber slot
/// and supervisor.
pub fn build_state(config: &DaemonConfig) -> Result<AppState, ServerError> {
    let robots = config.load_robot_table()?;
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(SubscriberSlot::new()),
        config.terminate_grace(),
    ));
    Ok(AppState::new(robots, supervisor, config))
}

/// Serve until `shutdown` is raised, then terminate any live session.
pub async fn serve(
    listener: std::net::TcpListener,
    state: AppState,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ServerError> {
    let listener = TcpListener::from_std(listener).map_err(|e| ServerError::Io {
        operation: "create async listener",
        source: e,
    })?;
    if let Ok(addr) = listener.local_addr() {
        info!(url = %format_http_url(&addr), "Robot console listening");
    }

    let supervisor = Arc::clone(state.supervisor());
    let result = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(wait_for_flag(shutdown))
        .await
        .map_err(|e| ServerError::Io {
            operation: "serve",
            source: e,
        });

    if supervisor.terminate() {
        info!("Terminated live session on shutdown");
    }
    result
}

async fn wait_for_flag(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
}

pub fn format_http_url(addr: &SocketAddr) -> String {
    let host = match addr.ip() {
        std::net::IpAddr::V4(ip) => ip.to_string(),
        std::net::IpAddr::V6(ip) => format!("[{ip}]"),
    };
    format!("http://{}:{}/", host, addr.port())
}

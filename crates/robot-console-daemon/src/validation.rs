//! Bounded validation-script runner.
//!
//! Every outcome, including spawn failures and timeouts, is reported through
//! `ValidationReport`; nothing here returns an error to the caller.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use robot_console_common::mutex_lock_or_recover;

use crate::error::ConsoleError;

const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);
const CAPTURE_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub message: String,
}

impl ValidationReport {
    fn passed(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

pub async fn run_validation(args: &[String], timeout: Duration) -> ValidationReport {
    let Some((program, rest)) = args.split_first() else {
        return ValidationReport::failed("Validation script is not configured".to_string());
    };

    let mut command = Command::new(program);
    command
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %program, error = %err, "Failed to spawn validation script");
            return ValidationReport::failed(format!("Failed to run {program}: {err}"));
        }
    };

    let (stdout, stdout_task) = capture(child.stdout.take());
    let (stderr, stderr_task) = capture(child.stderr.take());

    let outcome = tokio::time::timeout(timeout, child.wait()).await;
    if outcome.is_err() {
        if let Err(err) = child.start_kill() {
            debug!(error = %err, "Failed to kill timed out validation script");
        }
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, child.wait()).await;
    }
    drain(stdout_task).await;
    drain(stderr_task).await;
    let stdout = take_text(&stdout);
    let stderr = take_text(&stderr);

    match outcome {
        Ok(Ok(status)) if status.success() => {
            info!(program = %program, "Validation passed");
            ValidationReport::passed(stdout.trim_end().to_string())
        }
        Ok(Ok(status)) => {
            info!(program = %program, code = ?status.code(), "Validation failed");
            ValidationReport::failed(format!("Validation failed:\n{stderr}\n{stdout}"))
        }
        Ok(Err(err)) => {
            warn!(program = %program, error = %err, "Failed to wait for validation script");
            ValidationReport::failed(err.to_string())
        }
        Err(_) => {
            let timed_out = ConsoleError::Timeout(timeout);
            warn!(program = %program, error = %timed_out, "Validation script timed out");
            let mut message = format!("Validation {timed_out}");
            for partial in [stderr.trim_end(), stdout.trim_end()] {
                if !partial.is_empty() {
                    message.push('\n');
                    message.push_str(partial);
                }
            }
            ValidationReport::failed(message)
        }
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

fn capture<R>(reader: Option<R>) -> (Captured, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: Captured = Arc::default();
    let task = reader.map(|mut reader| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; CAPTURE_CHUNK_BYTES];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => mutex_lock_or_recover(&buffer).extend_from_slice(&chunk[..n]),
                }
            }
        })
    });
    (buffer, task)
}

/// Give a capture task a short window to finish; descendants of the script
/// may still hold the pipe open.
async fn drain(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
        task.abort();
    }
}

fn take_text(buffer: &Captured) -> String {
    String::from_utf8_lossy(&mutex_lock_or_recover(buffer)).into_owned()
}

//! Duplex relay between the live session and one WebSocket subscriber.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::pump::BridgeEvent;
use crate::supervisor::{SessionId, Supervisor};

pub const FINISHED_NOTICE: &str = "\n[Command Finished]\n";

const EXIT_CONFIRM_ATTEMPTS: u32 = 40;
const EXIT_CONFIRM_INTERVAL: Duration = Duration::from_millis(50);

/// Serve one subscriber until either side goes away.
///
/// The subscriber replaces any previously attached one. Disconnecting never
/// touches the session itself.
pub async fn run_bridge(socket: WebSocket, supervisor: Arc<Supervisor>, queue_capacity: usize) {
    let slot = Arc::clone(supervisor.slot());
    let (subscriber, rx) = slot.attach(queue_capacity);
    debug!(?subscriber, "Terminal subscriber attached");

    let (sink, stream) = socket.split();
    let mut output = tokio::spawn(forward_output(sink, rx, Arc::clone(&supervisor)));
    let mut input = tokio::spawn(forward_input(stream, Arc::clone(&supervisor)));

    tokio::select! {
        _ = &mut output => input.abort(),
        _ = &mut input => output.abort(),
    }

    slot.detach(subscriber);
    debug!(?subscriber, "Terminal subscriber disconnected");
}

async fn forward_output(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<BridgeEvent>,
    supervisor: Arc<Supervisor>,
) {
    let mut decoder = Utf8Decoder::default();
    let mut finished: Option<SessionId> = None;

    while let Some(event) = rx.recv().await {
        let text = match event {
            BridgeEvent::Output(bytes) => decoder.decode(&bytes),
            BridgeEvent::Closed { session_id } => {
                let tail = decoder.finish();
                if !tail.is_empty() && sink.send(Message::Text(tail)).await.is_err() {
                    return;
                }
                if finished == Some(session_id) || !confirm_exit(&supervisor, session_id).await {
                    continue;
                }
                finished = Some(session_id);
                debug!(session_id = %session_id, "Session finished");
                FINISHED_NOTICE.to_string()
            }
        };
        if text.is_empty() {
            continue;
        }
        if sink.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}

async fn forward_input(mut stream: SplitStream<WebSocket>, supervisor: Arc<Supervisor>) {
    while let Some(message) = stream.next().await {
        let data = match message {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => return,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(err) => {
                debug!(error = %err, "Terminal socket read failed");
                return;
            }
        };
        let Some(writer) = supervisor.input_writer() else {
            continue;
        };
        match tokio::task::spawn_blocking(move || writer.write_all(&data)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "Dropped terminal input"),
            Err(err) => warn!(error = %err, "Terminal input task failed"),
        }
    }
}

/// Wait briefly for the supervisor to observe the exit of `session_id`.
/// Returns false if the session was replaced or terminated meanwhile.
async fn confirm_exit(supervisor: &Supervisor, session_id: SessionId) -> bool {
    for _ in 0..EXIT_CONFIRM_ATTEMPTS {
        let status = supervisor.status();
        if status.session_id != Some(session_id) {
            return false;
        }
        if status.exited {
            return true;
        }
        tokio::time::sleep(EXIT_CONFIRM_INTERVAL).await;
    }
    warn!(session_id = %session_id, "PTY closed but process is still running");
    false
}

/// Lossy UTF-8 decoding that holds back a trailing partial character until
/// the rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = incomplete_suffix_len(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

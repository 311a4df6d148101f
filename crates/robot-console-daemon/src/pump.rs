//! Per-session output pump and the single subscriber slot it feeds.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use robot_console_common::mutex_lock_or_recover;
use robot_console_terminal::ReadEvent;

use crate::supervisor::SessionId;

const FULL_QUEUE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Output(Vec<u8>),
    /// The session's PTY reached EOF or failed; no more output will follow.
    Closed { session_id: SessionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<BridgeEvent>,
}

#[derive(Default)]
struct SlotState {
    active_session: Option<SessionId>,
    /// Set once the active session's PTY has closed, so late subscribers
    /// still learn that it finished.
    closed_session: Option<SessionId>,
    subscriber: Option<Subscriber>,
}

/// Routes output of the live session to at most one attached subscriber.
///
/// Events tagged with a session other than the active one are dropped, so a
/// pump that loses the race against its own shutdown cannot leak stale output.
/// Delivery happens under the slot lock, which orders it strictly against
/// `deactivate`.
#[derive(Default)]
pub struct SubscriberSlot {
    state: Mutex<SlotState>,
    next_subscriber: AtomicU64,
}

impl SubscriberSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber, closing the previous one's queue. If the
    /// active session has already closed, the new queue starts with its
    /// `Closed` event.
    pub fn attach(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<BridgeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut state = mutex_lock_or_recover(&self.state);
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed) + 1);
        if let Some(session_id) = state.closed_session {
            let _ = tx.try_send(BridgeEvent::Closed { session_id });
        }
        let previous = state.subscriber.replace(Subscriber { id, tx });
        drop(state);
        if let Some(previous) = previous {
            debug!(replaced = previous.id.0, subscriber = id.0, "Subscriber replaced");
        }
        (id, rx)
    }

    /// Detach `id` if it is still the current subscriber.
    pub fn detach(&self, id: SubscriberId) {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.subscriber.as_ref().is_some_and(|s| s.id == id) {
            state.subscriber = None;
            debug!(subscriber = id.0, "Subscriber detached");
        }
    }

    /// Number of subscribers attached so far.
    pub fn attach_count(&self) -> u64 {
        self.next_subscriber.load(Ordering::Relaxed)
    }

    pub fn has_subscriber(&self) -> bool {
        mutex_lock_or_recover(&self.state).subscriber.is_some()
    }

    pub(crate) fn activate(&self, session_id: SessionId) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.active_session = Some(session_id);
        state.closed_session = None;
    }

    pub(crate) fn deactivate(&self, session_id: SessionId) {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.active_session == Some(session_id) {
            state.active_session = None;
            state.closed_session = None;
        }
    }

    /// Deliver an event from `session_id`'s pump.
    ///
    /// Waits while the subscriber's queue is full, re-checking between
    /// attempts that the session is still active and that the pump has not
    /// been stopped. Discards when nobody is attached.
    fn publish(
        &self,
        session_id: SessionId,
        mut event: BridgeEvent,
        stop_rx: &channel::Receiver<()>,
    ) -> Delivery {
        loop {
            {
                let mut state = mutex_lock_or_recover(&self.state);
                if state.active_session != Some(session_id) {
                    return Delivery::Done;
                }
                if matches!(event, BridgeEvent::Closed { .. }) {
                    state.closed_session = Some(session_id);
                }
                let Some(subscriber) = state.subscriber.as_ref() else {
                    return Delivery::Done;
                };
                match subscriber.tx.try_send(event) {
                    Ok(()) => return Delivery::Done,
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = subscriber.id.0, "Subscriber queue closed");
                        state.subscriber = None;
                        return Delivery::Done;
                    }
                    Err(TrySendError::Full(returned)) => event = returned,
                }
            }
            match stop_rx.recv_timeout(FULL_QUEUE_POLL) {
                Err(channel::RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => return Delivery::Stopped,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Done,
    Stopped,
}

/// Owns the stop side of a running pump thread. Dropping it stops the pump.
pub struct OutputPump {
    stop_tx: Option<channel::Sender<()>>,
}

impl OutputPump {
    pub fn spawn(
        session_id: SessionId,
        read_rx: channel::Receiver<ReadEvent>,
        slot: Arc<SubscriberSlot>,
    ) -> Self {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let name = format!("output-pump-{}", session_id);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || pump_loop(session_id, read_rx, stop_rx, slot));
        if let Err(err) = spawned {
            warn!(session_id = %session_id, error = %err, "Failed to spawn output pump");
        }
        Self {
            stop_tx: Some(stop_tx),
        }
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl Drop for OutputPump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_loop(
    session_id: SessionId,
    read_rx: channel::Receiver<ReadEvent>,
    stop_rx: channel::Receiver<()>,
    slot: Arc<SubscriberSlot>,
) {
    loop {
        let event = channel::select! {
            recv(stop_rx) -> _ => {
                debug!(session_id = %session_id, "Output pump stopped");
                return;
            }
            recv(read_rx) -> event => event,
        };
        let (event, last) = match event {
            Ok(ReadEvent::Data(bytes)) => (BridgeEvent::Output(bytes), false),
            Ok(ReadEvent::Eof) | Err(_) => (BridgeEvent::Closed { session_id }, true),
            Ok(ReadEvent::Error(reason)) => {
                debug!(session_id = %session_id, reason = %reason, "PTY read ended");
                (BridgeEvent::Closed { session_id }, true)
            }
        };
        if slot.publish(session_id, event, &stop_rx) == Delivery::Stopped {
            debug!(session_id = %session_id, "Output pump stopped while subscriber was full");
            return;
        }
        if last {
            return;
        }
    }
}

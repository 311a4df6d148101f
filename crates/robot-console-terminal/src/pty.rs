use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel as channel;
use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tracing::{debug, info, warn};

use robot_console_common::mutex_lock_or_recover;

use crate::error::{PtyError, SpawnErrorKind};

pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;

const PTY_READ_CHANNEL_CAPACITY: usize = 256;
const PTY_READ_CHUNK_BYTES: usize = 4096;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(5);
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(25);
const KILL_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Events produced by the PTY reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Data(Vec<u8>),
    Eof,
    Error(String),
}

/// Cloneable handle to the PTY master's write side.
#[derive(Clone)]
pub struct PtyWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for PtyWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyWriter").finish_non_exhaustive()
    }
}

impl PtyWriter {
    pub fn write_all(&self, data: &[u8]) -> Result<(), PtyError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut writer = mutex_lock_or_recover(&self.inner);
        let mut offset = 0;
        while offset < data.len() {
            match writer.write(&data[offset..]) {
                Ok(0) => {
                    return Err(PtyError::Write {
                        reason: "write returned 0 bytes, PTY closed".to_string(),
                        source: None,
                    });
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(PtyError::Write {
                        reason: e.to_string(),
                        source: Some(e),
                    });
                }
            }
        }
        writer.flush().map_err(|e| PtyError::Write {
            reason: e.to_string(),
            source: Some(e),
        })
    }
}

/// A child process attached to the subordinate side of a freshly allocated PTY.
///
/// The child and the master descriptor live and die together: both are owned
/// here, so a handle is either fully usable or dropped as a unit.
pub struct PtyHandle {
    // Keeps the master side open for as long as the handle lives.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: PtyWriter,
    pid: Option<u32>,
    read_rx: Option<channel::Receiver<ReadEvent>>,
    exited: bool,
    exit_code: Option<u32>,
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        // Descendants may outlive the group leader, so the group is signalled
        // even when the leader has already been reaped.
        let _ = self.kill();
        if !self.exited {
            let _ = self.child.try_wait();
        }
    }
}

impl PtyHandle {
    /// Spawn `args[0]` with `args[1..]` in its own session on a new PTY.
    ///
    /// On any failure every descriptor allocated so far is released before
    /// the error is returned.
    pub fn spawn(
        args: &[String],
        env: &[(&str, &str)],
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let Some((program, rest)) = args.split_first() else {
            return Err(PtyError::Spawn {
                reason: "empty argument vector".to_string(),
                kind: SpawnErrorKind::Other,
            });
        };

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| PtyError::Open {
                reason: e.to_string(),
            })?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(rest);
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");

        let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
            let kind = e
                .downcast_ref::<io::Error>()
                .map(SpawnErrorKind::from_io)
                .unwrap_or(SpawnErrorKind::Other);
            PtyError::Spawn {
                reason: e.to_string(),
                kind,
            }
        })?;

        // Only the child may hold the subordinate side, otherwise the master
        // never sees EOF when the child exits.
        drop(pair.slave);

        let io_ends = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match io_ends {
            Ok(ends) => ends,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PtyError::Open {
                    reason: e.to_string(),
                });
            }
        };

        let pid = child.process_id();
        let read_rx = spawn_reader(reader, pid);
        debug!(pid = ?pid, program = %program, "PTY child spawned");

        Ok(Self {
            _master: pair.master,
            child,
            writer: PtyWriter {
                inner: Arc::new(Mutex::new(writer)),
            },
            pid,
            read_rx: Some(read_rx),
            exited: false,
            exit_code: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn writer(&self) -> PtyWriter {
        self.writer.clone()
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)
    }

    /// The reader channel can be taken once; the output pump owns it afterwards.
    pub fn take_read_rx(&mut self) -> Option<channel::Receiver<ReadEvent>> {
        self.read_rx.take()
    }

    /// Non-blocking exit check. Reaps the child if it has exited.
    pub fn has_exited(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exited = true;
                self.exit_code = Some(status.exit_code());
            }
            Ok(None) => {}
            Err(e) => {
                // ECHILD: someone else already reaped it.
                debug!(pid = ?self.pid, error = %e, "try_wait failed; treating child as exited");
                self.exited = true;
            }
        }
        self.exited
    }

    pub fn is_running(&mut self) -> bool {
        !self.has_exited()
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Ask the whole process group to stop (SIGTERM). The group is signalled
    /// even after the leader exited, reaching any descendants left behind.
    pub fn terminate(&mut self) -> Result<(), PtyError> {
        self.signal_group(Signal::Terminate)
    }

    /// Forcefully stop the whole process group (SIGKILL).
    pub fn kill(&mut self) -> Result<(), PtyError> {
        self.signal_group(Signal::Kill)
    }

    /// Terminate the child without blocking the caller.
    ///
    /// A reaper thread takes ownership of the handle, escalates to SIGKILL
    /// after `grace`, waits for the child and then releases the PTY.
    pub fn terminate_in_background(mut self, grace: Duration) {
        if let Err(err) = self.terminate() {
            warn!(pid = ?self.pid, error = %err, "Failed to send SIGTERM to process group");
        }
        let name = format!("pty-reaper-{}", self.pid.unwrap_or(0));
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || self.reap(grace));
        if let Err(err) = spawned {
            // The handle moved into the failed closure and was dropped there,
            // which already killed the group.
            warn!(error = %err, "Failed to spawn PTY reaper thread");
        }
    }

    fn reap(mut self, grace: Duration) {
        if !wait_until_settled(&mut self, grace) {
            info!(pid = ?self.pid, grace_ms = grace.as_millis(), "Process group ignored SIGTERM; sending SIGKILL");
            if let Err(err) = self.kill() {
                warn!(pid = ?self.pid, error = %err, "Failed to SIGKILL process group");
            }
            if !wait_until_exited(&mut self, KILL_WAIT_TIMEOUT) {
                match self.child.wait() {
                    Ok(status) => {
                        self.exited = true;
                        self.exit_code = Some(status.exit_code());
                    }
                    Err(err) => warn!(pid = ?self.pid, error = %err, "Failed to wait for child"),
                }
            }
        }
        debug!(pid = ?self.pid, exit_code = ?self.exit_code, "PTY child reaped");
    }

    #[cfg(unix)]
    fn pgid(&self) -> Option<libc::pid_t> {
        self.pid
            .and_then(|pid| libc::pid_t::try_from(pid).ok())
            .filter(|pgid| *pgid > 0)
    }

    /// Whether any member of the child's process group is still around.
    #[cfg(unix)]
    fn group_alive(&self) -> bool {
        let Some(pgid) = self.pgid() else {
            return false;
        };
        // SAFETY: signal 0 only checks that the group exists.
        let rc = unsafe { libc::kill(-pgid, 0) };
        rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn group_alive(&self) -> bool {
        false
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: Signal) -> Result<(), PtyError> {
        // Reap first so the recorded exit status is not lost to a later wait.
        let leader_exited = self.has_exited();
        let Some(pgid) = self.pgid() else {
            if leader_exited {
                return Ok(());
            }
            return self.child.kill().map_err(|e| PtyError::Signal { pgid: 0, source: e });
        };
        if leader_exited && !self.group_alive() {
            return Ok(());
        }
        let signo = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: a negative pid addresses the process group led by the child,
        // which portable-pty places in a new session at spawn time. The kernel
        // keeps the id reserved while any member of that group is alive; an
        // empty group is skipped above or answers ESRCH.
        let rc = unsafe { libc::kill(-pgid, signo) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(PtyError::Signal { pgid, source: err })
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) -> Result<(), PtyError> {
        if self.has_exited() {
            return Ok(());
        }
        self.child
            .kill()
            .map_err(|e| PtyError::Signal { pgid: 0, source: e })
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

fn wait_until_exited(handle: &mut PtyHandle, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.has_exited() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}

/// Wait for the leader to exit and the rest of its process group to go away.
fn wait_until_settled(handle: &mut PtyHandle, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.has_exited() && !handle.group_alive() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}

fn spawn_reader(mut reader: Box<dyn Read + Send>, pid: Option<u32>) -> channel::Receiver<ReadEvent> {
    let (tx, rx) = channel::bounded(PTY_READ_CHANNEL_CAPACITY);
    let span = tracing::debug_span!("pty_reader", pid = ?pid);
    let builder = thread::Builder::new().name(format!("pty-reader-{}", pid.unwrap_or(0)));
    let tx_thread = tx.clone();
    if let Err(err) = builder.spawn(move || {
        let _guard = span.enter();
        let mut buf = [0u8; PTY_READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    let _ = tx_thread.send(ReadEvent::Eof);
                    debug!("PTY reader EOF");
                    break;
                }
                Ok(n) => {
                    if tx_thread.send(ReadEvent::Data(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO on the master once the last
                    // subordinate descriptor is closed.
                    debug!(error = %e, "PTY reader stopped");
                    let _ = tx_thread.send(ReadEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }) {
        let _ = tx.send(ReadEvent::Error(err.to_string()));
    }
    rx
}

//! A single interactive session.
//!
//! One child process attached to a pseudo-terminal, a background reader
//! filling the output buffer, and a lifecycle state machine that reaches a
//! terminal state exactly once, whether the process exits on its own or a
//! caller cancels it.

use crate::buffer::{capped_tail, utf8_boundary, OutputBuffer};
use crate::channel::{ChannelReader, ChannelWriter, PtyChannel, ReadOutcome};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::types::{SessionState, Snapshot};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use portable_pty::{Child, CommandBuilder};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 4096;

/// PTY and process handles, held exactly while the child may still be
/// running (plus the brief drain window right after it exits). Released
/// once, by whichever of the reader or `cancel` gets there first.
struct SessionIo {
    channel: PtyChannel,
    child: Box<dyn Child + Send + Sync>,
}

struct Lifecycle {
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// One command running (or finished) on its own pseudo-terminal.
///
/// The command string is trusted verbatim; constructing safe command lines
/// is the caller's concern, not this layer's.
pub struct InteractiveSession {
    id: String,
    command: String,
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
    io: Mutex<Option<SessionIo>>,
    /// Write half, under its own lock. PTY writes can block until the child
    /// reads, so they must never run inside the `io` critical section that
    /// `cancel` and the reader contend on.
    writer: Mutex<Option<ChannelWriter>>,
    buffer: Mutex<OutputBuffer>,
    /// Child pid, fixed at spawn; zero until then. The child is its own
    /// process-group leader, so this doubles as the pgid to signal.
    pid: AtomicU32,
}

impl InteractiveSession {
    pub(crate) fn new(id: String, command: String, config: SessionConfig) -> Self {
        let buffer = OutputBuffer::new(config.max_output_chars);
        Self {
            id,
            command,
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Pending,
                started_at: None,
                completed_at: None,
            }),
            io: Mutex::new(None),
            writer: Mutex::new(None),
            buffer: Mutex::new(buffer),
            pid: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// True while the PTY master and child handles are still held.
    pub fn has_open_channel(&self) -> bool {
        self.io.lock().is_some()
    }

    /// Size-capped, immutable view for external consumers.
    pub fn snapshot(&self) -> Snapshot {
        let output = capped_tail(
            self.buffer.lock().contents(),
            self.config.snapshot_output_chars,
        );
        let lc = self.lifecycle.lock();
        Snapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            state: lc.state,
            output,
            started_at: lc.started_at,
            completed_at: lc.completed_at,
        }
    }

    /// Launch the child and the background reader. Spawn failure finalizes
    /// the session as `Failed` with no reader started and nothing to reap.
    pub(crate) fn start(self: &Arc<Self>) {
        self.lifecycle.lock().started_at = Some(Utc::now());
        match self.launch() {
            Ok(reader) => {
                self.lifecycle.lock().state = SessionState::Running;
                let session = Arc::clone(self);
                tokio::task::spawn_blocking(move || session.reader_loop(reader));
            }
            Err(err) => {
                warn!("[session:{}] launch failed: {err:#}", self.id);
                self.finalize(SessionState::Failed);
                self.release_io();
            }
        }
    }

    fn launch(&self) -> Result<ChannelReader> {
        let cfg = &self.config;
        let mut channel = PtyChannel::open(cfg.cols, cfg.rows)?;

        let mut cmd = CommandBuilder::new(&cfg.shell);
        cmd.arg("-c");
        cmd.arg(&self.command);
        // Wide terminal so interactive tools render full-width output.
        cmd.env("TERM", &cfg.term);
        cmd.env("COLUMNS", cfg.cols.to_string());
        cmd.env("LINES", cfg.rows.to_string());

        let child = channel.spawn(cmd)?;
        if let Some(pid) = child.process_id() {
            self.pid.store(pid, Ordering::SeqCst);
        }
        let reader = channel.reader()?;
        let writer = channel.writer()?;
        *self.io.lock() = Some(SessionIo { channel, child });
        *self.writer.lock() = Some(writer);
        info!(
            "[session:{}] running (pid {})",
            self.id,
            self.pid.load(Ordering::SeqCst)
        );
        Ok(reader)
    }

    /// Deliver text to the child as keyboard input. Valid only while
    /// running; a closed or stale channel surfaces as `SendFailed`.
    ///
    /// May block until the child drains its input queue or the slave side
    /// closes. Only the writer lock is held meanwhile, so `cancel` and
    /// snapshots proceed normally.
    pub fn send(&self, text: &str) -> SessionResult<()> {
        if self.state() != SessionState::Running {
            return Err(SessionError::SendFailed("session is not running".into()));
        }
        let mut writer = self.writer.lock();
        let w = writer
            .as_mut()
            .ok_or_else(|| SessionError::SendFailed("channel already closed".into()))?;
        if let Err(err) = w.write(text.as_bytes()) {
            // A failed write means the channel is dead; drop the handle.
            *writer = None;
            return Err(SessionError::SendFailed(err.to_string()));
        }
        Ok(())
    }

    /// Send a bare newline (Enter key).
    pub fn send_enter(&self) -> SessionResult<()> {
        self.send("\n")
    }

    /// Best-effort, idempotent termination.
    ///
    /// Claims the `Cancelled` terminal state up front (pre-empting whatever
    /// the reader would compute), SIGTERMs the whole process group, waits up
    /// to the grace period, then SIGKILLs. A target that is already gone
    /// counts as success. Always releases the PTY handles.
    pub async fn cancel(&self) {
        let claimed = self.finalize(SessionState::Cancelled);

        let pid = self.pid.load(Ordering::SeqCst);
        if pid != 0 && !self.child_exited() {
            signal_group(pid, libc::SIGTERM);
            let deadline = tokio::time::Instant::now() + self.config.terminate_grace;
            while tokio::time::Instant::now() < deadline {
                if self.child_exited() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if !self.child_exited() {
                warn!(
                    "[session:{}] still alive after grace period, sending SIGKILL",
                    self.id
                );
                signal_group(pid, libc::SIGKILL);
                // Reap before the handles drop so no zombie outlives the
                // session. SIGKILL delivery is not instantaneous.
                let reap_deadline = tokio::time::Instant::now() + Duration::from_secs(1);
                while !self.child_exited() && tokio::time::Instant::now() < reap_deadline {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        }

        self.release_io();
        if claimed {
            info!("[session:{}] cancelled", self.id);
        }
    }

    /// Background reader: poll with a bounded timeout so process exit is
    /// noticed within one interval, append whatever arrives, and after exit
    /// drain the last flushed output before finalizing.
    fn reader_loop(self: Arc<Self>, mut reader: ChannelReader) {
        debug!("[reader:{}] started", self.id);
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut pending: Vec<u8> = Vec::new();

        loop {
            match reader.read_timeout(&mut buf, self.config.poll_interval) {
                ReadOutcome::Data(n) => self.ingest(&mut pending, &buf[..n]),
                ReadOutcome::TimedOut => {}
                ReadOutcome::Closed => break,
            }

            if self.child_exited() {
                std::thread::sleep(self.config.exit_drain_delay);
                loop {
                    match reader.read_timeout(&mut buf, self.config.drain_read_timeout) {
                        ReadOutcome::Data(n) => self.ingest(&mut pending, &buf[..n]),
                        ReadOutcome::TimedOut | ReadOutcome::Closed => break,
                    }
                }
                break;
            }
        }

        if !pending.is_empty() {
            let tail = String::from_utf8_lossy(&pending).into_owned();
            self.buffer.lock().append(&tail);
        }

        let state = match self.wait_exit_status() {
            Some(true) => SessionState::Completed,
            _ => SessionState::Failed,
        };
        self.finalize(state);
        self.release_io();
        info!("[reader:{}] finished ({})", self.id, self.state());
    }

    /// Decode permissively (invalid bytes replaced, never fatal) and append
    /// under the buffer lock. An unfinished trailing UTF-8 sequence is
    /// carried over to the next read.
    fn ingest(&self, pending: &mut Vec<u8>, chunk: &[u8]) {
        pending.extend_from_slice(chunk);
        let boundary = utf8_boundary(pending);
        if boundary == 0 {
            return;
        }
        let text = String::from_utf8_lossy(&pending[..boundary]).into_owned();
        pending.drain(..boundary);
        self.buffer.lock().append(&text);
    }

    /// Single atomic terminal-state decision: the first caller wins, later
    /// ones are no-ops. Stamps the completion time exactly once.
    fn finalize(&self, state: SessionState) -> bool {
        let mut lc = self.lifecycle.lock();
        if lc.state.is_terminal() {
            return false;
        }
        lc.state = state;
        if lc.completed_at.is_none() {
            lc.completed_at = Some(Utc::now());
        }
        true
    }

    fn child_exited(&self) -> bool {
        let mut io = self.io.lock();
        match io.as_mut() {
            Some(io) => io.child.try_wait().ok().flatten().is_some(),
            None => true,
        }
    }

    /// Exit status for the finalizer. The channel can report EOF a moment
    /// before the child becomes reapable, so poll briefly instead of
    /// trusting a single `try_wait`.
    fn wait_exit_status(&self) -> Option<bool> {
        let deadline = std::time::Instant::now() + self.config.poll_interval;
        loop {
            {
                let mut io = self.io.lock();
                match io.as_mut() {
                    Some(io) => {
                        if let Ok(Some(status)) = io.child.try_wait() {
                            return Some(status.success());
                        }
                    }
                    // Cancellation already released the handles; it also
                    // claimed the terminal state, so the answer is moot.
                    None => return None,
                }
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn release_io(&self) {
        if self.io.lock().take().is_some() {
            debug!("[session:{}] PTY handles released", self.id);
        }
        // A write stuck in the kernel holds the writer lock; leave the
        // handle to the writer, which drops it when the write fails.
        if let Some(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

/// Signal the child's whole process group, covering any subprocesses the
/// command forked. A vanished target (ESRCH) is success, not an error.
fn signal_group(pid: u32, signal: libc::c_int) {
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("failed to signal process group {pid}: {err}");
        }
    }
}

//! Pseudo-terminal channel.
//!
//! Owns the master/child-facing endpoint pair, tunes the child side for
//! canonical, echoing input (so line-oriented tools get whole lines on
//! Enter), and provides bounded-timeout reads on the master side.

use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize, SlavePty};
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use tracing::warn;

/// Outcome of a bounded-timeout read on the master endpoint.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were read into the caller's buffer.
    Data(usize),
    /// Nothing became readable within the timeout.
    TimedOut,
    /// End of stream: the child side of the terminal is gone.
    Closed,
}

/// A connected terminal pair. The engine keeps the master endpoint for the
/// session's lifetime; the slave endpoint is handed to the child at spawn
/// and our reference to it dropped immediately after.
pub struct PtyChannel {
    master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    slave: Option<Box<dyn SlavePty + Send>>,
}

impl PtyChannel {
    /// Allocate the pair and tune the line discipline. Tuning failure is
    /// logged and ignored: the channel still works, interactive tools just
    /// see raw input instead of buffered lines.
    pub fn open(cols: u16, rows: u16) -> Result<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open PTY")?;

        if let Some(fd) = pair.master.as_raw_fd() {
            if let Err(err) = tune_line_discipline(fd) {
                warn!("line discipline tuning failed (continuing): {err}");
            }
        }

        let writer = pair
            .master
            .take_writer()
            .context("failed to take PTY writer")?;

        Ok(Self {
            master: pair.master,
            writer: Some(writer),
            slave: Some(pair.slave),
        })
    }

    /// Spawn the child with all standard streams on the slave endpoint.
    /// portable-pty makes the child a session and process-group leader with
    /// the slave as its controlling terminal; our slave reference drops here.
    pub fn spawn(&mut self, cmd: CommandBuilder) -> Result<Box<dyn Child + Send + Sync>> {
        let slave = self
            .slave
            .take()
            .ok_or_else(|| anyhow!("child already spawned on this channel"))?;
        let child = slave.spawn_command(cmd).context("failed to spawn command")?;
        Ok(child)
    }

    /// An independent read handle (dup'd master fd). The reader loop owns it
    /// outright, so releasing the channel never invalidates an in-flight
    /// poll.
    pub fn reader(&self) -> Result<ChannelReader> {
        let fd = self
            .master
            .as_raw_fd()
            .ok_or_else(|| anyhow!("PTY master exposes no file descriptor"))?;
        let dup = unsafe { libc::dup(fd) };
        if dup < 0 {
            return Err(std::io::Error::last_os_error()).context("failed to dup PTY master");
        }
        Ok(ChannelReader {
            fd: unsafe { OwnedFd::from_raw_fd(dup) },
        })
    }

    /// The write half, taken once. It lives outside the session's handle
    /// lock: a PTY write blocks in the kernel when the child's input queue
    /// is full, and a blocked write must not wedge cancellation or the
    /// reader.
    pub fn writer(&mut self) -> Result<ChannelWriter> {
        let inner = self
            .writer
            .take()
            .ok_or_else(|| anyhow!("writer already taken"))?;
        Ok(ChannelWriter { inner })
    }
}

/// Write side of a channel. Delivers bytes to the child as if typed at the
/// keyboard; can block until the child reads or the slave side closes.
pub struct ChannelWriter {
    inner: Box<dyn Write + Send>,
}

impl ChannelWriter {
    pub fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes)?;
        self.inner.flush()
    }
}

/// Read side of a channel, owned by the session's reader loop.
pub struct ChannelReader {
    fd: OwnedFd,
}

impl ChannelReader {
    /// Wait up to `timeout` for the endpoint to become readable, then read
    /// one chunk. EOF and a vanished child side both map to `Closed`.
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> ReadOutcome {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc == 0 {
            return ReadOutcome::TimedOut;
        }
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            return if err.kind() == std::io::ErrorKind::Interrupted {
                ReadOutcome::TimedOut
            } else {
                ReadOutcome::Closed
            };
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return ReadOutcome::Closed;
        }

        // POLLHUP can arrive while buffered output is still readable, so
        // always attempt the read and let its result decide.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        match n {
            0 => ReadOutcome::Closed,
            n if n > 0 => ReadOutcome::Data(n as usize),
            _ => {
                let err = std::io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => ReadOutcome::TimedOut,
                    // Linux reports EIO on the master once the child side
                    // has closed.
                    _ => ReadOutcome::Closed,
                }
            }
        }
    }
}

/// Enable canonical mode and echo on the terminal, and set the usual control
/// characters. The pty pair shares one termios, so tuning through the master
/// configures what the child will inherit.
fn tune_line_discipline(fd: RawFd) -> std::io::Result<()> {
    unsafe {
        let mut termios = std::mem::zeroed::<libc::termios>();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        termios.c_lflag |= libc::ICANON | libc::ECHO;
        termios.c_cc[libc::VINTR] = 0x03; // Ctrl+C
        termios.c_cc[libc::VEOF] = 0x04; // Ctrl+D
        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

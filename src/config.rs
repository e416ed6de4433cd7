//! Engine tunables.

use std::time::Duration;

/// Tunables shared by every session a registry creates.
///
/// The defaults match the behavior interactive line-oriented tools expect:
/// a wide terminal, a bounded output window, and prompt-but-not-busy polling.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Shell used to run command strings (`<shell> -c <command>`).
    pub shell: String,
    /// TERM value exported to the child.
    pub term: String,
    /// Terminal width in columns, also exported as COLUMNS.
    pub cols: u16,
    /// Terminal height in rows, also exported as LINES.
    pub rows: u16,
    /// Hard ceiling on retained output, in characters. Older content is
    /// dropped so only the trailing window survives.
    pub max_output_chars: usize,
    /// Ceiling on snapshot output, in characters. Snapshots over the cap are
    /// prefixed with [`crate::types::TRUNCATION_MARKER`].
    pub snapshot_output_chars: usize,
    /// Bounded wait for channel readability per reader iteration. This also
    /// bounds how quickly process exit is noticed.
    pub poll_interval: Duration,
    /// Pause before the post-exit drain, letting the child flush output
    /// written right at exit.
    pub exit_drain_delay: Duration,
    /// Read timeout used during the post-exit drain.
    pub drain_read_timeout: Duration,
    /// How long `cancel` waits after SIGTERM before escalating to SIGKILL.
    pub terminate_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            term: "xterm".to_string(),
            cols: 120,
            rows: 40,
            max_output_chars: 50_000,
            snapshot_output_chars: 30_000,
            poll_interval: Duration::from_millis(500),
            exit_drain_delay: Duration::from_millis(200),
            drain_read_timeout: Duration::from_millis(100),
            terminate_grace: Duration::from_secs(3),
        }
    }
}

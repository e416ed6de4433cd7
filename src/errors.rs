//! Error types surfaced to embedders.

use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// Failures a caller can act on. Spawn failures are not here: they surface
/// as a `failed`-state session handle rather than an error, so the caller
/// always gets an identifier it can inspect.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The identifier is unknown to the registry (never existed, or removed
    /// by `clear`). Distinct from delivery failures so clients can tell
    /// "already cleaned up" apart from "exists but not accepting input".
    #[error("session not found: {0}")]
    NotFound(String),

    /// Input could not be delivered: the session is not running, or the
    /// channel write failed. The session itself is unaffected.
    #[error("input could not be delivered: {0}")]
    SendFailed(String),
}

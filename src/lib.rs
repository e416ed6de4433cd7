//! Interactive command sessions on pseudo-terminals.
//!
//! This crate runs opaque shell commands attached to a PTY so that
//! line-oriented interactive tools (calibration wizards, prompts waiting on
//! Enter) behave exactly as they do in a real terminal. Each session streams
//! child output into a bounded in-memory buffer, accepts keystroke-level
//! input, and can be cancelled with SIGTERM-then-SIGKILL escalation against
//! the child's whole process group.
//!
//! The intended embedding is an HTTP service: handlers call into a single
//! [`SessionRegistry`], poll [`Snapshot`]s, and forward input. Sessions are
//! fully independent units of concurrency and share nothing but the
//! registry map.
//!
//! ```no_run
//! use interactive_sessions::SessionRegistry;
//!
//! # async fn demo() {
//! let registry = SessionRegistry::default();
//! let handle = registry.create("echo ready; read line; echo done");
//! registry.send_enter(&handle.id).unwrap();
//! let snap = registry.snapshot(&handle.id).unwrap();
//! println!("{}: {}", snap.state, snap.output);
//! # }
//! ```

pub mod buffer;
pub mod channel;
pub mod config;
pub mod errors;
pub mod registry;
pub mod session;
pub mod types;

pub use config::SessionConfig;
pub use errors::{SessionError, SessionResult};
pub use registry::SessionRegistry;
pub use session::InteractiveSession;
pub use types::{SessionState, Snapshot, TRUNCATION_MARKER};

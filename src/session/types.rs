//! External collaborator seams for the session engine.
//!
//! The engine never renders or notifies directly; it hands render
//! operations and idle events to whatever surface the host application
//! wires in.

use std::path::Path;
use std::time::SystemTime;

use anyhow::Result;

use crate::ansi::RenderOp;

/// Accepts decoded terminal output for display.
///
/// One implementation per target UI layer; the engine only guarantees
/// that a session's operations arrive in output order.
pub trait RenderSink: Send + Sync {
    /// Apply a batch of render operations for the session at `path`.
    fn apply(&self, path: &Path, ops: &[RenderOp]);
    /// The session's process has exited and no more output will arrive.
    fn session_ended(&self, path: &Path);
}

/// Receives the one-shot "session went idle" notification.
pub trait NotificationSink: Send + Sync {
    fn session_idle(&self, path: &Path);
}

/// Resolves which shell command to run for an agent in a worktree.
/// Owned by configuration management; the engine only consumes it.
pub trait CommandResolver: Send + Sync {
    fn resolve(&self, working_dir: &Path, agent: &str) -> Result<String>;
}

/// Sink that discards everything; useful for headless operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn apply(&self, _path: &Path, _ops: &[RenderOp]) {}
    fn session_ended(&self, _path: &Path) {}
}

impl NotificationSink for NullSink {
    fn session_idle(&self, _path: &Path) {}
}

/// Bookkeeping snapshot of a session, mirroring what the registry owns.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Canonical worktree path that keys the session.
    pub path: std::path::PathBuf,
    /// The agent command the session was started with.
    pub command: String,
    /// When the session was launched.
    pub started: SystemTime,
    /// Whether the process was live at snapshot time.
    pub is_alive: bool,
}

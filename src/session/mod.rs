//! Session lifecycle: one PTY-backed agent process per worktree.
//!
//! This module provides:
//! - `SessionRegistry` - Keeps at most one live session per worktree path
//! - `ManagedSession` - A single launched process with its reader thread
//! - `InactivityTracker` - Detects when a running command has gone quiet

pub mod inactivity;
pub mod manager;
mod reader;
pub mod types;

pub use inactivity::{InactivitySettings, InactivityTracker};
pub use manager::{ManagedSession, SessionRegistry};
pub use types::{CommandResolver, NotificationSink, NullSink, RenderSink, SessionInfo};

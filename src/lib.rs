//! agentterm library crate.
//!
//! This library provides the embedded terminal session engine:
//! - Launching coding-agent processes inside PTYs
//! - Incremental ANSI parsing into renderer-agnostic ops
//! - Inactivity detection for long-running commands
//! - A registry keyed by worktree path with at most one live session each

pub mod ansi;
pub mod config;
pub mod error;
pub mod pty;
pub mod session;

pub use ansi::{AnsiParser, Color, RenderOp, Style};
pub use config::EngineConfig;
pub use error::LaunchError;
pub use pty::{
    BridgeController, EmbeddedBridge, Launched, NativeSpawner, ProcessHandle, ProcessStatus, Spawn,
};
pub use session::{
    CommandResolver, InactivitySettings, NotificationSink, NullSink, RenderSink, SessionInfo,
    SessionRegistry,
};

//! Process handles and PTY launching.
//!
//! A session's shell can be backed by an OS pseudo-terminal or by an
//! embedded emulator bridge; both expose the same small capability set.

pub mod bridge;
pub mod launch;
pub mod native;

pub use bridge::{BridgeController, EmbeddedBridge};
pub use launch::{launch, NativeSpawner};
pub use native::NativePty;

use std::io::Read;
use std::path::Path;

use anyhow::Result;

use crate::error::LaunchError;

/// Liveness of the process behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited,
}

/// Capability set shared by all session process backends.
pub trait ProcessHandle: Send {
    /// Non-blocking liveness probe.
    fn poll(&mut self) -> ProcessStatus;
    /// Forward keyboard input bytes to the process.
    fn write(&mut self, data: &[u8]) -> Result<()>;
    /// Update the terminal window size.
    fn resize(&mut self, rows: u16, cols: u16) -> Result<()>;
    /// Ask the process to stop gracefully. Must be safe to call more
    /// than once.
    fn terminate(&mut self);
}

/// A freshly launched process: the control handle plus the output stream
/// the session's reader loop will own.
pub struct Launched {
    pub handle: Box<dyn ProcessHandle>,
    pub output: Box<dyn Read + Send>,
}

/// Seam for creating session processes, so the registry can be exercised
/// without real PTYs.
pub trait Spawn: Send + Sync {
    fn spawn(
        &self,
        command: &str,
        working_dir: &Path,
        rows: u16,
        cols: u16,
    ) -> Result<Launched, LaunchError>;
}

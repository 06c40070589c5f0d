//! Launch failure taxonomy.
//!
//! Only launch failures are surfaced synchronously to callers; a session
//! that dies mid-use is a lifecycle event, not an error, and shows up as
//! "no live session" on the next lookup.

use std::path::PathBuf;

/// Errors that can occur while starting a terminal session.
#[derive(Debug)]
pub enum LaunchError {
    /// The requested working directory does not exist.
    WorkingDirMissing(PathBuf),
    /// Allocating the PTY pair failed.
    OpenPty(String),
    /// Spawning the shell on the PTY slave failed.
    Spawn(String),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::WorkingDirMissing(path) => {
                write!(f, "Working directory does not exist: {}", path.display())
            }
            LaunchError::OpenPty(e) => write!(f, "Terminal could not be started: {}", e),
            LaunchError::Spawn(e) => write!(f, "Failed to spawn shell: {}", e),
        }
    }
}

impl std::error::Error for LaunchError {}

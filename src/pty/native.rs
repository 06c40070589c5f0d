//! OS pseudo-terminal backed process handle.

use std::io::Write;

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use portable_pty::{Child, PtyPair, PtySize};
use tracing::debug;

use super::{Launched, ProcessHandle, ProcessStatus};

/// A session process attached to a native PTY.
///
/// Owns the PTY pair and the child exclusively; dropping the handle
/// closes the master descriptor exactly once.
pub struct NativePty {
    pair: PtyPair,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl NativePty {
    pub(crate) fn from_parts(
        pair: PtyPair,
        child: Box<dyn Child + Send + Sync>,
    ) -> Result<Launched> {
        let writer = pair.master.take_writer().context("Failed to take PTY writer")?;
        let output = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        Ok(Launched {
            handle: Box::new(Self {
                pair,
                child,
                writer,
            }),
            output,
        })
    }
}

impl ProcessHandle for NativePty {
    fn poll(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            // A probe error means the child is gone.
            Ok(Some(_)) | Err(_) => ProcessStatus::Exited,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.pair
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    fn terminate(&mut self) {
        // SIGTERM rather than a hard kill so the shell can clean up.
        if let Some(pid) = self.child.process_id() {
            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(%pid, %err, "SIGTERM failed, falling back to kill");
                let _ = self.child.kill();
            }
        } else {
            let _ = self.child.kill();
        }
    }
}

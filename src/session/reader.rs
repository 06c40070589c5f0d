//! Per-session background reader loop.
//!
//! Exactly one reader owns a session's output stream for its lifetime.
//! Chunks are stamped for the inactivity detector before parsing, and
//! the decoded operations go straight to the render sink, in order.

use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::inactivity::InactivityTracker;
use super::types::RenderSink;
use crate::ansi::AnsiParser;

/// Read size per loop iteration. 4 KiB is plenty for interactive output.
const READ_CHUNK: usize = 4096;

/// State shared between a session's reader thread and the registry.
///
/// The parser and its partial-sequence buffer stay confined to the
/// reader thread; only the flags and the tracker cross threads.
pub(crate) struct SessionShared {
    /// Set when the stream reaches EOF or errors; the session is dead.
    pub exited: AtomicBool,
    /// Teardown request; checked between reads.
    pub stop: AtomicBool,
    pub tracker: Mutex<InactivityTracker>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            exited: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            tracker: Mutex::new(InactivityTracker::new()),
        }
    }
}

/// Spawn the reader loop for one session.
///
/// The loop exits on EOF, on a descriptor error, or once the stop flag
/// is observed after the PTY is closed under it. Both endings mark the
/// session exited and emit the sink's session-ended notice.
pub(crate) fn spawn_reader(
    path: PathBuf,
    mut output: Box<dyn Read + Send>,
    shared: Arc<SessionShared>,
    sink: Arc<dyn RenderSink>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut parser = AnsiParser::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
            match output.read(&mut buf) {
                Ok(0) => break, // EOF: process exited
                Ok(n) => {
                    {
                        let mut tracker =
                            shared.tracker.lock().expect("tracker lock poisoned");
                        tracker.note_output(Instant::now());
                    }
                    let ops = parser.feed(&buf[..n]);
                    if !ops.is_empty() {
                        sink.apply(&path, &ops);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    // Treated like EOF: stop reading, mark dead.
                    debug!(path = %path.display(), %err, "PTY read failed");
                    break;
                }
            }
        }
        shared.exited.store(true, Ordering::SeqCst);
        sink.session_ended(&path);
    })
}

/// Wait up to `timeout` for the reader thread to stop, then give up.
/// Leaking the loop is preferred to hanging application shutdown.
pub(crate) fn join_bounded(handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    debug!("reader loop did not stop in time, detaching");
}

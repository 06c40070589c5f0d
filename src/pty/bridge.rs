//! Channel-backed process handle for embedded terminal emulators.
//!
//! Some render targets embed their own terminal widget and emit the
//! byte stream themselves instead of going through an OS PTY. The bridge
//! adapts that arrangement to the same `ProcessHandle` capability set,
//! and doubles as the process fake in tests.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use super::{Launched, ProcessHandle, ProcessStatus};

/// Shared state between the handle and its controller.
#[derive(Default)]
struct BridgeState {
    written: Mutex<Vec<u8>>,
    size: Mutex<Option<(u16, u16)>>,
}

/// Handle for a session whose terminal lives on the other side of a
/// bridge (an embedded emulator, or a test driving the engine).
pub struct EmbeddedBridge {
    running: Arc<AtomicBool>,
    output_tx: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    state: Arc<BridgeState>,
}

/// The far side of the bridge: feeds output bytes and observes what the
/// engine wrote and requested.
#[derive(Clone)]
pub struct BridgeController {
    running: Arc<AtomicBool>,
    output_tx: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    state: Arc<BridgeState>,
}

impl EmbeddedBridge {
    /// Create a bridge-backed process: the `Launched` half goes to the
    /// session engine, the controller stays with the emulator.
    pub fn create() -> (Launched, BridgeController) {
        let (tx, rx) = channel::<Vec<u8>>();
        let running = Arc::new(AtomicBool::new(true));
        let output_tx = Arc::new(Mutex::new(Some(tx)));
        let state = Arc::new(BridgeState::default());

        let handle = EmbeddedBridge {
            running: Arc::clone(&running),
            output_tx: Arc::clone(&output_tx),
            state: Arc::clone(&state),
        };
        let controller = BridgeController {
            running,
            output_tx,
            state,
        };
        (
            Launched {
                handle: Box::new(handle),
                output: Box::new(ChannelReader::new(rx)),
            },
            controller,
        )
    }
}

impl ProcessHandle for EmbeddedBridge {
    fn poll(&mut self) -> ProcessStatus {
        if self.running.load(Ordering::SeqCst) {
            ProcessStatus::Running
        } else {
            ProcessStatus::Exited
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            bail!("bridge process has exited");
        }
        self.state
            .written
            .lock()
            .expect("bridge written lock poisoned")
            .extend_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        *self.state.size.lock().expect("bridge size lock poisoned") = Some((rows, cols));
        Ok(())
    }

    fn terminate(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Closing the output channel gives the reader loop its EOF.
        self.output_tx
            .lock()
            .expect("bridge output lock poisoned")
            .take();
    }
}

impl BridgeController {
    /// Feed output bytes toward the session's reader loop.
    /// Returns false once the stream has been closed.
    pub fn emit_output(&self, data: &[u8]) -> bool {
        let guard = self.output_tx.lock().expect("bridge output lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(data.to_vec()).is_ok(),
            None => false,
        }
    }

    /// End the stream and mark the process exited, as a real child
    /// terminating would.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.output_tx
            .lock()
            .expect("bridge output lock poisoned")
            .take();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Everything the engine has written toward the process so far.
    pub fn written(&self) -> Vec<u8> {
        self.state
            .written
            .lock()
            .expect("bridge written lock poisoned")
            .clone()
    }

    /// The most recent resize request, as `(rows, cols)`.
    pub fn last_resize(&self) -> Option<(u16, u16)> {
        *self.state.size.lock().expect("bridge size lock poisoned")
    }
}

/// Blocking `Read` adapter over a byte-chunk channel. Returns EOF when
/// the sending side is dropped.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl ChannelReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().expect("pending not empty");
        }
        Ok(n)
    }
}

//! Idle detection for agent sessions.
//!
//! Naive "no output for N seconds" detection fires while the user is
//! reading or typing. The tracker therefore only arms when the user
//! submits a command (Enter), waits for the first output, and fires once
//! when output stalls past the threshold while no keyboard interaction
//! is in flight. One notification per submission.

use std::time::{Duration, Instant};

/// Tuning knobs for the detector.
///
/// Output staleness and the "user is still interacting" grace window are
/// independent parameters; they merely share a default.
#[derive(Debug, Clone, Copy)]
pub struct InactivitySettings {
    /// How long output must stall before a Tracking session fires.
    pub idle_threshold: Duration,
    /// How recently keyboard input may have arrived before firing is
    /// deferred.
    pub input_grace: Duration,
}

impl Default for InactivitySettings {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(5),
            input_grace: Duration::from_secs(5),
        }
    }
}

/// Detector phases. After firing, the tracker drops back to `Idle`
/// until the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not tracking.
    Idle,
    /// User submitted a command; awaiting first output.
    Armed,
    /// Output seen; waiting for the quiet period.
    Tracking,
}

/// Per-session inactivity state machine.
#[derive(Debug)]
pub struct InactivityTracker {
    phase: Phase,
    fired: bool,
    last_input: Option<Instant>,
    last_output: Option<Instant>,
}

impl Default for InactivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InactivityTracker {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            fired: false,
            last_input: None,
            last_output: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record keyboard input. A carriage return means the user submitted
    /// a command: arm the tracker and drop stale output history so it
    /// cannot trigger an immediate false positive.
    pub fn note_input(&mut self, data: &[u8], now: Instant) {
        self.last_input = Some(now);
        if data.contains(&b'\r') {
            self.phase = Phase::Armed;
            self.fired = false;
            self.last_output = None;
        }
    }

    /// Record terminal output. The first chunk after arming moves the
    /// tracker into `Tracking`; output never clears `fired` on its own.
    pub fn note_output(&mut self, now: Instant) {
        self.last_output = Some(now);
        if self.phase == Phase::Armed {
            self.phase = Phase::Tracking;
        }
    }

    /// Periodic check. Returns true exactly once per armed submission,
    /// when output has stalled past the threshold and the user is not
    /// actively interacting.
    pub fn check(&mut self, now: Instant, settings: &InactivitySettings) -> bool {
        if self.phase != Phase::Tracking || self.fired {
            return false;
        }
        if let Some(input) = self.last_input {
            if now.duration_since(input) < settings.input_grace {
                // User is typing or scrolling; stale output age alone
                // must not fire.
                return false;
            }
        }
        let Some(output) = self.last_output else {
            return false;
        };
        if now.duration_since(output) >= settings.idle_threshold {
            self.fired = true;
            self.phase = Phase::Idle;
            return true;
        }
        false
    }
}

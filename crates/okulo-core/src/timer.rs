//! Explicit cancellable deadlines on the engine's logical timeline.
//!
//! The engine is driven by frame timestamps and explicit ticks rather than an
//! ambient runtime, so a "timer" is a deadline value stored next to the state
//! it guards. Cancelling is a plain field write, which makes a full state
//! reset deterministic: clear the deadlines, done.

/// A one-shot deadline. Fires at most once per arm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at_us: Option<i64>,
}

impl Deadline {
    pub const fn idle() -> Self {
        Self { at_us: None }
    }

    /// Arm (or re-arm) the deadline.
    pub fn arm(&mut self, at_us: i64) {
        self.at_us = Some(at_us);
    }

    pub fn cancel(&mut self) {
        self.at_us = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at_us.is_some()
    }

    pub fn at_us(&self) -> Option<i64> {
        self.at_us
    }

    /// Disarm and report true exactly once when `now_us` has reached the
    /// armed deadline. First-writer-wins races resolve through this method:
    /// whoever observes the fire first also consumes it.
    pub fn fire_if_due(&mut self, now_us: i64) -> bool {
        match self.at_us {
            Some(at) if now_us >= at => {
                self.at_us = None;
                true
            }
            _ => false,
        }
    }
}

//! Shared domain types for the screening session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use okulo_signals::pose::Direction;

// ============================================================================
// Time helpers — saturating deltas so a backwards clock cannot wrap
// ============================================================================

/// Elapsed microseconds between two timestamps, 0 if the clock went backwards.
#[inline]
pub fn dt_us(now_us: i64, last_us: i64) -> u64 {
    if now_us >= last_us {
        (now_us - last_us) as u64
    } else {
        0
    }
}

/// Elapsed seconds between two timestamps, 0.0 if the clock went backwards.
#[inline]
pub fn dt_sec(now_us: i64, last_us: i64) -> f32 {
    (dt_us(now_us, last_us) as f32) / 1_000_000.0
}

// ============================================================================
// Session vocabulary
// ============================================================================

/// Which eye is currently under test (the other is occluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

/// Chromatic adaptation condition for a trial block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adaptation {
    /// First block of the session.
    Blue,
    /// Second block, after re-locking distance.
    White,
}

/// Ordered session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestPhase {
    /// Four unscored trials, one per cardinal direction, loose thresholds.
    Practice,
    /// Waiting for distance, head-levelness, eye-height and light gates.
    DistanceLock,
    /// One staircase round for the given eye and adaptation.
    Trial { eye: Eye, adaptation: Adaptation },
    /// Terminal; only an explicit restart leaves this phase.
    Done,
}

/// Category of rate-limited user guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HintKind {
    Distance,
    Tilt,
    EyeHeight,
    Light,
}

/// Per-eye acuity thresholds; each field is written exactly once per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeResult {
    pub blue_threshold: Option<f32>,
    pub white_threshold: Option<f32>,
}

impl EyeResult {
    pub fn is_complete(&self) -> bool {
        self.blue_threshold.is_some() && self.white_threshold.is_some()
    }
}

/// Events produced by the engine for the presentation layer.
///
/// Delivered both in the return value of `handle_frame`/`tick` and over any
/// attached subscription channel. The engine never blocks on a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    PhaseChanged(TestPhase),
    Hint { kind: HintKind, message: String },
    TrialResolved { direction: Direction, correct: bool },
    SessionComplete {
        right: EyeResult,
        left: EyeResult,
        /// Mean interpupillary distance captured during the first stable
        /// lock, when enough samples were available.
        pd_mm: Option<f32>,
    },
}

/// What the hosting device reports about its tracking hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingCapability {
    /// Whether a 3D face-tracking camera is available at all.
    pub face_tracking: bool,
}

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal: the session cannot start without a face-tracking camera.
    #[error("face tracking is not supported on this device")]
    TrackingUnsupported,
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

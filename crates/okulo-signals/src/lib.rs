//! okulo-signals: per-frame signal transforms for the screening engine.
//!
//! Everything in this crate is a pure transform or a small self-contained
//! state machine over a scalar stream. Session-level orchestration lives in
//! `okulo-core`; this crate never emits hints, never owns timers, and never
//! looks at more than one frame at a time (plus its own accumulated state).

pub mod distance;
pub mod light;
pub mod pose;

#[cfg(test)]
pub mod tests_proptest;

pub use distance::{DistanceConfig, DistanceZone, GateStatus, StabilityGate};
pub use light::{LightConfig, LuxEstimator};
pub use pose::{
    pupil_distance_mm, Direction, FaceFrame, GestureThresholds, GestureWindow, PoseSample,
};

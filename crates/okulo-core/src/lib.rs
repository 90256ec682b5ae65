//! Okulo core: session state machine, adaptive staircase, and configuration
//! for the optical screening engine.
//!
//! The crate is organized around one stateful orchestrator
//! ([`ScreeningEngine`]) driven from a single logical context; everything
//! underneath it is either a pure transform (in `okulo-signals`) or a small
//! self-contained state holder (staircase, deck, deadlines, hint limiter).

pub mod config;
pub mod deck;
pub mod domain;
pub mod hints;
pub mod session;
pub mod staircase;
pub mod timer;

#[cfg(test)]
pub mod tests_proptest;

// ============================================================================
// CURATED PUBLIC API EXPORTS
// ============================================================================

// Domain types
pub use domain::{
    dt_sec,
    dt_us,
    Adaptation,
    Direction,
    EngineError,
    EngineEvent,
    Eye,
    EyeResult,
    HintKind,
    TestPhase,
    TrackingCapability,
};

// Configuration
pub use config::{ConfigError, OkuloConfig, PoseConfig, SessionConfig};

// Staircase
pub use staircase::{
    default_ladder, Staircase, StaircaseConfig, StaircaseLevel, StaircaseStep, TrialOutcome,
};

// Direction deck
pub use deck::DirectionDeck;

// Deadlines
pub use timer::Deadline;

// Hints
pub use hints::HintLimiter;

// Engine (high-level orchestrator)
pub use session::ScreeningEngine;

// Signal-layer types used at the engine boundary
pub use okulo_signals::distance::{DistanceConfig, DistanceZone, GateStatus, StabilityGate};
pub use okulo_signals::light::{LightConfig, LuxEstimator};
pub use okulo_signals::pose::{
    pupil_distance_mm, FaceFrame, GestureThresholds, GestureWindow, PoseSample,
};

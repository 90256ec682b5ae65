//! Session orchestrator: the one stateful component.
//!
//! The engine owns all mutable session state and is driven from a single
//! logical context through `handle_frame` and `tick`; subordinate components
//! (pose classification, distance gate, light estimator, staircase) are pure
//! transforms or hold only their own window state. Presentation layers get
//! events back from every call and, optionally, over a fire-and-forget
//! channel subscription — they never reach into engine state.
//!
//! Timer-vs-frame races resolve first-writer-wins: deadlines are checked
//! before the frame's pose is observed, so a hit landing after its window's
//! deadline is ignored, and a frame that resolves a trial disarms the
//! deadline so it can never fire afterwards.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use okulo_signals::distance::{DistanceZone, StabilityGate};
use okulo_signals::light::LuxEstimator;
use okulo_signals::pose::{pupil_distance_mm, FaceFrame, GestureWindow, PoseSample};

use crate::config::OkuloConfig;
use crate::domain::{
    Adaptation, Direction, EngineError, EngineEvent, Eye, EyeResult, HintKind, TestPhase,
    TrackingCapability,
};
use crate::hints::HintLimiter;
use crate::staircase::{Staircase, StaircaseStep, TrialOutcome};
use crate::timer::Deadline;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Practice runs one unscored trial per cardinal direction, in this order.
const PRACTICE_SEQUENCE: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

/// Mean interpupillary distance accumulated during the first stable lock.
#[derive(Debug, Clone, Default)]
struct PdAccumulator {
    sum_mm: f32,
    count: u32,
    captured_mm: Option<f32>,
}

impl PdAccumulator {
    fn observe(&mut self, mm: f32) {
        if self.captured_mm.is_none() && mm.is_finite() {
            self.sum_mm += mm;
            self.count += 1;
        }
    }

    fn capture_if_ready(&mut self, min_samples: u32) {
        if self.captured_mm.is_none() && self.count >= min_samples {
            self.captured_mm = Some(self.sum_mm / self.count as f32);
            log::info!("pupillary distance captured: {:.1} mm", self.sum_mm / self.count as f32);
        }
    }

    fn reset(&mut self) {
        *self = PdAccumulator::default();
    }
}

/// The screening measurement engine for one session.
pub struct ScreeningEngine {
    cfg: OkuloConfig,
    phase: TestPhase,

    gate: StabilityGate,
    lux: LuxEstimator,
    window: GestureWindow,
    /// Guards the currently open listening window.
    response_deadline: Deadline,
    /// Guards the chromatic adaptation countdown of the current trial block.
    adaptation_deadline: Deadline,
    staircase: Option<Staircase>,

    /// Practice directions not yet run, back of the vec first.
    practice_remaining: Vec<Direction>,
    practice_expected: Option<Direction>,

    hints: HintLimiter,
    right: EyeResult,
    left: EyeResult,
    pd: PdAccumulator,

    /// Most recent non-gap distance reading; feeds the promotion gate.
    last_distance_m: Option<f32>,
    last_frame_ts_us: Option<i64>,

    subscribers: Vec<Sender<EngineEvent>>,
}

impl ScreeningEngine {
    /// Start a new session. Fatal if the device cannot track faces at all.
    pub fn start(cfg: OkuloConfig, capability: TrackingCapability) -> Result<Self, EngineError> {
        if !capability.face_tracking {
            return Err(EngineError::TrackingUnsupported);
        }
        cfg.validate()?;

        let mut practice_remaining = PRACTICE_SEQUENCE.to_vec();
        practice_remaining.reverse();

        Ok(Self {
            gate: StabilityGate::new(cfg.distance),
            lux: LuxEstimator::new(cfg.light),
            window: GestureWindow::default(),
            response_deadline: Deadline::idle(),
            adaptation_deadline: Deadline::idle(),
            staircase: None,
            practice_remaining,
            practice_expected: None,
            hints: HintLimiter::new(cfg.session.hint_cooldown_us),
            right: EyeResult::default(),
            left: EyeResult::default(),
            pd: PdAccumulator::default(),
            last_distance_m: None,
            last_frame_ts_us: None,
            subscribers: Vec::new(),
            phase: TestPhase::Practice,
            cfg,
        })
    }

    /// Attach a fire-and-forget event subscription. Events are delivered with
    /// `try_send`; a slow subscriber loses events rather than blocking the
    /// frame path.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    /// (right, left) results accumulated so far.
    pub fn results(&self) -> (EyeResult, EyeResult) {
        (self.right, self.left)
    }

    pub fn pd_mm(&self) -> Option<f32> {
        self.pd.captured_mm
    }

    /// Current staircase level index, while a trial block is running.
    pub fn current_staircase_level(&self) -> Option<usize> {
        self.staircase.as_ref().map(|s| s.level_index())
    }

    /// Feed one face-tracking frame plus the per-frame scalar collaborators.
    ///
    /// `distance_m` is None when the ranging source is momentarily
    /// unavailable (a gap); `exposure` is (duration seconds, sensor gain).
    pub fn handle_frame(
        &mut self,
        frame: &FaceFrame,
        distance_m: Option<f32>,
        exposure: Option<(f32, f32)>,
    ) -> Vec<EngineEvent> {
        let mut out = Vec::new();

        // Stale or out-of-order frames are discarded without touching state.
        if let Some(last) = self.last_frame_ts_us {
            if frame.ts_us <= last {
                log::trace!("discarding stale frame ts={} last={}", frame.ts_us, last);
                return out;
            }
        }
        self.last_frame_ts_us = Some(frame.ts_us);

        // Sensor fusion runs in every phase.
        if let Some((t, s)) = exposure {
            self.lux.update(t, s);
        }
        let gate_status = self.gate.update(frame.ts_us, distance_m);
        if distance_m.is_some() {
            self.last_distance_m = distance_m;
        }
        let pose = PoseSample::from_frame(frame);

        // Deadlines fire before the frame is observed: a timeout that has
        // already passed wins over a hit carried by this frame.
        self.advance_deadlines(frame.ts_us, &mut out);

        match self.phase {
            TestPhase::Practice => self.practice_frame(frame.ts_us, &pose, &mut out),
            TestPhase::DistanceLock => {
                self.lock_frame(frame, &pose, gate_status.zone, &mut out)
            }
            TestPhase::Trial { .. } => self.trial_frame(frame.ts_us, &pose, &mut out),
            TestPhase::Done => log::trace!("frame ignored in Done"),
        }

        self.forward(&out);
        out
    }

    /// Advance the engine clock without a frame; fires due deadlines.
    pub fn tick(&mut self, now_us: i64) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        self.advance_deadlines(now_us, &mut out);
        self.forward(&out);
        out
    }

    /// Explicit restart: cancel every pending deadline and reset all
    /// subordinate state before any new frame is processed.
    pub fn restart(&mut self) -> Vec<EngineEvent> {
        self.response_deadline.cancel();
        self.adaptation_deadline.cancel();
        self.window.reset();
        self.gate.reset();
        self.lux.reset();
        self.hints.reset();
        self.staircase = None;
        self.right = EyeResult::default();
        self.left = EyeResult::default();
        self.pd.reset();
        self.last_distance_m = None;
        self.last_frame_ts_us = None;
        self.practice_remaining = {
            let mut v = PRACTICE_SEQUENCE.to_vec();
            v.reverse();
            v
        };
        self.practice_expected = None;
        self.phase = TestPhase::Practice;

        let out = vec![EngineEvent::PhaseChanged(TestPhase::Practice)];
        self.forward(&out);
        out
    }

    // ========================================================================
    // Deadline routing
    // ========================================================================

    fn advance_deadlines(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        if self.adaptation_deadline.fire_if_due(now_us) {
            log::debug!("adaptation countdown complete at {}", now_us);
            self.open_trial_window(now_us);
        }
        if self.response_deadline.fire_if_due(now_us) {
            match self.phase {
                TestPhase::Practice => self.resolve_practice_timeout(now_us, out),
                TestPhase::Trial { .. } => self.resolve_trial_at_deadline(now_us, out),
                _ => {}
            }
        }
    }

    // ========================================================================
    // Practice
    // ========================================================================

    fn practice_frame(&mut self, ts_us: i64, pose: &PoseSample, out: &mut Vec<EngineEvent>) {
        if self.practice_expected.is_none() {
            // First frame of the phase starts the first practice trial.
            self.advance_practice(ts_us, out);
        }
        let Some(expected) = self.practice_expected else {
            return;
        };
        if !self.window.is_open() {
            return;
        }

        self.window.observe(pose, &self.cfg.pose.practice);
        if self.window.hit(expected) {
            // Frame wins: the timeout must never fire for this window.
            self.response_deadline.cancel();
            self.window.close();
            out.push(EngineEvent::TrialResolved {
                direction: expected,
                correct: true,
            });
            self.practice_expected = None;
            self.advance_practice(ts_us, out);
        }
    }

    fn resolve_practice_timeout(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        let Some(expected) = self.practice_expected.take() else {
            return;
        };
        self.window.close();
        out.push(EngineEvent::TrialResolved {
            direction: expected,
            correct: false,
        });
        self.advance_practice(now_us, out);
    }

    fn advance_practice(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        match self.practice_remaining.pop() {
            Some(dir) => {
                let deadline = now_us + self.cfg.session.practice_window_us as i64;
                self.practice_expected = Some(dir);
                self.window = GestureWindow::open_until(deadline);
                self.response_deadline.arm(deadline);
                log::debug!("practice trial {:?}, window until {}", dir, deadline);
            }
            None => self.enter_distance_lock(out),
        }
    }

    // ========================================================================
    // Distance lock
    // ========================================================================

    fn enter_distance_lock(&mut self, out: &mut Vec<EngineEvent>) {
        self.response_deadline.cancel();
        self.adaptation_deadline.cancel();
        self.window.reset();
        self.gate.reset_dwell();
        self.phase = TestPhase::DistanceLock;
        out.push(EngineEvent::PhaseChanged(TestPhase::DistanceLock));
    }

    fn lock_frame(
        &mut self,
        frame: &FaceFrame,
        pose: &PoseSample,
        zone: DistanceZone,
        out: &mut Vec<EngineEvent>,
    ) {
        let s = &self.cfg.session;

        let distance_ok = self.gate.is_locked();
        let tilt_ok = pose.roll_deg.abs() <= s.roll_tolerance_deg;
        let left = frame.left_eye_position();
        let right = frame.right_eye_position();
        let eyes_ok = (left.y - right.y).abs() <= s.eye_height_tolerance_m;
        let light_ok = self.lux.is_sufficient();

        if zone == DistanceZone::Ok {
            self.pd.observe(pupil_distance_mm(frame));
        } else {
            let msg = if zone == DistanceZone::Near {
                "Move the phone a little farther away"
            } else {
                "Move the phone a little closer"
            };
            if let Some(ev) = self.hints.request(frame.ts_us, HintKind::Distance, msg) {
                out.push(ev);
            }
        }

        // A failing co-gate restarts the whole wait, not just its own check.
        if !tilt_ok {
            self.gate.reset_dwell();
            if let Some(ev) =
                self.hints
                    .request(frame.ts_us, HintKind::Tilt, "Hold your head level")
            {
                out.push(ev);
            }
        }
        if !eyes_ok {
            self.gate.reset_dwell();
            if let Some(ev) = self.hints.request(
                frame.ts_us,
                HintKind::EyeHeight,
                "Hold the phone at eye height",
            ) {
                out.push(ev);
            }
        }
        if !light_ok {
            if let Some(ev) = self.hints.request(
                frame.ts_us,
                HintKind::Light,
                "Move somewhere brighter",
            ) {
                out.push(ev);
            }
        }

        if distance_ok && tilt_ok && eyes_ok && light_ok {
            self.pd.capture_if_ready(s.pd_min_samples);
            self.enter_next_trial(frame.ts_us, out);
        }
    }

    // ========================================================================
    // Trials
    // ========================================================================

    /// The fixed session sequence, derived from which results are missing:
    /// blue right, blue left, (re-lock), white right, white left.
    fn next_trial_slot(&self) -> Option<(Eye, Adaptation)> {
        if self.right.blue_threshold.is_none() {
            Some((Eye::Right, Adaptation::Blue))
        } else if self.left.blue_threshold.is_none() {
            Some((Eye::Left, Adaptation::Blue))
        } else if self.right.white_threshold.is_none() {
            Some((Eye::Right, Adaptation::White))
        } else if self.left.white_threshold.is_none() {
            Some((Eye::Left, Adaptation::White))
        } else {
            None
        }
    }

    fn enter_next_trial(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        let Some((eye, adaptation)) = self.next_trial_slot() else {
            self.enter_done(out);
            return;
        };
        self.phase = TestPhase::Trial { eye, adaptation };
        self.staircase = Some(Staircase::new(&self.cfg.staircase));
        self.window.reset();
        self.response_deadline.cancel();
        self.adaptation_deadline
            .arm(now_us + self.cfg.session.adaptation_us as i64);
        log::info!("trial block {:?}/{:?}; adapting", eye, adaptation);
        out.push(EngineEvent::PhaseChanged(self.phase));
    }

    fn open_trial_window(&mut self, now_us: i64) {
        if self.staircase.is_none() {
            return;
        }
        let deadline = now_us + self.cfg.session.response_window_us as i64;
        self.window = GestureWindow::open_until(deadline);
        self.response_deadline.arm(deadline);
    }

    fn trial_frame(&mut self, ts_us: i64, pose: &PoseSample, out: &mut Vec<EngineEvent>) {
        if !self.window.is_open() {
            return;
        }
        let Some(expected) = self.staircase.as_ref().map(|s| s.current_direction()) else {
            return;
        };

        self.window.observe(pose, &self.cfg.pose.formal);
        if self.window.hit(expected) {
            self.response_deadline.cancel();
            self.window.close();
            out.push(EngineEvent::TrialResolved {
                direction: expected,
                correct: true,
            });
            self.apply_staircase(TrialOutcome::Correct, ts_us, out);
        }
    }

    /// Window timed out: correct if the expected direction was hit along the
    /// way, incorrect if some other direction was, otherwise no response.
    fn resolve_trial_at_deadline(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        let Some(expected) = self.staircase.as_ref().map(|s| s.current_direction()) else {
            return;
        };
        self.window.close();

        let outcome = if self.window.hit(expected) {
            TrialOutcome::Correct
        } else if self.window.any_hit() {
            TrialOutcome::Incorrect
        } else {
            TrialOutcome::NoResponse
        };

        if outcome != TrialOutcome::NoResponse {
            out.push(EngineEvent::TrialResolved {
                direction: expected,
                correct: outcome == TrialOutcome::Correct,
            });
        }
        self.apply_staircase(outcome, now_us, out);
    }

    fn apply_staircase(&mut self, outcome: TrialOutcome, now_us: i64, out: &mut Vec<EngineEvent>) {
        let Some(staircase) = self.staircase.as_mut() else {
            return;
        };
        let step = staircase.record(outcome, self.last_distance_m);

        match step {
            StaircaseStep::Continue { .. } => self.open_trial_window(now_us),
            StaircaseStep::Retry { distance_hint, .. } => {
                if distance_hint {
                    if let Some(ev) = self.hints.request(
                        now_us,
                        HintKind::Distance,
                        "Hold the phone at arm's length again",
                    ) {
                        out.push(ev);
                    }
                }
                self.open_trial_window(now_us);
            }
            StaircaseStep::Finished { score, .. } => {
                self.record_round_score(score);
                self.staircase = None;
                self.window.reset();
                self.advance_after_round(now_us, out);
            }
        }
    }

    /// Write the round score into its result slot, exactly once.
    fn record_round_score(&mut self, score: f32) {
        let TestPhase::Trial { eye, adaptation } = self.phase else {
            return;
        };
        let result = match eye {
            Eye::Right => &mut self.right,
            Eye::Left => &mut self.left,
        };
        let slot = match adaptation {
            Adaptation::Blue => &mut result.blue_threshold,
            Adaptation::White => &mut result.white_threshold,
        };
        if slot.is_none() {
            *slot = Some(score);
        } else {
            log::warn!("{:?}/{:?} score already recorded; keeping first", eye, adaptation);
        }
    }

    fn advance_after_round(&mut self, now_us: i64, out: &mut Vec<EngineEvent>) {
        match self.phase {
            // Same adaptation, switch eyes without re-locking.
            TestPhase::Trial { eye: Eye::Right, .. } => self.enter_next_trial(now_us, out),
            // Adaptation change after the left-blue round: re-lock first.
            TestPhase::Trial {
                eye: Eye::Left,
                adaptation: Adaptation::Blue,
            } => self.enter_distance_lock(out),
            TestPhase::Trial {
                eye: Eye::Left,
                adaptation: Adaptation::White,
            } => self.enter_done(out),
            _ => {}
        }
    }

    fn enter_done(&mut self, out: &mut Vec<EngineEvent>) {
        self.response_deadline.cancel();
        self.adaptation_deadline.cancel();
        self.window.reset();
        self.phase = TestPhase::Done;
        out.push(EngineEvent::PhaseChanged(TestPhase::Done));
        out.push(EngineEvent::SessionComplete {
            right: self.right,
            left: self.left,
            pd_mm: self.pd.captured_mm,
        });
        log::info!(
            "session complete: right={:?} left={:?} pd={:?}",
            self.right,
            self.left,
            self.pd.captured_mm
        );
    }

    // ========================================================================
    // Event fan-out
    // ========================================================================

    /// Forward events to subscribers without blocking; a full channel drops
    /// the event, a disconnected subscriber is removed.
    fn forward(&mut self, events: &[EngineEvent]) {
        if events.is_empty() || self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| {
            for ev in events {
                match tx.try_send(ev.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::warn!("subscriber channel full; event dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
            true
        });
    }
}

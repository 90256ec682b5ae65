//! Adaptive acuity staircase with a 3-trial promotion rule.
//!
//! Each level runs up to three trials. Two correct responses attempt a
//! promotion; two incorrect responses (or one correct out of three) fail the
//! level and end the round. Promotion is additionally gated on the measured
//! working distance: drifting out of position is never penalized — the level
//! is simply retried with fresh counters.
//!
//! The score for a round is the acuity value of the best level actually
//! passed, defaulting to the easiest level's value when nothing was passed.

use serde::{Deserialize, Serialize};

use crate::deck::DirectionDeck;
use crate::domain::Direction;

/// One rung of the difficulty ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaircaseLevel {
    /// Ascending difficulty index (decimal visual acuity).
    pub acuity_score: f32,
    /// Stimulus size at the target distance, millimeters.
    pub stimulus_size_mm: f32,
}

/// Staircase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaircaseConfig {
    /// Working distance the ladder was built for.
    pub target_distance_m: f32,
    /// Allowed deviation from the target at promotion time.
    pub distance_tolerance_m: f32,
    /// Difficulty ladder, easiest first. Built once at engine construction.
    pub levels: Vec<StaircaseLevel>,
    /// Optional deterministic seed for the direction deck.
    pub deck_seed: Option<u64>,
}

impl Default for StaircaseConfig {
    fn default() -> Self {
        Self {
            target_distance_m: 0.40,
            distance_tolerance_m: 0.05,
            levels: default_ladder(),
            deck_seed: None,
        }
    }
}

/// Stock ladder: decimal acuity 0.1 through 1.0 with optotype sizes for a
/// 40 cm working distance (a 5-arcmin optotype at acuity 1.0 is ~0.58 mm).
pub fn default_ladder() -> Vec<StaircaseLevel> {
    [
        (0.1, 5.82),
        (0.2, 2.91),
        (0.3, 1.94),
        (0.4, 1.45),
        (0.5, 1.16),
        (0.6, 0.97),
        (0.8, 0.73),
        (1.0, 0.58),
    ]
    .iter()
    .map(|&(acuity_score, stimulus_size_mm)| StaircaseLevel {
        acuity_score,
        stimulus_size_mm,
    })
    .collect()
}

/// How one trial resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Correct,
    Incorrect,
    /// No direction crossed its threshold within the window. The trial is
    /// discarded entirely and does not count toward the level's counters.
    NoResponse,
}

/// What the controller wants next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaircaseStep {
    /// Run another trial at the (possibly newly promoted) level.
    Continue { direction: Direction },
    /// Promotion was blocked by the distance gate: same level, counters
    /// reset, the user should be nudged back into position.
    Retry {
        direction: Direction,
        distance_hint: bool,
    },
    /// Round over.
    Finished {
        score: f32,
        best_passed: Option<usize>,
    },
}

/// One staircase round for a single (eye, adaptation) pair.
#[derive(Debug, Clone)]
pub struct Staircase {
    target_distance_m: f32,
    distance_tolerance_m: f32,
    levels: Vec<StaircaseLevel>,
    level_index: usize,
    trials_this_level: u8,
    correct_this_level: u8,
    best_passed: Option<usize>,
    deck: DirectionDeck,
    current_direction: Direction,
    finished: bool,
}

impl Staircase {
    pub fn new(cfg: &StaircaseConfig) -> Self {
        let mut deck = match cfg.deck_seed {
            Some(seed) => DirectionDeck::with_seed(seed),
            None => DirectionDeck::new(),
        };
        let current_direction = deck.draw();
        Self {
            target_distance_m: cfg.target_distance_m,
            distance_tolerance_m: cfg.distance_tolerance_m,
            levels: cfg.levels.clone(),
            level_index: 0,
            trials_this_level: 0,
            correct_this_level: 0,
            best_passed: None,
            deck,
            current_direction,
            finished: false,
        }
    }

    /// Direction the user must gesture for the current trial.
    pub fn current_direction(&self) -> Direction {
        self.current_direction
    }

    pub fn current_level(&self) -> &StaircaseLevel {
        &self.levels[self.level_index.min(self.levels.len() - 1)]
    }

    pub fn level_index(&self) -> usize {
        self.level_index
    }

    pub fn trials_this_level(&self) -> u8 {
        self.trials_this_level
    }

    pub fn correct_this_level(&self) -> u8 {
        self.correct_this_level
    }

    pub fn best_passed(&self) -> Option<usize> {
        self.best_passed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Score for the round so far: best passed level, or the easiest level's
    /// value when nothing was ever passed.
    pub fn score(&self) -> f32 {
        let idx = self.best_passed.unwrap_or(0);
        self.levels[idx.min(self.levels.len() - 1)].acuity_score
    }

    /// Record one resolved trial and decide the next step.
    ///
    /// `distance_m` is the most recent working-distance reading, consulted
    /// only when a promotion is attempted.
    pub fn record(&mut self, outcome: TrialOutcome, distance_m: Option<f32>) -> StaircaseStep {
        if self.finished {
            return StaircaseStep::Finished {
                score: self.score(),
                best_passed: self.best_passed,
            };
        }

        if outcome == TrialOutcome::NoResponse {
            // Discarded entirely: fresh trial, same counters.
            log::debug!(
                "no response at level {} (trial would have been #{})",
                self.level_index,
                self.trials_this_level + 1
            );
            self.current_direction = self.deck.draw();
            return StaircaseStep::Continue {
                direction: self.current_direction,
            };
        }

        self.trials_this_level += 1;
        if outcome == TrialOutcome::Correct {
            self.correct_this_level += 1;
        }

        match (self.trials_this_level, self.correct_this_level) {
            (1, _) => self.next_trial(),
            (2, 2) => self.attempt_promotion(distance_m),
            (2, 0) => self.fail_round(),
            (2, 1) => self.next_trial(),
            (3, c) if c >= 2 => self.attempt_promotion(distance_m),
            (3, _) => self.fail_round(),
            // Counters are reset on every level change and failed promotion,
            // so trial counts past 3 cannot occur.
            (t, c) => {
                log::warn!("unexpected staircase counters t={} c={}", t, c);
                self.fail_round()
            }
        }
    }

    fn next_trial(&mut self) -> StaircaseStep {
        self.current_direction = self.deck.draw();
        StaircaseStep::Continue {
            direction: self.current_direction,
        }
    }

    fn attempt_promotion(&mut self, distance_m: Option<f32>) -> StaircaseStep {
        let in_position = distance_m
            .map(|d| (d - self.target_distance_m).abs() <= self.distance_tolerance_m)
            .unwrap_or(false);

        if !in_position {
            // Not the user's fault: retry the same level from scratch.
            log::info!(
                "promotion blocked at level {}: distance {:?} outside ±{:.0} mm of target",
                self.level_index,
                distance_m,
                self.distance_tolerance_m * 1000.0
            );
            self.trials_this_level = 0;
            self.correct_this_level = 0;
            self.current_direction = self.deck.draw();
            return StaircaseStep::Retry {
                direction: self.current_direction,
                distance_hint: true,
            };
        }

        self.best_passed = Some(self.level_index);
        if self.level_index + 1 >= self.levels.len() {
            // Top of the ladder passed: round complete.
            return self.finish();
        }
        self.level_index += 1;
        self.trials_this_level = 0;
        self.correct_this_level = 0;
        log::debug!("promoted to level {}", self.level_index);
        self.next_trial()
    }

    fn fail_round(&mut self) -> StaircaseStep {
        log::debug!(
            "level {} failed; round ends with best_passed={:?}",
            self.level_index,
            self.best_passed
        );
        self.finish()
    }

    fn finish(&mut self) -> StaircaseStep {
        self.finished = true;
        StaircaseStep::Finished {
            score: self.score(),
            best_passed: self.best_passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StaircaseConfig {
        StaircaseConfig {
            deck_seed: Some(1),
            ..StaircaseConfig::default()
        }
    }

    const AT_TARGET: Option<f32> = Some(0.40);

    #[test]
    fn two_of_two_promotes_with_counters_reset() {
        let mut s = Staircase::new(&cfg());
        assert_eq!(s.level_index(), 0);

        let step = s.record(TrialOutcome::Correct, AT_TARGET);
        assert!(matches!(step, StaircaseStep::Continue { .. }));
        let step = s.record(TrialOutcome::Correct, AT_TARGET);
        assert!(matches!(step, StaircaseStep::Continue { .. }));

        assert_eq!(s.level_index(), 1);
        assert_eq!(s.trials_this_level(), 0);
        assert_eq!(s.correct_this_level(), 0);
        assert_eq!(s.best_passed(), Some(0));
    }

    #[test]
    fn promotion_blocked_out_of_tolerance() {
        let mut s = Staircase::new(&cfg());
        s.record(TrialOutcome::Correct, AT_TARGET);
        let step = s.record(TrialOutcome::Correct, Some(0.60));

        match step {
            StaircaseStep::Retry { distance_hint, .. } => assert!(distance_hint),
            other => panic!("expected Retry, got {:?}", other),
        }
        assert_eq!(s.level_index(), 0);
        assert_eq!(s.trials_this_level(), 0);
        assert_eq!(s.correct_this_level(), 0);
        assert_eq!(s.best_passed(), None);
        assert!(!s.is_finished());
    }

    #[test]
    fn two_of_three_promotes() {
        let mut s = Staircase::new(&cfg());
        s.record(TrialOutcome::Correct, AT_TARGET);
        let step = s.record(TrialOutcome::Incorrect, AT_TARGET);
        assert!(matches!(step, StaircaseStep::Continue { .. }));
        let step = s.record(TrialOutcome::Correct, AT_TARGET);
        assert!(matches!(step, StaircaseStep::Continue { .. }));
        assert_eq!(s.level_index(), 1);
    }

    #[test]
    fn zero_of_two_fails_round_with_default_score() {
        let mut s = Staircase::new(&cfg());
        s.record(TrialOutcome::Incorrect, AT_TARGET);
        let step = s.record(TrialOutcome::Incorrect, AT_TARGET);

        match step {
            StaircaseStep::Finished { score, best_passed } => {
                assert_eq!(best_passed, None);
                assert_eq!(score, default_ladder()[0].acuity_score);
            }
            other => panic!("expected Finished, got {:?}", other),
        }
        assert!(s.is_finished());
    }

    #[test]
    fn one_of_three_fails_round() {
        let mut s = Staircase::new(&cfg());
        s.record(TrialOutcome::Correct, AT_TARGET);
        s.record(TrialOutcome::Incorrect, AT_TARGET);
        let step = s.record(TrialOutcome::Incorrect, AT_TARGET);
        assert!(matches!(step, StaircaseStep::Finished { best_passed: None, .. }));
    }

    #[test]
    fn no_response_does_not_count() {
        let mut s = Staircase::new(&cfg());
        s.record(TrialOutcome::Correct, AT_TARGET);
        for _ in 0..5 {
            let step = s.record(TrialOutcome::NoResponse, AT_TARGET);
            assert!(matches!(step, StaircaseStep::Continue { .. }));
            assert_eq!(s.trials_this_level(), 1);
            assert_eq!(s.correct_this_level(), 1);
        }
        // Still able to promote afterwards.
        s.record(TrialOutcome::Correct, AT_TARGET);
        assert_eq!(s.level_index(), 1);
    }

    #[test]
    fn passing_every_level_finishes_with_top_score() {
        let mut s = Staircase::new(&cfg());
        let n = default_ladder().len();
        let mut finished = None;
        for _ in 0..n {
            s.record(TrialOutcome::Correct, AT_TARGET);
            if let StaircaseStep::Finished { score, best_passed } =
                s.record(TrialOutcome::Correct, AT_TARGET)
            {
                finished = Some((score, best_passed));
                break;
            }
        }
        let (score, best) = finished.expect("ladder should terminate");
        assert_eq!(best, Some(n - 1));
        assert_eq!(score, default_ladder()[n - 1].acuity_score);
    }

    #[test]
    fn best_passed_is_monotone() {
        let mut s = Staircase::new(&cfg());
        let mut prev = None;
        for _ in 0..6 {
            s.record(TrialOutcome::Correct, AT_TARGET);
            s.record(TrialOutcome::Correct, AT_TARGET);
            let cur = s.best_passed();
            assert!(cur >= prev);
            prev = cur;
            if s.is_finished() {
                break;
            }
        }
    }
}

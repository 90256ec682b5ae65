use proptest::prelude::*;

/// Property-based test suite for the session-layer invariants.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::DirectionDeck;
    use crate::staircase::{Staircase, StaircaseConfig, TrialOutcome};
    use crate::timer::Deadline;

    // =========================================================================
    // Test 1: Direction deck never repeats across any boundary
    // =========================================================================
    proptest! {
        #[test]
        fn deck_never_repeats(seed in any::<u64>(), draws in 2usize..400usize) {
            let mut deck = DirectionDeck::with_seed(seed);
            let mut prev = deck.draw();
            for _ in 1..draws {
                let next = deck.draw();
                prop_assert_ne!(next, prev);
                prev = next;
            }
        }
    }

    // =========================================================================
    // Test 2: Deck draws stay uniform over whole bags
    // =========================================================================
    proptest! {
        #[test]
        fn deck_is_uniform_per_bag(seed in any::<u64>(), bags in 1usize..50usize) {
            let mut deck = DirectionDeck::with_seed(seed);
            let mut counts = std::collections::HashMap::new();
            for _ in 0..bags * 4 {
                *counts.entry(deck.draw()).or_insert(0usize) += 1;
            }
            // Each bag holds exactly one of each direction.
            for (_, &n) in counts.iter() {
                prop_assert_eq!(n, bags);
            }
        }
    }

    // =========================================================================
    // Test 3: Staircase counters and level index stay in bounds
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn staircase_state_stays_in_bounds(
            outcomes in proptest::collection::vec(0u8..3u8, 1..100),
            distances in proptest::collection::vec(
                proptest::option::of(0.2f32..0.7f32), 100),
        ) {
            let cfg = StaircaseConfig { deck_seed: Some(7), ..StaircaseConfig::default() };
            let n_levels = cfg.levels.len();
            let mut s = Staircase::new(&cfg);

            for (&o, d) in outcomes.iter().zip(distances.iter()) {
                let outcome = match o {
                    0 => TrialOutcome::Correct,
                    1 => TrialOutcome::Incorrect,
                    _ => TrialOutcome::NoResponse,
                };
                s.record(outcome, *d);

                prop_assert!(s.level_index() < n_levels);
                prop_assert!(s.trials_this_level() <= 3);
                prop_assert!(s.correct_this_level() <= s.trials_this_level());
                if let Some(best) = s.best_passed() {
                    prop_assert!(best <= s.level_index());
                }
                // Score is always one of the ladder's values.
                let score = s.score();
                prop_assert!(cfg.levels.iter().any(|l| l.acuity_score == score));

                if s.is_finished() {
                    break;
                }
            }
        }
    }

    // =========================================================================
    // Test 4: A finished staircase stays finished with a stable score
    // =========================================================================
    proptest! {
        #[test]
        fn finished_staircase_is_terminal(seed in any::<u64>()) {
            let cfg = StaircaseConfig { deck_seed: Some(seed), ..StaircaseConfig::default() };
            let mut s = Staircase::new(&cfg);
            s.record(TrialOutcome::Incorrect, Some(0.40));
            s.record(TrialOutcome::Incorrect, Some(0.40));
            prop_assert!(s.is_finished());

            let score = s.score();
            for _ in 0..5 {
                s.record(TrialOutcome::Correct, Some(0.40));
                prop_assert!(s.is_finished());
                prop_assert_eq!(s.score(), score);
            }
        }
    }

    // =========================================================================
    // Test 5: A deadline fires at most once per arm
    // =========================================================================
    proptest! {
        #[test]
        fn deadline_fires_at_most_once(
            at in 0i64..1_000_000i64,
            ticks in proptest::collection::vec(0i64..2_000_000i64, 1..50),
        ) {
            let mut d = Deadline::idle();
            d.arm(at);
            let fired: usize = ticks.iter().filter(|&&t| d.fire_if_due(t)).count();
            prop_assert!(fired <= 1);
            if ticks.iter().any(|&t| t >= at) {
                prop_assert_eq!(fired, 1);
            }
        }
    }
}

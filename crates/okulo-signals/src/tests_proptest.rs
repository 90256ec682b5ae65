use proptest::prelude::*;

/// Property-based test suite for the signal-layer invariants.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceConfig, DistanceZone, StabilityGate};
    use crate::pose::{fold_deg, GestureThresholds, GestureWindow, PoseSample};

    // =========================================================================
    // Test 1: Angle folding stays in range and is idempotent
    // =========================================================================
    proptest! {
        #[test]
        fn fold_deg_lands_in_half_turn(angle in -720.0f32..720.0f32) {
            let folded = fold_deg(angle);
            prop_assert!((-90.0..=90.0).contains(&folded));
            // Folding an already-folded angle changes nothing.
            prop_assert_eq!(fold_deg(folded), folded);
        }
    }

    // =========================================================================
    // Test 2: Hit flags are monotone under any sample sequence
    // =========================================================================
    proptest! {
        #[test]
        fn window_flags_never_clear(
            pitches in proptest::collection::vec(-60.0f32..60.0f32, 1..50),
            dzs in proptest::collection::vec(-0.03f32..0.03f32, 1..50),
        ) {
            let th = GestureThresholds::formal();
            let mut w = GestureWindow::open_until(i64::MAX);
            let mut seen_up = false;
            for (&pitch, &dz) in pitches.iter().zip(dzs.iter()) {
                w.observe(
                    &PoseSample { pitch_deg: pitch, yaw_deg: 0.0, roll_deg: 0.0, delta_z: dz },
                    &th,
                );
                if pitch >= th.up_deg {
                    seen_up = true;
                }
                // Once a threshold was crossed, the flag stays set.
                prop_assert_eq!(w.hit_up, seen_up);
            }
        }
    }

    // =========================================================================
    // Test 3: Samples inside the target band never leave the Ok zone
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn gate_holds_ok_inside_band(
            samples in proptest::collection::vec(0.0f32..1.0f32, 1..200),
        ) {
            let cfg = DistanceConfig::default();
            let mut g = StabilityGate::new(cfg);
            let mut ts = 0i64;
            for frac in samples {
                // Map the unit sample into the open band (near, far).
                let d = cfg.near_m + frac * (cfg.far_m - cfg.near_m) * 0.999 + 0.0001;
                ts += 33_000;
                prop_assert_eq!(g.update(ts, Some(d)).zone, DistanceZone::Ok);
            }
        }
    }

    // =========================================================================
    // Test 4: Gaps never increase the dwell counter
    // =========================================================================
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn gaps_never_credit_dwell(gap_us in 1i64..10_000_000i64) {
            let mut g = StabilityGate::new(DistanceConfig::default());
            g.update(0, Some(0.40));
            g.update(33_000, Some(0.40));
            let before = g.update(66_000, Some(0.40)).dwell_us;

            g.update(66_000 + 1, None);
            let after = g.update(66_000 + gap_us, Some(0.40)).dwell_us;
            prop_assert_eq!(after, before);
        }
    }
}

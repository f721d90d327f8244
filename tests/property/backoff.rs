//! Property tests for the backoff policy.
//!
//! Invariants tested:
//! - The first delay lies in [min, 2 * min)
//! - Every following delay is min(previous * factor, max)
//! - Repeated growth converges to max and stays there

use proptest::prelude::*;
use resocket::BackoffPolicy;
use std::time::Duration;

fn policy(min_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
    BackoffPolicy::new(
        Duration::from_millis(min_ms),
        Duration::from_millis(max_ms),
        factor,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: initial delay is jittered within [min, 2 * min)
    #[test]
    fn initial_delay_within_bounds(
        min_ms in 1u64..=60_000,
        sample in 0.0f64..=1.0,
    ) {
        let policy = policy(min_ms, min_ms * 10, 1.3);
        let min = Duration::from_millis(min_ms);

        let delay = policy.initial_delay_from(sample);
        prop_assert!(delay >= min, "{:?} below {:?}", delay, min);
        prop_assert!(delay < min * 2, "{:?} not below {:?}", delay, min * 2);

        let random = policy.initial_delay();
        prop_assert!(random >= min && random < min * 2);
    }

    /// Property: next delay is the grown previous delay, clamped to max
    #[test]
    fn next_delay_grows_and_clamps(
        previous_ms in 1u64..=100_000,
        max_ms in 1u64..=100_000,
        factor in 1.01f64..10.0,
    ) {
        let policy = policy(1, max_ms, factor);
        let max = Duration::from_millis(max_ms);

        let next = policy.next_delay(Duration::from_millis(previous_ms));
        let expected_ms = previous_ms as f64 * factor;

        prop_assert!(next <= max);
        if expected_ms >= max_ms as f64 {
            prop_assert_eq!(next, max);
        } else {
            let diff = (next.as_secs_f64() * 1000.0 - expected_ms).abs();
            prop_assert!(diff < 0.001, "expected ~{}ms, got {:?}", expected_ms, next);
        }
    }

    /// Property: repeated growth reaches max and never leaves it
    #[test]
    fn growth_converges_to_max(
        min_ms in 1u64..=5_000,
        max_ms in 5_000u64..=120_000,
        factor in 1.05f64..4.0,
    ) {
        let policy = policy(min_ms, max_ms, factor);
        let max = Duration::from_millis(max_ms);

        let mut delay = policy.initial_delay();
        let mut steps = 0;
        while delay < max {
            let next = policy.next_delay(delay);
            prop_assert!(next > delay, "delay stopped growing at {:?}", delay);
            delay = next;
            steps += 1;
            prop_assert!(steps < 1_000, "did not converge");
        }

        for _ in 0..5 {
            delay = policy.next_delay(delay);
            prop_assert_eq!(delay, max);
        }
    }
}

// Property-based tests for the health score and retry backoff

use chrono::{Duration as ChronoDuration, Utc};
use marketplace_recovery::settings::HealthSettings;
use marketplace_recovery::{
    AmbientContext, Classifier, ErrorCategory, HealthTracker, RawFailure, ResolutionMethod,
    RetryPolicy,
};
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Record(usize),
    Resolve(prop::sample::Index),
    Decay(f64),
    Success,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..ErrorCategory::ALL.len()).prop_map(Op::Record),
        2 => any::<prop::sample::Index>().prop_map(Op::Resolve),
        1 => (0.0f64..40.0).prop_map(Op::Decay),
        1 => Just(Op::Success),
    ]
}

// Property: frustration stays in [0, 100] for any sequence of updates
proptest! {
    #[test]
    fn test_frustration_score_stays_in_bounds(
        ops in prop::collection::vec((op_strategy(), 0i64..90), 0..80)
    ) {
        let classifier = Classifier::default();
        let mut tracker = HealthTracker::new(HealthSettings::default());
        let mut ids = Vec::new();
        let mut now = Utc::now();

        for (op, step_secs) in ops {
            now += ChronoDuration::seconds(step_secs);
            let score = match op {
                Op::Record(index) => {
                    let record = classifier.classify(
                        &RawFailure::new("failure").with_category(ErrorCategory::ALL[index]),
                        &AmbientContext::default(),
                    );
                    ids.push(record.id());
                    tracker.record(record, now).current
                }
                Op::Resolve(index) if !ids.is_empty() => {
                    let id = ids[index.index(ids.len())];
                    tracker
                        .resolve(id, ResolutionMethod::ManualClear, now)
                        .map_or(tracker.frustration_score(), |update| update.current)
                }
                Op::Resolve(_) => tracker.frustration_score(),
                Op::Decay(points) => tracker.decay(points, now).current,
                Op::Success => {
                    tracker.record_success();
                    tracker.frustration_score()
                }
            };
            prop_assert!((0.0..=100.0).contains(&score), "score {}", score);
            prop_assert!((0.0..=1.0).contains(&tracker.error_rate()));
        }
    }
}

// Property: jittered delay stays inside the documented band
proptest! {
    #[test]
    fn test_delay_within_jitter_band(
        attempt in 0u32..40,
        sample in 0.0f64..1.0,
        base_ms in 1u64..5_000,
        network in any::<bool>()
    ) {
        let policy = (if network { RetryPolicy::network() } else { RetryPolicy::standard() })
            .with_base_delay(Duration::from_millis(base_ms));
        let (low, high) = policy.delay_bounds(attempt);
        let delay = policy.delay_with_sample(attempt, sample);

        prop_assert!(delay >= low);
        prop_assert!(delay <= high);
        prop_assert!(low <= policy.max_delay);
    }
}

// Property: backoff never shrinks as attempts grow
proptest! {
    #[test]
    fn test_backoff_monotonic(attempt in 0u32..40, base_ms in 1u64..5_000) {
        let policy = RetryPolicy::network().with_base_delay(Duration::from_millis(base_ms));

        prop_assert!(policy.backoff(attempt) <= policy.backoff(attempt + 1));
    }
}

//! Integration tests for prioritized replay.

use proptest::prelude::*;

use wager_sac::core::{BufferConfig, TrainError, TrainRng};
use wager_sac::nn::Observation;
use wager_sac::replay::{PriorityBuffer, Transition};

fn transition(tag: usize) -> Transition {
    Transition {
        state: Observation::new(vec![tag as f32], vec![1, 1]),
        action: 0,
        reward: tag as f64,
        next_state: Observation::zeros(vec![1, 1]),
        done: false,
    }
}

fn tag(t: &Transition) -> usize {
    t.reward as usize
}

// =============================================================================
// Capacity and Wraparound
// =============================================================================

#[test]
fn test_capacity_four_keeps_last_four_pushes() {
    let config = BufferConfig::default().with_capacity(4).with_alpha(1.0);
    let mut buffer = PriorityBuffer::new(&config).unwrap();

    for (i, priority) in [1.0, 1.0, 1.0, 1.0, 5.0, 5.0].into_iter().enumerate() {
        buffer.push_with_priority(priority, transition(i + 1)).unwrap();
    }

    assert_eq!(buffer.len(), 4);
    let tags: Vec<usize> = buffer.iter().map(tag).collect();
    assert_eq!(tags, vec![3, 4, 5, 6]);
    assert!((buffer.total_priority() - 12.0).abs() < 1e-12);
}

#[test]
fn test_high_priority_entries_take_their_share_of_mass() {
    let config = BufferConfig::default().with_capacity(4).with_alpha(1.0);
    let mut buffer = PriorityBuffer::new(&config).unwrap();
    for (i, priority) in [1.0, 1.0, 1.0, 1.0, 5.0, 5.0].into_iter().enumerate() {
        buffer.push_with_priority(priority, transition(i + 1)).unwrap();
    }

    // Twelve unit-width strata over a total mass of 12: ten fall in the
    // mass of the two priority-5 entries.
    let mut rng = TrainRng::new(11);
    let batch = buffer.sample(12, &mut rng).unwrap();
    let heavy = batch.transitions.iter().filter(|t| tag(t) >= 5).count();
    assert_eq!(heavy, 10);

    // Their importance weights are 5^(−β) relative to the light entries.
    let light_weight = batch
        .transitions
        .iter()
        .zip(&batch.weights)
        .find(|(t, _)| tag(t) < 5)
        .map(|(_, &w)| w)
        .unwrap();
    let heavy_weight = batch
        .transitions
        .iter()
        .zip(&batch.weights)
        .find(|(t, _)| tag(t) >= 5)
        .map(|(_, &w)| w)
        .unwrap();
    let beta = buffer.beta();
    assert!((light_weight - 1.0).abs() < 1e-12);
    assert!((heavy_weight - 5f64.powf(-beta)).abs() < 1e-9);
}

#[test]
fn test_single_draws_match_priority_proportions() {
    let config = BufferConfig::default().with_capacity(4).with_alpha(1.0);
    let mut buffer = PriorityBuffer::new(&config).unwrap();
    for (i, priority) in [1.0, 1.0, 1.0, 1.0, 5.0, 5.0].into_iter().enumerate() {
        buffer.push_with_priority(priority, transition(i + 1)).unwrap();
    }

    let mut rng = TrainRng::new(5);
    let draws = 6000;
    let mut heavy = 0;
    for _ in 0..draws {
        let batch = buffer.sample(1, &mut rng).unwrap();
        if tag(batch.transitions[0]) >= 5 {
            heavy += 1;
        }
    }
    let fraction = heavy as f64 / draws as f64;
    assert!((fraction - 10.0 / 12.0).abs() < 0.03, "fraction = {fraction}");
}

// =============================================================================
// Priority Transform
// =============================================================================

#[test]
fn test_alpha_zero_is_uniform() {
    let config = BufferConfig::default().with_capacity(8).with_alpha(0.0);
    let mut buffer = PriorityBuffer::new(&config).unwrap();
    for i in 0..8 {
        buffer.push(i as f64 * 10.0, transition(i)).unwrap();
    }

    for i in 0..8 {
        assert_eq!(buffer.priority(i), Some(1.0));
    }

    // One stratum per entry visits every entry exactly once.
    let mut rng = TrainRng::new(2);
    let batch = buffer.sample(8, &mut rng).unwrap();
    let mut indices = batch.indices.clone();
    indices.sort_unstable();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
    assert!(batch.weights.iter().all(|&w| (w - 1.0).abs() < 1e-12));
}

#[test]
fn test_update_stores_exact_priority() {
    let config = BufferConfig::default().with_capacity(16);
    let mut buffer = PriorityBuffer::new(&config).unwrap();
    for i in 0..10 {
        buffer.push(0.1, transition(i)).unwrap();
    }

    let mut rng = TrainRng::new(9);
    let indices = buffer.sample(4, &mut rng).unwrap().indices;
    for (k, &index) in indices.iter().enumerate() {
        let td_error = -(k as f64) - 0.5;
        buffer.update(index, td_error).unwrap();
        let expected = (td_error.abs() + config.epsilon).powf(config.alpha);
        assert!((buffer.priority(index).unwrap() - expected).abs() < 1e-12);
    }

    let sum: f64 = (0..10).map(|i| buffer.priority(i).unwrap()).sum();
    assert!((buffer.total_priority() - sum).abs() < 1e-9);
}

#[test]
fn test_non_finite_priority_is_rejected_and_skipped() {
    let mut buffer = PriorityBuffer::new(&BufferConfig::default().with_capacity(4)).unwrap();
    buffer.push(1.0, transition(1)).unwrap();

    let err = buffer.push(f64::INFINITY, transition(2)).unwrap_err();
    assert!(matches!(err, TrainError::Numerical { .. }));
    assert_eq!(buffer.len(), 1);
    assert!(buffer.update(0, f64::NAN).is_err());
}

#[test]
fn test_sample_before_warmup_is_precondition_error() {
    let mut buffer = PriorityBuffer::new(&BufferConfig::default().with_capacity(4)).unwrap();
    buffer.push(1.0, transition(1)).unwrap();
    let mut rng = TrainRng::new(0);
    assert!(matches!(
        buffer.sample(2, &mut rng),
        Err(TrainError::Precondition(_))
    ));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_buffer_holds_last_pushes(
        capacity in 1usize..16,
        errors in proptest::collection::vec(0.0f64..10.0, 1..64),
    ) {
        let config = BufferConfig::default().with_capacity(capacity);
        let mut buffer = PriorityBuffer::new(&config).unwrap();
        for (i, &e) in errors.iter().enumerate() {
            buffer.push(e, transition(i)).unwrap();
        }

        let kept = errors.len().min(capacity);
        prop_assert_eq!(buffer.len(), kept);

        let tags: Vec<usize> = buffer.iter().map(tag).collect();
        let expected: Vec<usize> = (errors.len() - kept..errors.len()).collect();
        prop_assert_eq!(tags, expected);

        let expected_total: f64 = errors[errors.len() - kept..]
            .iter()
            .map(|e| (e + config.epsilon).powf(config.alpha))
            .sum();
        prop_assert!((buffer.total_priority() - expected_total).abs() < 1e-9);
    }

    #[test]
    fn prop_weights_normalised(
        errors in proptest::collection::vec(0.0f64..5.0, 8..40),
        batch_size in 1usize..8,
        seed in any::<u64>(),
    ) {
        let config = BufferConfig::default().with_capacity(64);
        let mut buffer = PriorityBuffer::new(&config).unwrap();
        for (i, &e) in errors.iter().enumerate() {
            buffer.push(e, transition(i)).unwrap();
        }

        let mut rng = TrainRng::new(seed);
        let batch = buffer.sample(batch_size, &mut rng).unwrap();
        prop_assert_eq!(batch.len(), batch_size);

        let max = batch.weights.iter().copied().fold(0.0, f64::max);
        prop_assert!((max - 1.0).abs() < 1e-12);
        prop_assert!(batch.weights.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-12));
        prop_assert!(batch.indices.iter().all(|&i| i < errors.len()));
    }
}

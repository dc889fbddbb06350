//! Prioritized experience replay.
//!
//! ## Priorities
//!
//! A transition pushed with TD-error `δ` is stored with priority
//! `(|δ| + ε)^α`. Sampling draws each entry with probability proportional to
//! its stored priority; `α = 0` reduces to uniform replay.
//!
//! ## Importance weights
//!
//! Each sampled entry carries `w = (N·p)^(−β)`, normalised so the largest
//! weight in the batch is 1. `β` grows by `beta_increment` on every sample
//! call until it reaches 1.
//!
//! Indices handed out by [`PriorityBuffer::sample`] are data-slot indices in
//! `0..capacity` and are what [`PriorityBuffer::update`] expects back.

use tracing::warn;

use crate::core::{BufferConfig, TrainError, TrainResult, TrainRng};
use crate::nn::Observation;

use super::sum_tree::SumTree;

/// One environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Observation the action was chosen from.
    pub state: Observation,
    /// Action index.
    pub action: usize,
    /// Reward received.
    pub reward: f64,
    /// Observation after the step (zeros on termination).
    pub next_state: Observation,
    /// Whether the step ended the episode.
    pub done: bool,
}

/// A prioritized sample borrowed from the buffer.
#[derive(Clone, Debug)]
pub struct SampledBatch<'a> {
    /// Sampled transitions, one per stratum.
    pub transitions: Vec<&'a Transition>,
    /// Slot index of each transition, for priority updates.
    pub indices: Vec<usize>,
    /// Normalised importance-sampling weights (max = 1).
    pub weights: Vec<f64>,
}

impl SampledBatch<'_> {
    /// Number of sampled transitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Fixed-capacity ring buffer with SumTree-backed prioritized sampling.
#[derive(Clone, Debug)]
pub struct PriorityBuffer {
    tree: SumTree,
    data: Vec<Transition>,
    cursor: usize,
    alpha: f64,
    beta: f64,
    beta_increment: f64,
    epsilon: f64,
}

impl PriorityBuffer {
    /// Create an empty buffer.
    pub fn new(config: &BufferConfig) -> TrainResult<Self> {
        config.validate()?;
        Ok(Self {
            tree: SumTree::new(config.capacity),
            data: Vec::with_capacity(config.capacity.min(1 << 16)),
            cursor: 0,
            alpha: config.alpha,
            beta: config.beta,
            beta_increment: config.beta_increment,
            epsilon: config.epsilon,
        })
    }

    /// Number of stored transitions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been pushed yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of stored transitions.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tree.capacity()
    }

    /// Sum of all stored priorities.
    #[must_use]
    pub fn total_priority(&self) -> f64 {
        self.tree.total()
    }

    /// Current importance-sampling exponent.
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Stored priority at a slot, if occupied.
    #[must_use]
    pub fn priority(&self, index: usize) -> Option<f64> {
        (index < self.len()).then(|| self.tree.get(index))
    }

    /// Transition at a slot, if occupied.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.data.get(index)
    }

    /// Stored transitions from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> + '_ {
        let (newer, older) = if self.data.len() < self.capacity() {
            (&self.data[..], &self.data[..0])
        } else {
            self.data.split_at(self.cursor)
        };
        older.iter().chain(newer.iter())
    }

    /// `(|td_error| + ε)^α`.
    #[must_use]
    pub fn priority_for(&self, td_error: f64) -> f64 {
        (td_error.abs() + self.epsilon).powf(self.alpha)
    }

    /// Store a transition with priority derived from its TD-error.
    ///
    /// Overwrites the oldest entry once the buffer is full. Returns the slot
    /// written.
    pub fn push(&mut self, td_error: f64, transition: Transition) -> TrainResult<usize> {
        if !td_error.is_finite() {
            warn!(td_error, "skipping transition with non-finite TD-error");
            return Err(TrainError::Numerical {
                quantity: "priority",
                value: td_error,
            });
        }
        let priority = self.priority_for(td_error);
        self.insert(priority, transition)
    }

    /// Store a transition with an explicit priority.
    ///
    /// The priority is raised to the `ε^α` floor so no entry starves.
    pub fn push_with_priority(&mut self, priority: f64, transition: Transition) -> TrainResult<usize> {
        self.insert(priority, transition)
    }

    fn insert(&mut self, priority: f64, transition: Transition) -> TrainResult<usize> {
        if !priority.is_finite() {
            warn!(priority, "skipping transition with non-finite priority");
            return Err(TrainError::Numerical {
                quantity: "priority",
                value: priority,
            });
        }
        let priority = priority.max(self.epsilon.powf(self.alpha));

        let slot = self.cursor;
        if slot < self.data.len() {
            self.data[slot] = transition;
        } else {
            self.data.push(transition);
        }
        self.tree.set(slot, priority);
        self.cursor = (self.cursor + 1) % self.capacity();
        Ok(slot)
    }

    /// Draw a stratified prioritized batch.
    ///
    /// The total mass is split into `batch_size` equal segments with one
    /// uniform draw per segment. Anneals `β` before computing weights.
    pub fn sample(&mut self, batch_size: usize, rng: &mut TrainRng) -> TrainResult<SampledBatch<'_>> {
        if batch_size == 0 {
            return Err(TrainError::precondition("batch size must be at least 1"));
        }
        if self.len() < batch_size {
            return Err(TrainError::precondition(format!(
                "cannot sample {batch_size} transitions from a buffer holding {}",
                self.len()
            )));
        }
        let total = self.tree.total();
        if total <= 0.0 {
            return Err(TrainError::precondition("total priority is zero"));
        }

        self.beta = (self.beta + self.beta_increment).min(1.0);

        let segment = total / batch_size as f64;
        let entries = self.len() as f64;
        let mut indices = Vec::with_capacity(batch_size);
        let mut weights = Vec::with_capacity(batch_size);

        for i in 0..batch_size {
            let low = segment * i as f64;
            let value = rng.uniform(low, low + segment);
            let slot = self.tree.find(value).min(self.len() - 1);
            let probability = self.tree.get(slot) / total;
            indices.push(slot);
            weights.push((entries * probability).powf(-self.beta));
        }

        let max_weight = weights.iter().copied().fold(f64::MIN_POSITIVE, f64::max);
        for w in &mut weights {
            *w /= max_weight;
        }

        Ok(SampledBatch {
            transitions: indices.iter().map(|&i| &self.data[i]).collect(),
            indices,
            weights,
        })
    }

    /// Refresh the priority at a slot from a fresh TD-error.
    pub fn update(&mut self, index: usize, td_error: f64) -> TrainResult<()> {
        if index >= self.len() {
            return Err(TrainError::precondition(format!(
                "priority update for empty slot {index}"
            )));
        }
        if !td_error.is_finite() {
            return Err(TrainError::Numerical {
                quantity: "priority",
                value: td_error,
            });
        }
        let priority = self.priority_for(td_error);
        self.tree.set(index, priority);
        Ok(())
    }
}

//! Approximator interface for the soft actor-critic.
//!
//! The training loop owns the SAC mathematics (targets, losses, entropy
//! tuning, priorities); an [`Approximator`] owns parameters. The two meet at
//! the network outputs: the loop asks for policy and Q-values, then hands back
//! the gradient of its losses with respect to those outputs.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{TrainError, TrainResult, TrainRng};

/// One value per discrete action (probabilities, log-probabilities, Q-values).
pub type ActionValues = SmallVec<[f32; 8]>;

/// The last `window_size` feature rows, flattened row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row-major feature values.
    pub tensor: Vec<f32>,

    /// `[window_size, features_per_row]`.
    pub shape: Vec<usize>,
}

impl Observation {
    /// Wrap a flat tensor. `tensor.len()` must equal the product of `shape`.
    pub fn new(tensor: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(
            tensor.len(),
            shape.iter().product::<usize>(),
            "observation length does not match its shape"
        );
        Self { tensor, shape }
    }

    /// All-zero observation, used as the next state of a terminal step.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::new(vec![0.0; len], shape)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    /// Whether the observation holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensor.is_empty()
    }

    /// Value at a flat position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.tensor.get(index).copied()
    }

    /// Borrow one window row. `None` for out-of-range rows or non-2D shapes.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        match self.shape.as_slice() {
            [rows, cols] if index < *rows => Some(&self.tensor[index * cols..(index + 1) * cols]),
            _ => None,
        }
    }
}

/// Online-network outputs for a batch of observations.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    /// Categorical policy per observation.
    pub probs: Vec<ActionValues>,
    /// Log of `probs`, computed stably from logits.
    pub log_probs: Vec<ActionValues>,
    /// First critic's Q-values.
    pub q1: Vec<ActionValues>,
    /// Second critic's Q-values.
    pub q2: Vec<ActionValues>,
}

/// Target-critic outputs for a batch of observations.
#[derive(Clone, Debug, Default)]
pub struct TargetValues {
    /// First target critic's Q-values.
    pub q1: Vec<ActionValues>,
    /// Second target critic's Q-values.
    pub q2: Vec<ActionValues>,
}

/// Loss gradients with respect to network outputs, one row per observation.
///
/// Rows are already divided by the batch size; the approximator only sums.
#[derive(Clone, Debug, Default)]
pub struct OutputGradients {
    /// dL/d(actor logits).
    pub logits: Vec<ActionValues>,
    /// dL/dQ1.
    pub q1: Vec<ActionValues>,
    /// dL/dQ2.
    pub q2: Vec<ActionValues>,
}

/// Serialized parameters of an approximator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    /// Implementation name, checked on restore.
    pub kind: String,
    /// Opaque parameter payload.
    pub blob: Vec<u8>,
}

/// Actor plus twin critics (with target copies) for discrete SAC.
pub trait Approximator {
    /// Size of the discrete action space.
    fn action_count(&self) -> usize;

    /// Flat length of the observations this approximator accepts.
    fn observation_len(&self) -> usize;

    /// Categorical policy for one observation.
    fn policy(&self, observation: &Observation) -> ActionValues;

    /// Online policy and both online critics for a batch.
    fn evaluate(&self, batch: &[&Observation]) -> Evaluation;

    /// Both target critics for a batch.
    fn evaluate_target(&self, batch: &[&Observation]) -> TargetValues;

    /// Apply one gradient step given loss gradients at the outputs.
    ///
    /// Each parameter gradient is clamped to `[−grad_clip, grad_clip]` before
    /// the step.
    fn apply_gradients(
        &mut self,
        batch: &[&Observation],
        grads: &OutputGradients,
        learning_rate: f32,
        grad_clip: f32,
    );

    /// `target ← tau·online + (1−tau)·target` for both critics.
    fn soft_update(&mut self, tau: f32);

    /// Serialize all parameters.
    fn snapshot(&self) -> TrainResult<ParameterSnapshot>;

    /// Replace all parameters from a snapshot.
    fn restore(&mut self, snapshot: &ParameterSnapshot) -> TrainResult<()>;

    /// Sample an action from the current policy.
    fn act(&self, observation: &Observation, rng: &mut TrainRng) -> TrainResult<usize> {
        let probs = self.policy(observation);
        rng.choose_weighted(&probs).ok_or_else(|| TrainError::Numerical {
            quantity: "policy probability",
            value: probs.iter().map(|&p| f64::from(p)).sum(),
        })
    }

    /// Most probable action; ties go to the lowest index.
    fn act_greedy(&self, observation: &Observation) -> usize {
        let probs = self.policy(observation);
        probs
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(best, best_p), (i, &p)| {
                if p > best_p {
                    (i, p)
                } else {
                    (best, best_p)
                }
            })
            .0
    }
}

/// Uniform policy with zero Q-values that never learns (baseline for testing).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UniformPolicy {
    action_count: usize,
    observation_len: usize,
}

impl UniformPolicy {
    /// Create a new uniform policy.
    pub fn new(action_count: usize, observation_len: usize) -> Self {
        Self {
            action_count,
            observation_len,
        }
    }

    fn uniform(&self) -> ActionValues {
        if self.action_count == 0 {
            return ActionValues::new();
        }
        let prob = 1.0 / self.action_count as f32;
        SmallVec::from_elem(prob, self.action_count)
    }

    fn zeros(&self, rows: usize) -> Vec<ActionValues> {
        vec![SmallVec::from_elem(0.0, self.action_count); rows]
    }
}

impl Approximator for UniformPolicy {
    fn action_count(&self) -> usize {
        self.action_count
    }

    fn observation_len(&self) -> usize {
        self.observation_len
    }

    fn policy(&self, _observation: &Observation) -> ActionValues {
        self.uniform()
    }

    fn evaluate(&self, batch: &[&Observation]) -> Evaluation {
        let probs = self.uniform();
        let log_probs: ActionValues = probs.iter().map(|p| p.ln()).collect();
        Evaluation {
            probs: vec![probs; batch.len()],
            log_probs: vec![log_probs; batch.len()],
            q1: self.zeros(batch.len()),
            q2: self.zeros(batch.len()),
        }
    }

    fn evaluate_target(&self, batch: &[&Observation]) -> TargetValues {
        TargetValues {
            q1: self.zeros(batch.len()),
            q2: self.zeros(batch.len()),
        }
    }

    fn apply_gradients(
        &mut self,
        _batch: &[&Observation],
        _grads: &OutputGradients,
        _lr: f32,
        _clip: f32,
    ) {
    }

    fn soft_update(&mut self, _tau: f32) {}

    fn snapshot(&self) -> TrainResult<ParameterSnapshot> {
        Ok(ParameterSnapshot {
            kind: "uniform".to_string(),
            blob: bincode::serialize(self).map_err(crate::core::CheckpointError::from)?,
        })
    }

    fn restore(&mut self, snapshot: &ParameterSnapshot) -> TrainResult<()> {
        if snapshot.kind != "uniform" {
            return Err(TrainError::precondition(format!(
                "cannot restore a '{}' snapshot into a uniform policy",
                snapshot.kind
            )));
        }
        *self = bincode::deserialize(&snapshot.blob).map_err(crate::core::CheckpointError::from)?;
        Ok(())
    }
}

//! Linear reference approximator.
//!
//! A softmax-linear actor and two linear critics over the flattened
//! observation window, each critic paired with a target copy. Small enough to
//! train on a CPU inside tests, and a working stand-in wherever a recurrent
//! encoder would normally sit.

use serde::{Deserialize, Serialize};

use crate::core::{CheckpointError, TrainError, TrainResult, TrainRng};

use super::traits::{
    ActionValues, Approximator, Evaluation, Observation, OutputGradients, ParameterSnapshot,
    TargetValues,
};

const SNAPSHOT_KIND: &str = "linear-actor-critic";
const SNAPSHOT_SCHEMA: u32 = 1;

/// Dense layer mapping an observation to one output per action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct LinearHead {
    /// Row-major `[outputs, inputs]`.
    weights: Vec<f32>,
    bias: Vec<f32>,
    inputs: usize,
}

impl LinearHead {
    fn new(outputs: usize, inputs: usize, rng: &mut TrainRng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f32).sqrt();
        Self {
            weights: (0..outputs * inputs).map(|_| rng.symmetric_f32(scale)).collect(),
            bias: vec![0.0; outputs],
            inputs,
        }
    }

    fn forward(&self, x: &[f32]) -> ActionValues {
        self.bias
            .iter()
            .enumerate()
            .map(|(row, &b)| {
                let w = &self.weights[row * self.inputs..(row + 1) * self.inputs];
                b + w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f32>()
            })
            .collect()
    }

    /// One clipped gradient-descent step from output gradients.
    fn descend(&mut self, xs: &[&[f32]], grads: &[ActionValues], lr: f32, clip: f32) {
        let mut grad_w = vec![0.0f32; self.weights.len()];
        let mut grad_b = vec![0.0f32; self.bias.len()];

        for (x, g) in xs.iter().zip(grads) {
            for (row, &g_row) in g.iter().enumerate() {
                if g_row == 0.0 {
                    continue;
                }
                grad_b[row] += g_row;
                let dst = &mut grad_w[row * self.inputs..(row + 1) * self.inputs];
                for (d, &xi) in dst.iter_mut().zip(x.iter()) {
                    *d += g_row * xi;
                }
            }
        }

        for (w, g) in self.weights.iter_mut().zip(&grad_w) {
            *w -= lr * g.clamp(-clip, clip);
        }
        for (b, g) in self.bias.iter_mut().zip(&grad_b) {
            *b -= lr * g.clamp(-clip, clip);
        }
    }

    /// Fail unless the head maps `inputs` values to `outputs` values.
    fn check_shape(&self, name: &str, outputs: usize, inputs: usize) -> Result<(), CheckpointError> {
        if self.inputs != inputs || self.bias.len() != outputs || self.weights.len() != outputs * inputs {
            return Err(CheckpointError::Corrupt(format!(
                "{name} head has {} weights, {} biases and {} inputs; expected {}x{}",
                self.weights.len(),
                self.bias.len(),
                self.inputs,
                outputs,
                inputs
            )));
        }
        Ok(())
    }

    fn blend_toward(&mut self, online: &LinearHead, tau: f32) {
        for (t, o) in self.weights.iter_mut().zip(&online.weights) {
            *t = tau * o + (1.0 - tau) * *t;
        }
        for (t, o) in self.bias.iter_mut().zip(&online.bias) {
            *t = tau * o + (1.0 - tau) * *t;
        }
    }
}

/// Numerically stable softmax, returning `(probs, log_probs)`.
pub(crate) fn softmax_with_log(logits: &[f32]) -> (ActionValues, ActionValues) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|&z| (z - max).exp()).sum();
    let log_norm = max + sum.ln();
    let log_probs: ActionValues = logits.iter().map(|&z| z - log_norm).collect();
    let probs = log_probs.iter().map(|lp| lp.exp()).collect();
    (probs, log_probs)
}

#[derive(Serialize, Deserialize)]
struct LinearParams {
    schema: u32,
    observation_len: usize,
    action_count: usize,
    actor: LinearHead,
    critic1: LinearHead,
    critic2: LinearHead,
    target1: LinearHead,
    target2: LinearHead,
}

/// Linear softmax actor with twin linear critics and target critics.
#[derive(Clone, Debug)]
pub struct LinearActorCritic {
    observation_len: usize,
    action_count: usize,
    actor: LinearHead,
    critic1: LinearHead,
    critic2: LinearHead,
    target1: LinearHead,
    target2: LinearHead,
}

impl LinearActorCritic {
    /// Create an approximator with seeded random weights.
    ///
    /// Target critics start as exact copies of the online critics.
    pub fn new(observation_len: usize, action_count: usize, seed: u64) -> Self {
        let mut rng = TrainRng::new(seed).for_context("linear-actor-critic");
        let actor = LinearHead::new(action_count, observation_len, &mut rng);
        let critic1 = LinearHead::new(action_count, observation_len, &mut rng);
        let critic2 = LinearHead::new(action_count, observation_len, &mut rng);
        Self {
            observation_len,
            action_count,
            target1: critic1.clone(),
            target2: critic2.clone(),
            actor,
            critic1,
            critic2,
        }
    }

    /// Actor logits for one observation.
    #[must_use]
    pub fn logits(&self, observation: &Observation) -> ActionValues {
        self.actor.forward(&observation.tensor)
    }
}

impl Approximator for LinearActorCritic {
    fn action_count(&self) -> usize {
        self.action_count
    }

    fn observation_len(&self) -> usize {
        self.observation_len
    }

    fn policy(&self, observation: &Observation) -> ActionValues {
        softmax_with_log(&self.logits(observation)).0
    }

    fn evaluate(&self, batch: &[&Observation]) -> Evaluation {
        let mut eval = Evaluation {
            probs: Vec::with_capacity(batch.len()),
            log_probs: Vec::with_capacity(batch.len()),
            q1: Vec::with_capacity(batch.len()),
            q2: Vec::with_capacity(batch.len()),
        };
        for obs in batch {
            let (probs, log_probs) = softmax_with_log(&self.logits(obs));
            eval.probs.push(probs);
            eval.log_probs.push(log_probs);
            eval.q1.push(self.critic1.forward(&obs.tensor));
            eval.q2.push(self.critic2.forward(&obs.tensor));
        }
        eval
    }

    fn evaluate_target(&self, batch: &[&Observation]) -> TargetValues {
        TargetValues {
            q1: batch.iter().map(|o| self.target1.forward(&o.tensor)).collect(),
            q2: batch.iter().map(|o| self.target2.forward(&o.tensor)).collect(),
        }
    }

    fn apply_gradients(
        &mut self,
        batch: &[&Observation],
        grads: &OutputGradients,
        learning_rate: f32,
        grad_clip: f32,
    ) {
        let xs: Vec<&[f32]> = batch.iter().map(|o| o.tensor.as_slice()).collect();
        self.actor.descend(&xs, &grads.logits, learning_rate, grad_clip);
        self.critic1.descend(&xs, &grads.q1, learning_rate, grad_clip);
        self.critic2.descend(&xs, &grads.q2, learning_rate, grad_clip);
    }

    fn soft_update(&mut self, tau: f32) {
        self.target1.blend_toward(&self.critic1, tau);
        self.target2.blend_toward(&self.critic2, tau);
    }

    fn snapshot(&self) -> TrainResult<ParameterSnapshot> {
        let params = LinearParams {
            schema: SNAPSHOT_SCHEMA,
            observation_len: self.observation_len,
            action_count: self.action_count,
            actor: self.actor.clone(),
            critic1: self.critic1.clone(),
            critic2: self.critic2.clone(),
            target1: self.target1.clone(),
            target2: self.target2.clone(),
        };
        Ok(ParameterSnapshot {
            kind: SNAPSHOT_KIND.to_string(),
            blob: bincode::serialize(&params).map_err(CheckpointError::from)?,
        })
    }

    fn restore(&mut self, snapshot: &ParameterSnapshot) -> TrainResult<()> {
        if snapshot.kind != SNAPSHOT_KIND {
            return Err(TrainError::precondition(format!(
                "cannot restore a '{}' snapshot into a linear actor-critic",
                snapshot.kind
            )));
        }
        let params: LinearParams =
            bincode::deserialize(&snapshot.blob).map_err(CheckpointError::from)?;
        if params.schema != SNAPSHOT_SCHEMA {
            return Err(CheckpointError::SchemaMismatch {
                expected: SNAPSHOT_SCHEMA,
                found: params.schema,
            }
            .into());
        }
        if params.observation_len != self.observation_len || params.action_count != self.action_count {
            return Err(TrainError::precondition(format!(
                "snapshot shape {}x{} does not match approximator {}x{}",
                params.observation_len, params.action_count, self.observation_len, self.action_count
            )));
        }
        // Validate every head before replacing any, so a bad payload leaves
        // the current parameters intact.
        let (outputs, inputs) = (self.action_count, self.observation_len);
        for (name, head) in [
            ("actor", &params.actor),
            ("critic1", &params.critic1),
            ("critic2", &params.critic2),
            ("target1", &params.target1),
            ("target2", &params.target2),
        ] {
            head.check_shape(name, outputs, inputs)?;
        }
        self.actor = params.actor;
        self.critic1 = params.critic1;
        self.critic2 = params.critic2;
        self.target1 = params.target1;
        self.target2 = params.target2;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn obs(values: &[f32]) -> Observation {
        Observation::new(values.to_vec(), vec![1, values.len()])
    }

    fn one_hot(len: usize, index: usize, value: f32) -> ActionValues {
        let mut row: ActionValues = SmallVec::from_elem(0.0, len);
        row[index] = value;
        row
    }

    #[test]
    fn test_softmax_with_log() {
        let (probs, log_probs) = softmax_with_log(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
        for (p, lp) in probs.iter().zip(&log_probs) {
            assert!((p.ln() - lp).abs() < 1e-5);
        }
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let (probs, log_probs) = softmax_with_log(&[1000.0, 0.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(log_probs.iter().all(|p| p.is_finite()));
        assert!((probs[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_targets_start_equal_to_online() {
        let net = LinearActorCritic::new(4, 3, 9);
        let o = obs(&[0.1, -0.2, 0.3, 0.4]);
        let online = net.evaluate(&[&o]);
        let target = net.evaluate_target(&[&o]);
        assert_eq!(online.q1, target.q1);
        assert_eq!(online.q2, target.q2);
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = LinearActorCritic::new(4, 3, 9);
        let b = LinearActorCritic::new(4, 3, 9);
        let o = obs(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.policy(&o), b.policy(&o));
    }

    #[test]
    fn test_critic_gradient_moves_q_toward_target() {
        let mut net = LinearActorCritic::new(2, 2, 1);
        let o = obs(&[1.0, 0.5]);
        let target = 3.0f32;

        for _ in 0..200 {
            let q = net.evaluate(&[&o]).q1[0][1];
            let grads = OutputGradients {
                logits: vec![SmallVec::from_elem(0.0, 2)],
                q1: vec![one_hot(2, 1, q - target)],
                q2: vec![SmallVec::from_elem(0.0, 2)],
            };
            net.apply_gradients(&[&o], &grads, 0.1, 100.0);
        }

        let q = net.evaluate(&[&o]).q1[0][1];
        assert!((q - target).abs() < 1e-2, "q = {q}");
    }

    #[test]
    fn test_soft_update_interpolates() {
        let mut net = LinearActorCritic::new(2, 2, 1);
        let o = obs(&[1.0, 1.0]);
        let grads = OutputGradients {
            logits: vec![SmallVec::from_elem(0.0, 2)],
            q1: vec![one_hot(2, 0, -1.0)],
            q2: vec![SmallVec::from_elem(0.0, 2)],
        };
        net.apply_gradients(&[&o], &grads, 1.0, 100.0);

        let online = net.evaluate(&[&o]).q1[0][0];
        let before = net.evaluate_target(&[&o]).q1[0][0];
        net.soft_update(0.5);
        let after = net.evaluate_target(&[&o]).q1[0][0];

        assert!((after - (0.5 * online + 0.5 * before)).abs() < 1e-5);

        net.soft_update(1.0);
        assert!((net.evaluate_target(&[&o]).q1[0][0] - online).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_clip() {
        let mut net = LinearActorCritic::new(1, 1, 3);
        let o = obs(&[1.0]);
        let before = net.evaluate(&[&o]).q1[0][0];
        let grads = OutputGradients {
            logits: vec![SmallVec::from_elem(0.0, 1)],
            q1: vec![one_hot(1, 0, -1000.0)],
            q2: vec![SmallVec::from_elem(0.0, 1)],
        };
        net.apply_gradients(&[&o], &grads, 1.0, 0.5);
        let after = net.evaluate(&[&o]).q1[0][0];
        // Weight and bias each move by at most 0.5.
        assert!((after - before - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let net = LinearActorCritic::new(3, 5, 11);
        let snapshot = net.snapshot().unwrap();

        let mut other = LinearActorCritic::new(3, 5, 99);
        other.restore(&snapshot).unwrap();

        let o = obs(&[0.3, 0.2, 0.1]);
        assert_eq!(net.policy(&o), other.policy(&o));
        assert_eq!(net.evaluate_target(&[&o]).q2, other.evaluate_target(&[&o]).q2);
    }

    #[test]
    fn test_restore_rejects_shape_mismatch() {
        let snapshot = LinearActorCritic::new(3, 5, 11).snapshot().unwrap();
        let mut other = LinearActorCritic::new(4, 5, 11);
        assert!(matches!(other.restore(&snapshot), Err(TrainError::Precondition(_))));
    }

    #[test]
    fn test_restore_rejects_misshapen_head() {
        let net = LinearActorCritic::new(3, 5, 11);
        let snapshot = net.snapshot().unwrap();
        let mut params: LinearParams = bincode::deserialize(&snapshot.blob).unwrap();
        params.actor.weights.truncate(2);
        let corrupt = ParameterSnapshot {
            kind: SNAPSHOT_KIND.to_string(),
            blob: bincode::serialize(&params).unwrap(),
        };

        let mut other = LinearActorCritic::new(3, 5, 99);
        let o = obs(&[0.3, 0.2, 0.1]);
        let before = other.policy(&o);
        assert!(matches!(
            other.restore(&corrupt),
            Err(TrainError::Checkpoint(CheckpointError::Corrupt(_)))
        ));
        // Rejected payload leaves the approximator usable and unchanged.
        assert_eq!(other.policy(&o), before);
    }

    #[test]
    fn test_restore_rejects_misshapen_target_bias() {
        let net = LinearActorCritic::new(3, 5, 11);
        let mut params: LinearParams = bincode::deserialize(&net.snapshot().unwrap().blob).unwrap();
        params.target2.bias.push(0.0);
        let corrupt = ParameterSnapshot {
            kind: SNAPSHOT_KIND.to_string(),
            blob: bincode::serialize(&params).unwrap(),
        };
        let mut other = LinearActorCritic::new(3, 5, 99);
        assert!(other.restore(&corrupt).is_err());
    }

    #[test]
    fn test_restore_rejects_foreign_kind() {
        let snapshot = ParameterSnapshot {
            kind: "uniform".to_string(),
            blob: vec![],
        };
        let mut net = LinearActorCritic::new(3, 5, 11);
        assert!(net.restore(&snapshot).is_err());
    }
}

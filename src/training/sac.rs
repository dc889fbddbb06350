//! Discrete soft actor-critic updates.
//!
//! ## Targets
//!
//! `y = r + (1 − done)·γ·Σ_a' π(a'|s')·[min(Q1ᵗ, Q2ᵗ)(s', a') − α·log π(a'|s')]`
//!
//! ## Losses
//!
//! - Critic: `½·(mean w·(Q1 − y)² + mean w·(Q2 − y)²)` over the batch, with
//!   `w` the importance-sampling weights.
//! - Actor: `mean Σ_a π(a|s)·(α·log π(a|s) − Â(s, a))`, where `Â` is
//!   `min(Q1, Q2)` standardised over the whole batch×action matrix and
//!   treated as a constant.
//! - Entropy coefficient: gradient step on `−log α·(Σ π log π + H̄)` with
//!   `H̄ = target_entropy_ratio·ln(actions)`.
//!
//! Gradients are taken analytically at the network outputs and handed to the
//! [`Approximator`], which owns the parameters.

use smallvec::SmallVec;
use tracing::debug;

use crate::core::{SacConfig, TrainError, TrainResult};
use crate::nn::{ActionValues, Approximator, Observation, OutputGradients};
use crate::replay::{SampledBatch, Transition};

/// Added to the batch std when standardising advantages.
const ADVANTAGE_EPSILON: f64 = 1e-8;

/// Losses and fresh TD-errors from one optimisation pass.
#[derive(Clone, Debug, Default)]
pub struct OptimizationReport {
    /// Importance-weighted critic loss.
    pub critic_loss: f64,
    /// Actor loss.
    pub actor_loss: f64,
    /// Entropy-coefficient loss (0 when not auto-tuning).
    pub alpha_loss: f64,
    /// Entropy coefficient used for this pass's losses.
    pub alpha: f64,
    /// Mean policy entropy over the batch.
    pub entropy: f64,
    /// `½(|Q1 − y| + |Q2 − y|)` per sampled transition, in batch order.
    pub td_errors: Vec<f64>,
}

/// SAC loss computation and entropy-coefficient state.
#[derive(Clone, Debug)]
pub struct SacLearner {
    config: SacConfig,
    log_alpha: f64,
    target_entropy: f64,
    action_count: usize,
}

impl SacLearner {
    /// Create a learner for an action space of `action_count` actions.
    pub fn new(config: &SacConfig, action_count: usize) -> TrainResult<Self> {
        config.validate()?;
        if action_count == 0 {
            return Err(TrainError::precondition("action space is empty"));
        }
        Ok(Self {
            config: config.clone(),
            log_alpha: config.alpha.ln(),
            target_entropy: config.target_entropy_ratio * (action_count as f64).ln(),
            action_count,
        })
    }

    /// Current entropy coefficient.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.log_alpha.exp()
    }

    /// Entropy the coefficient is tuned toward.
    #[must_use]
    pub fn target_entropy(&self) -> f64 {
        self.target_entropy
    }

    /// Optimisation parameters in use.
    #[must_use]
    pub fn config(&self) -> &SacConfig {
        &self.config
    }

    /// Soft state values `Σ π·(min(Q1ᵗ, Q2ᵗ) − α·log π)` of next states.
    fn next_state_values<A: Approximator + ?Sized>(&self, approx: &A, next_states: &[&Observation]) -> Vec<f64> {
        let alpha = self.alpha();
        let policy = approx.evaluate(next_states);
        let target = approx.evaluate_target(next_states);
        (0..next_states.len())
            .map(|i| {
                policy.probs[i]
                    .iter()
                    .zip(&policy.log_probs[i])
                    .zip(target.q1[i].iter().zip(&target.q2[i]))
                    .map(|((&p, &lp), (&q1, &q2))| {
                        f64::from(p) * (f64::from(q1.min(q2)) - alpha * f64::from(lp))
                    })
                    .sum()
            })
            .collect()
    }

    /// TD targets for a set of transitions.
    pub fn td_targets<A: Approximator + ?Sized>(&self, approx: &A, transitions: &[&Transition]) -> Vec<f64> {
        let next: Vec<&Observation> = transitions.iter().map(|t| &t.next_state).collect();
        let values = self.next_state_values(approx, &next);
        transitions
            .iter()
            .zip(values)
            .map(|(t, v)| {
                let continuation = if t.done { 0.0 } else { 1.0 };
                t.reward + continuation * self.config.gamma * v
            })
            .collect()
    }

    /// `½(|Q1(s,a) − y| + |Q2(s,a) − y|)` for a fresh transition.
    pub fn initial_td_error<A: Approximator + ?Sized>(&self, approx: &A, transition: &Transition) -> TrainResult<f64> {
        self.check_action(transition.action)?;
        let y = self.td_targets(approx, &[transition])[0];
        let eval = approx.evaluate(&[&transition.state]);
        let q1 = f64::from(eval.q1[0][transition.action]);
        let q2 = f64::from(eval.q2[0][transition.action]);
        TrainError::check_finite("TD-error", 0.5 * ((q1 - y).abs() + (q2 - y).abs()))
    }

    fn check_action(&self, action: usize) -> TrainResult<()> {
        if action >= self.action_count {
            return Err(TrainError::precondition(format!(
                "action {action} out of range for {} actions",
                self.action_count
            )));
        }
        Ok(())
    }

    /// One optimisation pass: critic, actor and entropy updates, then a soft
    /// target update.
    ///
    /// # Errors
    ///
    /// `Numerical` if either loss is non-finite; no parameters change then.
    pub fn optimize<A: Approximator + ?Sized>(
        &mut self,
        approx: &mut A,
        batch: &SampledBatch<'_>,
    ) -> TrainResult<OptimizationReport> {
        let n = batch.len();
        if n == 0 {
            return Err(TrainError::precondition("cannot optimise on an empty batch"));
        }
        for t in &batch.transitions {
            self.check_action(t.action)?;
        }

        let alpha = self.alpha();
        let inv_n = 1.0 / n as f64;
        let states: Vec<&Observation> = batch.transitions.iter().map(|t| &t.state).collect();
        let targets = self.td_targets(&*approx, &batch.transitions);
        let eval = approx.evaluate(&states);

        // Critics.
        let mut grads = OutputGradients {
            logits: Vec::with_capacity(n),
            q1: Vec::with_capacity(n),
            q2: Vec::with_capacity(n),
        };
        let mut critic1 = 0.0;
        let mut critic2 = 0.0;
        let mut td_errors = Vec::with_capacity(n);
        for (i, t) in batch.transitions.iter().enumerate() {
            let w = batch.weights[i];
            let y = targets[i];
            let e1 = f64::from(eval.q1[i][t.action]) - y;
            let e2 = f64::from(eval.q2[i][t.action]) - y;
            critic1 += w * e1 * e1;
            critic2 += w * e2 * e2;
            td_errors.push(0.5 * (e1.abs() + e2.abs()));

            grads.q1.push(one_hot(self.action_count, t.action, (w * e1 * inv_n) as f32));
            grads.q2.push(one_hot(self.action_count, t.action, (w * e2 * inv_n) as f32));
        }
        let critic_loss = TrainError::check_finite("critic loss", 0.5 * (critic1 + critic2) * inv_n)?;

        // Actor.
        let advantages = standardized_min_q(&eval.q1, &eval.q2);
        let mut actor_loss = 0.0;
        let mut entropy = 0.0;
        for i in 0..n {
            let (loss, logit_grad) = actor_terms(&eval.probs[i], &eval.log_probs[i], &advantages[i], alpha);
            actor_loss += loss;
            entropy -= eval.probs[i]
                .iter()
                .zip(&eval.log_probs[i])
                .map(|(&p, &lp)| f64::from(p) * f64::from(lp))
                .sum::<f64>();
            grads
                .logits
                .push(logit_grad.iter().map(|g| (g * inv_n) as f32).collect());
        }
        let actor_loss = TrainError::check_finite("actor loss", actor_loss * inv_n)?;
        let entropy = entropy * inv_n;

        approx.apply_gradients(
            &states,
            &grads,
            self.config.learning_rate as f32,
            self.config.grad_clip as f32,
        );
        approx.soft_update(self.config.tau as f32);

        // Entropy coefficient.
        let mut alpha_loss = 0.0;
        if self.config.autotune_alpha {
            alpha_loss = -self.log_alpha * (self.target_entropy - entropy);
            let grad = entropy - self.target_entropy;
            self.log_alpha -= self.config.alpha_learning_rate * grad;
            TrainError::check_finite("entropy coefficient", self.log_alpha)?;
        }

        debug!(critic_loss, actor_loss, alpha, entropy, "optimisation pass");

        Ok(OptimizationReport {
            critic_loss,
            actor_loss,
            alpha_loss,
            alpha,
            entropy,
            td_errors,
        })
    }
}

fn one_hot(len: usize, index: usize, value: f32) -> ActionValues {
    let mut row: ActionValues = SmallVec::from_elem(0.0, len);
    row[index] = value;
    row
}

/// `min(Q1, Q2)` standardised over every batch×action entry.
pub(crate) fn standardized_min_q(q1: &[ActionValues], q2: &[ActionValues]) -> Vec<Vec<f64>> {
    let min_q: Vec<Vec<f64>> = q1
        .iter()
        .zip(q2)
        .map(|(a, b)| a.iter().zip(b).map(|(&x, &y)| f64::from(x.min(y))).collect())
        .collect();
    let count = min_q.iter().map(Vec::len).sum::<usize>().max(1) as f64;
    let mean = min_q.iter().flatten().sum::<f64>() / count;
    let var = min_q.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let scale = var.sqrt() + ADVANTAGE_EPSILON;
    min_q
        .into_iter()
        .map(|row| row.into_iter().map(|v| (v - mean) / scale).collect())
        .collect()
}

/// Per-sample actor loss `Σ π·(α log π − Â)` and its gradient w.r.t. logits.
///
/// With `f_k = α log π_k − Â_k` the gradient is `π_k·(f_k − loss)`.
pub(crate) fn actor_terms(probs: &[f32], log_probs: &[f32], advantages: &[f64], alpha: f64) -> (f64, Vec<f64>) {
    let f: Vec<f64> = log_probs
        .iter()
        .zip(advantages)
        .map(|(&lp, &adv)| alpha * f64::from(lp) - adv)
        .collect();
    let loss: f64 = probs.iter().zip(&f).map(|(&p, fk)| f64::from(p) * fk).sum();
    let grad = probs.iter().zip(&f).map(|(&p, fk)| f64::from(p) * (fk - loss)).collect();
    (loss, grad)
}

//! Hyperparameter-search collaboration.
//!
//! A search driver hands the trainer a [`TrialReporter`]. After every
//! validation episode the trainer reports `(step, score)` and honours a
//! [`PruneDecision::Prune`] by ending the run with
//! [`RunOutcome::Pruned`](super::RunOutcome::Pruned). Per-trial
//! hyperparameters reach the run through
//! [`TrainingConfig::apply_overrides`](crate::core::TrainingConfig::apply_overrides).

use super::trainer::RunOutcome;

/// Whether a trial should keep running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PruneDecision {
    /// Keep training.
    Continue,
    /// Stop now; the trial is not worth finishing.
    Prune,
}

/// Receiver of intermediate and final trial results.
pub trait TrialReporter {
    /// Record a validation score and decide whether to prune.
    fn report(&mut self, step: u64, score: f64) -> PruneDecision;

    /// Called once with the final outcome of the run.
    fn finish(&mut self, _outcome: &RunOutcome) {}
}

/// Prunes once a reported score falls below a floor after a warm-up step.
#[derive(Clone, Debug)]
pub struct ScoreFloorPruner {
    floor: f64,
    warmup_steps: u64,
    history: Vec<(u64, f64)>,
}

impl ScoreFloorPruner {
    /// Prune reports at or after `warmup_steps` scoring below `floor`.
    pub fn new(floor: f64, warmup_steps: u64) -> Self {
        Self {
            floor,
            warmup_steps,
            history: Vec::new(),
        }
    }

    /// Every `(step, score)` reported so far.
    #[must_use]
    pub fn history(&self) -> &[(u64, f64)] {
        &self.history
    }
}

impl TrialReporter for ScoreFloorPruner {
    fn report(&mut self, step: u64, score: f64) -> PruneDecision {
        self.history.push((step, score));
        if step >= self.warmup_steps && score < self.floor {
            PruneDecision::Prune
        } else {
            PruneDecision::Continue
        }
    }
}

//! Training run statistics for diagnostics and tuning.

use serde::{Deserialize, Serialize};

/// Counters and last-seen values collected during a training run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Environment steps taken.
    pub steps: u64,

    /// Episodes completed (terminated or truncated).
    pub episodes: u64,

    /// Optimisation passes performed.
    pub updates: u64,

    /// Validation episodes run.
    pub evaluations: u32,

    /// Checkpoints successfully written.
    pub checkpoints_written: u32,

    /// Checkpoint writes that failed.
    pub checkpoints_failed: u32,

    /// Critic loss of the most recent pass.
    pub last_critic_loss: f64,

    /// Actor loss of the most recent pass.
    pub last_actor_loss: f64,

    /// Entropy coefficient after the most recent pass.
    pub alpha: f64,

    /// Most recent validation score.
    pub last_score: Option<f64>,

    /// Best validation score so far.
    pub best_score: Option<f64>,

    /// Wall-clock time spent in the loop (microseconds).
    pub time_us: u64,
}

impl TrainingStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all statistics to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Environment steps per second.
    #[must_use]
    pub fn steps_per_second(&self) -> f64 {
        if self.time_us == 0 {
            0.0
        } else {
            self.steps as f64 / (self.time_us as f64 / 1_000_000.0)
        }
    }

    /// Optimisation passes per environment step.
    #[must_use]
    pub fn updates_per_step(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.updates as f64 / self.steps as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = TrainingStats::new();
        assert_eq!(stats.steps, 0);
        assert_eq!(stats.best_score, None);
    }

    #[test]
    fn test_steps_per_second() {
        let mut stats = TrainingStats::new();
        stats.steps = 500;
        stats.time_us = 250_000;
        assert_eq!(stats.steps_per_second(), 2000.0);
        assert_eq!(TrainingStats::new().steps_per_second(), 0.0);
    }

    #[test]
    fn test_updates_per_step() {
        let mut stats = TrainingStats::new();
        stats.steps = 10;
        stats.updates = 4;
        assert_eq!(stats.updates_per_step(), 0.4);

        stats.reset();
        assert_eq!(stats.updates_per_step(), 0.0);
    }

    #[test]
    fn test_stats_serialization() {
        let mut stats = TrainingStats::new();
        stats.checkpoints_failed = 2;
        stats.best_score = Some(0.5);

        let json = serde_json::to_string(&stats).unwrap();
        let deserialized: TrainingStats = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.checkpoints_failed, 2);
        assert_eq!(deserialized.best_score, Some(0.5));
    }
}

//! Run configuration.
//!
//! A run is configured by a single [`TrainingConfig`] value passed to every
//! component at construction:
//! - `EnvConfig`: accounting rules and observation window
//! - `BufferConfig`: prioritized replay parameters
//! - `SacConfig`: optimisation and entropy parameters
//!
//! Configs load from TOML (every field optional, falling back to defaults)
//! and accept per-trial overrides from a hyperparameter search.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{TrainError, TrainResult};
use crate::env::RewardStrategy;

/// Accounting and observation parameters for the wagering environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Number of past rows in each observation.
    pub window_size: usize,

    /// Balance at the start of every episode.
    pub initial_balance: f64,

    /// Stake levels as fractions of the current balance.
    /// Each level yields one low-side and one high-side action.
    pub bet_percentages: Vec<f64>,

    /// Profit per unit staked on a win.
    pub payout_ratio: f64,

    /// Smallest stake; every stake is a multiple of this unit.
    pub min_unit: f64,

    /// Fraction of the stake charged on every placed bet.
    pub transaction_cost: f64,

    /// Length of the rolling window of per-stake returns used by the
    /// risk-adjusted reward.
    pub returns_window: usize,

    /// Reward function, fixed for the lifetime of an environment.
    pub reward: RewardStrategy,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            initial_balance: 2_000_000.0,
            bet_percentages: vec![0.01, 0.025],
            payout_ratio: 0.95,
            min_unit: 1000.0,
            transaction_cost: 0.0,
            returns_window: 20,
            reward: RewardStrategy::default(),
        }
    }
}

impl EnvConfig {
    /// Set the observation window.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the starting balance.
    pub fn with_initial_balance(mut self, balance: f64) -> Self {
        self.initial_balance = balance;
        self
    }

    /// Set the stake levels.
    pub fn with_bet_percentages(mut self, percentages: Vec<f64>) -> Self {
        self.bet_percentages = percentages;
        self
    }

    /// Set the payout ratio.
    pub fn with_payout_ratio(mut self, ratio: f64) -> Self {
        self.payout_ratio = ratio;
        self
    }

    /// Set the minimum stake unit.
    pub fn with_min_unit(mut self, unit: f64) -> Self {
        self.min_unit = unit;
        self
    }

    /// Set the per-bet transaction cost.
    pub fn with_transaction_cost(mut self, cost: f64) -> Self {
        self.transaction_cost = cost;
        self
    }

    /// Set the rolling returns window.
    pub fn with_returns_window(mut self, window: usize) -> Self {
        self.returns_window = window;
        self
    }

    /// Set the reward strategy.
    pub fn with_reward(mut self, reward: RewardStrategy) -> Self {
        self.reward = reward;
        self
    }

    /// Number of discrete actions: abstain plus one per side and stake level.
    #[must_use]
    pub fn action_count(&self) -> usize {
        1 + 2 * self.bet_percentages.len()
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> TrainResult<()> {
        if self.window_size == 0 {
            return Err(TrainError::config("window_size must be at least 1"));
        }
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(TrainError::config("initial_balance must be positive"));
        }
        if self.bet_percentages.is_empty() {
            return Err(TrainError::config("bet_percentages must not be empty"));
        }
        if let Some(p) = self
            .bet_percentages
            .iter()
            .find(|p| !(p.is_finite() && **p > 0.0 && **p <= 1.0))
        {
            return Err(TrainError::config(format!(
                "bet percentage {p} must lie in (0, 1]"
            )));
        }
        if !(self.payout_ratio.is_finite() && self.payout_ratio > 0.0) {
            return Err(TrainError::config("payout_ratio must be positive"));
        }
        if !(self.min_unit.is_finite() && self.min_unit > 0.0) {
            return Err(TrainError::config("min_unit must be positive"));
        }
        if !(0.0..1.0).contains(&self.transaction_cost) {
            return Err(TrainError::config("transaction_cost must lie in [0, 1)"));
        }
        if self.returns_window < 2 {
            return Err(TrainError::config("returns_window must be at least 2"));
        }
        self.reward.validate()
    }
}

/// Prioritized replay parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum number of stored transitions.
    pub capacity: usize,

    /// Prioritisation exponent (0 = uniform, 1 = fully greedy).
    pub alpha: f64,

    /// Initial importance-sampling exponent; anneals toward 1.
    pub beta: f64,

    /// Added to beta on every sample call.
    pub beta_increment: f64,

    /// Floor added to every |TD-error| so no entry starves.
    pub epsilon: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            alpha: 0.6,
            beta: 0.4,
            beta_increment: 0.001,
            epsilon: 0.01,
        }
    }
}

impl BufferConfig {
    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the prioritisation exponent.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the initial importance-sampling exponent.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Set the per-sample beta increment.
    pub fn with_beta_increment(mut self, increment: f64) -> Self {
        self.beta_increment = increment;
        self
    }

    /// Set the priority floor.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> TrainResult<()> {
        if self.capacity == 0 {
            return Err(TrainError::config("buffer capacity must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(TrainError::config("buffer alpha must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(TrainError::config("buffer beta must lie in [0, 1]"));
        }
        if !(self.beta_increment.is_finite() && self.beta_increment >= 0.0) {
            return Err(TrainError::config("beta_increment must be non-negative"));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(TrainError::config("buffer epsilon must be positive"));
        }
        Ok(())
    }
}

/// Soft actor-critic optimisation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacConfig {
    /// Discount factor.
    pub gamma: f64,

    /// Soft target update rate.
    pub tau: f64,

    /// Step size for actor and critic updates.
    pub learning_rate: f64,

    /// Initial (or fixed) entropy coefficient.
    pub alpha: f64,

    /// Tune the entropy coefficient toward `target_entropy_ratio * ln(actions)`.
    pub autotune_alpha: bool,

    /// Fraction of the maximum categorical entropy used as the target.
    pub target_entropy_ratio: f64,

    /// Step size for the entropy coefficient.
    pub alpha_learning_rate: f64,

    /// Element-wise gradient clip applied by the approximator.
    pub grad_clip: f64,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.005,
            learning_rate: 3e-4,
            alpha: 0.2,
            autotune_alpha: true,
            target_entropy_ratio: 0.98,
            alpha_learning_rate: 3e-4,
            grad_clip: 100.0,
        }
    }
}

impl SacConfig {
    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the soft update rate.
    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the entropy coefficient and disable or enable auto-tuning.
    pub fn with_alpha(mut self, alpha: f64, autotune: bool) -> Self {
        self.alpha = alpha;
        self.autotune_alpha = autotune;
        self
    }

    /// Set the element-wise gradient clip.
    pub fn with_grad_clip(mut self, clip: f64) -> Self {
        self.grad_clip = clip;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> TrainResult<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(TrainError::config("gamma must lie in [0, 1]"));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(TrainError::config("tau must lie in (0, 1]"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config("learning_rate must be positive"));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(TrainError::config("alpha must be positive"));
        }
        if !(0.0..=1.0).contains(&self.target_entropy_ratio) {
            return Err(TrainError::config("target_entropy_ratio must lie in [0, 1]"));
        }
        if !(self.alpha_learning_rate.is_finite() && self.alpha_learning_rate > 0.0) {
            return Err(TrainError::config("alpha_learning_rate must be positive"));
        }
        if !(self.grad_clip.is_finite() && self.grad_clip > 0.0) {
            return Err(TrainError::config("grad_clip must be positive"));
        }
        Ok(())
    }
}

/// Complete configuration for one training run.
///
/// # Examples
///
/// ```
/// use wager_sac::core::TrainingConfig;
///
/// let config = TrainingConfig::from_toml_str(r#"
///     total_timesteps = 5000
///     [sac]
///     gamma = 0.95
/// "#).unwrap();
///
/// assert_eq!(config.total_timesteps, 5000);
/// assert_eq!(config.sac.gamma, 0.95);
/// assert_eq!(config.batch_size, 256);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed for every random stream in the run.
    pub seed: u64,

    /// Identifier embedded in checkpoint ids. Must differ between concurrent runs.
    pub run_id: String,

    /// Environment steps to run.
    pub total_timesteps: u64,

    /// Steps of uniformly random actions before learning begins.
    pub learning_starts: u64,

    /// Transitions per optimisation pass.
    pub batch_size: usize,

    /// Steps between validation episodes.
    pub eval_freq: u64,

    /// Evaluations without improvement before stopping.
    pub early_stopping_patience: u32,

    /// Margin a validation score must exceed the best by to count as improvement.
    pub improvement_threshold: f64,

    /// Optimisation parameters.
    pub sac: SacConfig,

    /// Replay parameters.
    pub buffer: BufferConfig,

    /// Environment parameters.
    pub env: EnvConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            run_id: "run".to_string(),
            total_timesteps: 100_000,
            learning_starts: 5000,
            batch_size: 256,
            eval_freq: 10_000,
            early_stopping_patience: 5,
            improvement_threshold: 0.0,
            sac: SacConfig::default(),
            buffer: BufferConfig::default(),
            env: EnvConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TrainResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            TrainError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(toml_str: &str) -> TrainResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|err| TrainError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Set the total number of environment steps.
    pub fn with_total_timesteps(mut self, steps: u64) -> Self {
        self.total_timesteps = steps;
        self
    }

    /// Set the random warm-up length.
    pub fn with_learning_starts(mut self, steps: u64) -> Self {
        self.learning_starts = steps;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the evaluation frequency.
    pub fn with_eval_freq(mut self, freq: u64) -> Self {
        self.eval_freq = freq;
        self
    }

    /// Set the early stopping patience.
    pub fn with_patience(mut self, patience: u32) -> Self {
        self.early_stopping_patience = patience;
        self
    }

    /// Set the improvement threshold.
    pub fn with_improvement_threshold(mut self, threshold: f64) -> Self {
        self.improvement_threshold = threshold;
        self
    }

    /// Replace the SAC parameters.
    pub fn with_sac(mut self, sac: SacConfig) -> Self {
        self.sac = sac;
        self
    }

    /// Replace the buffer parameters.
    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    /// Replace the environment parameters.
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> TrainResult<()> {
        if self.run_id.is_empty()
            || !self
                .run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(TrainError::config(
                "run_id must be non-empty and use only [A-Za-z0-9.-]",
            ));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if self.batch_size > self.buffer.capacity {
            return Err(TrainError::config(format!(
                "batch_size {} exceeds buffer capacity {}",
                self.batch_size, self.buffer.capacity
            )));
        }
        if self.eval_freq == 0 {
            return Err(TrainError::config("eval_freq must be at least 1"));
        }
        if !(self.improvement_threshold.is_finite() && self.improvement_threshold >= 0.0) {
            return Err(TrainError::config("improvement_threshold must be non-negative"));
        }
        self.sac.validate()?;
        self.buffer.validate()?;
        self.env.validate()
    }

    /// Apply per-trial hyperparameter values supplied by a search driver.
    ///
    /// Integer-valued keys are rounded. Unknown keys are rejected so a typo in
    /// a search space cannot silently train with defaults.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, f64>) -> TrainResult<()> {
        for (key, &value) in overrides {
            if !value.is_finite() {
                return Err(TrainError::config(format!("override {key} is not finite")));
            }
            let as_count = || value.round().max(0.0) as u64;
            match key.as_str() {
                "learning_rate" | "lr" => self.sac.learning_rate = value,
                "gamma" => self.sac.gamma = value,
                "tau" => self.sac.tau = value,
                "alpha" => self.sac.alpha = value,
                "grad_clip" => self.sac.grad_clip = value,
                "batch_size" => self.batch_size = as_count() as usize,
                "buffer_capacity" | "buffer_size" => self.buffer.capacity = as_count() as usize,
                "learning_starts" => self.learning_starts = as_count(),
                "total_timesteps" => self.total_timesteps = as_count(),
                other => {
                    return Err(TrainError::config(format!(
                        "unknown hyperparameter override: {other}"
                    )))
                }
            }
        }
        self.validate()
    }

    /// Flat view of the tunable hyperparameters, recorded in checkpoint metadata.
    #[must_use]
    pub fn hyperparameters(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("learning_rate".to_string(), self.sac.learning_rate);
        map.insert("gamma".to_string(), self.sac.gamma);
        map.insert("tau".to_string(), self.sac.tau);
        map.insert("alpha".to_string(), self.sac.alpha);
        map.insert("grad_clip".to_string(), self.sac.grad_clip);
        map.insert("batch_size".to_string(), self.batch_size as f64);
        map.insert("buffer_capacity".to_string(), self.buffer.capacity as f64);
        map.insert("learning_starts".to_string(), self.learning_starts as f64);
        map.insert("total_timesteps".to_string(), self.total_timesteps as f64);
        map.insert("window_size".to_string(), self.env.window_size as f64);
        map
    }
}

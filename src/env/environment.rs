//! Episodic wagering simulator.
//!
//! ## Episode layout
//!
//! An episode starts at `current_step = window_size`. The decision at step
//! `t` sees feature rows `[t − window_size, t)` only and is settled against
//! the outcome at `t`. The episode ends once `current_step ≥ len − 1` or the
//! balance reaches zero.
//!
//! ## Stakes
//!
//! `stake = round_to_unit(balance × fraction)`, raised to `min_unit`, then
//! capped at the largest unit multiple not exceeding the balance. When that
//! cap is below one unit the step places no bet.

use tracing::trace;

use crate::core::{EnvConfig, TrainError, TrainResult};
use crate::nn::Observation;

use super::action::BetAction;
use super::reward::{consistency_score, ReturnsWindow, RewardStrategy, Settlement};
use super::series::{MarketSeries, Side};

/// Information returned by [`BettingEnv::reset`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResetInfo {
    /// Balance at the start of the episode.
    pub balance: f64,
}

/// Per-step accounting details.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    /// The decoded action.
    pub action: BetAction,
    /// Stake actually placed (0 when no bet).
    pub stake: f64,
    /// Outcome realised at the settled step.
    pub outcome: Side,
    /// `Some(won)` when a bet was placed.
    pub won: Option<bool>,
    /// Balance change for the step, costs included.
    pub balance_delta: f64,
    /// Balance after the step.
    pub balance: f64,
    /// `balance − initial_balance`.
    pub profit: f64,
}

/// Result of one environment step.
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Next observation, or zeros once the episode has ended.
    pub observation: Observation,
    /// Reward from the configured strategy.
    pub reward: f64,
    /// Episode ended.
    pub terminated: bool,
    /// Mirrors `terminated`; episodes have no separate time limit.
    pub truncated: bool,
    /// Accounting details.
    pub info: StepInfo,
}

impl StepResult {
    /// Whether the episode has ended.
    #[inline]
    #[must_use]
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Simulator turning a [`MarketSeries`] into wagering episodes.
#[derive(Clone, Debug)]
pub struct BettingEnv {
    series: MarketSeries,
    config: EnvConfig,
    current_step: usize,
    balance: f64,
    returns: ReturnsWindow,
    episode_returns: Vec<f64>,
    finished: bool,
}

impl BettingEnv {
    /// Build an environment, already reset.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration; `Precondition` when the series
    /// is too short for one step after a full observation window.
    pub fn new(series: MarketSeries, config: &EnvConfig) -> TrainResult<Self> {
        config.validate()?;
        if series.len() < config.window_size + 2 {
            return Err(TrainError::precondition(format!(
                "series of {} rows is too short for window size {}",
                series.len(),
                config.window_size
            )));
        }
        let mut env = Self {
            series,
            config: config.clone(),
            current_step: 0,
            balance: 0.0,
            returns: ReturnsWindow::new(config.returns_window),
            episode_returns: Vec::new(),
            finished: false,
        };
        env.reset();
        Ok(env)
    }

    /// Start a new episode.
    pub fn reset(&mut self) -> (Observation, ResetInfo) {
        self.current_step = self.config.window_size;
        self.balance = self.config.initial_balance;
        self.returns.clear();
        self.episode_returns.clear();
        self.finished = false;
        (
            self.observation(),
            ResetInfo {
                balance: self.balance,
            },
        )
    }

    /// Settle one action against the outcome at the current step.
    ///
    /// # Errors
    ///
    /// `Precondition` for an out-of-range action or a finished episode;
    /// `Numerical` for a non-finite reward.
    pub fn step(&mut self, action: usize) -> TrainResult<StepResult> {
        if self.finished {
            return Err(TrainError::precondition("step called on a finished episode; call reset"));
        }
        let decoded = BetAction::decode(action, &self.config.bet_percentages)?;
        let outcome = self.series.outcome(self.current_step);

        let settlement = match decoded {
            BetAction::Bet { side, fraction, .. } => match self.stake_for(fraction) {
                Some(stake) => self.settle(stake, side == outcome),
                None => Self::no_bet(),
            },
            BetAction::Hold => Self::no_bet(),
        };

        // The reward sees this step's ratio; nothing is committed until it
        // is known to be finite.
        let ratio = settlement.won.map(|_| settlement.delta / settlement.stake);
        let staged = ratio.map(|r| {
            let mut window = self.returns.clone();
            window.push(r);
            window
        });
        let reward = TrainError::check_finite(
            "reward",
            self.config.reward.reward(
                &settlement,
                staged.as_ref().unwrap_or(&self.returns),
                self.config.initial_balance,
            ),
        )?;

        self.balance += settlement.delta;
        if let (Some(window), Some(r)) = (staged, ratio) {
            self.returns = window;
            self.episode_returns.push(r);
        }
        self.current_step += 1;
        let done = self.current_step >= self.series.len() - 1 || self.balance <= 0.0;
        self.finished = done;

        let observation = if done {
            Observation::zeros(self.observation_shape().to_vec())
        } else {
            self.observation()
        };

        trace!(
            step = self.current_step,
            action = %decoded,
            stake = settlement.stake,
            balance = self.balance,
            reward,
            "environment step"
        );

        Ok(StepResult {
            observation,
            reward,
            terminated: done,
            truncated: done,
            info: StepInfo {
                action: decoded,
                stake: settlement.stake,
                outcome,
                won: settlement.won,
                balance_delta: settlement.delta,
                balance: self.balance,
                profit: self.profit(),
            },
        })
    }

    fn no_bet() -> Settlement {
        Settlement {
            stake: 0.0,
            delta: 0.0,
            won: None,
        }
    }

    /// Stake for a balance fraction, or `None` if not even one unit fits.
    fn stake_for(&self, fraction: f64) -> Option<f64> {
        let unit = self.config.min_unit;
        let cap = (self.balance / unit).floor() * unit;
        if cap < unit {
            return None;
        }
        let rounded = (self.balance * fraction / unit).round() * unit;
        Some(rounded.max(unit).min(cap))
    }

    /// Price a placed bet without touching the balance.
    fn settle(&self, stake: f64, won: bool) -> Settlement {
        let cost = stake * self.config.transaction_cost;
        let gross = if won {
            stake * self.config.payout_ratio
        } else {
            -stake
        };
        Settlement {
            stake,
            delta: gross - cost,
            won: Some(won),
        }
    }

    fn observation(&self) -> Observation {
        let window = self.config.window_size;
        let start = self.current_step - window;
        let mut tensor = Vec::with_capacity(window * self.series.width());
        for row in start..self.current_step {
            tensor.extend_from_slice(self.series.row(row));
        }
        Observation::new(tensor, self.observation_shape().to_vec())
    }

    /// Consistency score over every return ratio of the current episode.
    #[must_use]
    pub fn episode_consistency_score(&self) -> f64 {
        consistency_score(&self.episode_returns)
    }

    /// Return ratios of the current episode, oldest first.
    #[must_use]
    pub fn episode_returns(&self) -> &[f64] {
        &self.episode_returns
    }

    /// Number of discrete actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.config.action_count()
    }

    /// Human-readable name of an action, e.g. `High(2.5%)`.
    pub fn action_label(&self, action: usize) -> TrainResult<String> {
        BetAction::decode(action, &self.config.bet_percentages).map(|a| a.to_string())
    }

    /// `[window_size, features_per_row]`.
    #[must_use]
    pub fn observation_shape(&self) -> [usize; 2] {
        [self.config.window_size, self.series.width()]
    }

    /// Flat observation length.
    #[must_use]
    pub fn observation_len(&self) -> usize {
        self.config.window_size * self.series.width()
    }

    /// Current balance.
    #[must_use]
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Index of the next outcome to settle.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// `balance − initial_balance`.
    #[must_use]
    pub fn profit(&self) -> f64 {
        self.balance - self.config.initial_balance
    }

    /// Whether the episode has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reward strategy in use.
    #[must_use]
    pub fn reward_strategy(&self) -> &RewardStrategy {
        &self.config.reward
    }

    /// The underlying series.
    #[must_use]
    pub fn series(&self) -> &MarketSeries {
        &self.series
    }
}

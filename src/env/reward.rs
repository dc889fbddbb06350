//! Reward strategies and return statistics.
//!
//! A return ratio is the net profit of one placed bet divided by its stake
//! (`+payout − cost` on a win, `−1 − cost` on a loss). The consistency score
//! of a set of ratios is `mean / std` (population std), or 0 with fewer than
//! two samples or a near-zero std.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::{TrainError, TrainResult};

/// Standard deviations at or below this are treated as zero.
pub const STD_EPSILON: f64 = 1e-9;

/// Reward function, fixed when the environment is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardStrategy {
    /// Balance change for the step.
    Direct {
        /// Subtracted when no bet was placed.
        #[serde(default)]
        abstain_penalty: f64,
    },

    /// Consistency score of the rolling window of return ratios.
    RiskAdjusted {
        /// Subtracted when no bet was placed.
        #[serde(default)]
        abstain_penalty: f64,
    },

    /// Balance change normalised by the initial balance, with losses scaled
    /// up and a flat bonus on every win.
    Shaped {
        /// Multiplier applied to normalised losses.
        loss_penalty_multiplier: f64,
        /// Added to every winning step.
        win_bonus: f64,
        /// Subtracted when no bet was placed.
        #[serde(default)]
        abstain_penalty: f64,
    },
}

impl Default for RewardStrategy {
    fn default() -> Self {
        RewardStrategy::Direct {
            abstain_penalty: 0.0,
        }
    }
}

/// What happened on one step, as seen by a reward strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Settlement {
    /// Stake placed (0 for no bet).
    pub stake: f64,
    /// Balance change including costs.
    pub delta: f64,
    /// `Some(true)` on a win, `Some(false)` on a loss, `None` with no bet.
    pub won: Option<bool>,
}

impl RewardStrategy {
    /// Penalty applied on steps without a bet.
    #[must_use]
    pub fn abstain_penalty(&self) -> f64 {
        match *self {
            RewardStrategy::Direct { abstain_penalty }
            | RewardStrategy::RiskAdjusted { abstain_penalty }
            | RewardStrategy::Shaped {
                abstain_penalty, ..
            } => abstain_penalty,
        }
    }

    /// Check that every coefficient is finite.
    pub fn validate(&self) -> TrainResult<()> {
        if !self.abstain_penalty().is_finite() {
            return Err(TrainError::config("abstain_penalty must be finite"));
        }
        if let RewardStrategy::Shaped {
            loss_penalty_multiplier,
            win_bonus,
            ..
        } = *self
        {
            if !(loss_penalty_multiplier.is_finite() && loss_penalty_multiplier >= 0.0) {
                return Err(TrainError::config("loss_penalty_multiplier must be non-negative"));
            }
            if !win_bonus.is_finite() {
                return Err(TrainError::config("win_bonus must be finite"));
            }
        }
        Ok(())
    }

    /// Reward for a settled step. `returns` already includes this step's ratio.
    pub(crate) fn reward(&self, settlement: &Settlement, returns: &ReturnsWindow, initial_balance: f64) -> f64 {
        let penalty = if settlement.won.is_none() {
            self.abstain_penalty()
        } else {
            0.0
        };
        let base = match *self {
            RewardStrategy::Direct { .. } => settlement.delta,
            RewardStrategy::RiskAdjusted { .. } => returns.consistency_score(),
            RewardStrategy::Shaped {
                loss_penalty_multiplier,
                win_bonus,
                ..
            } => match settlement.won {
                Some(true) => settlement.delta / initial_balance + win_bonus,
                Some(false) => settlement.delta / initial_balance * loss_penalty_multiplier,
                None => 0.0,
            },
        };
        base - penalty
    }
}

/// Bounded FIFO of the most recent return ratios.
#[derive(Clone, Debug, Default)]
pub struct ReturnsWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl ReturnsWindow {
    /// Create an empty window holding at most `capacity` ratios.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a ratio, evicting the oldest when full.
    pub fn push(&mut self, ratio: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(ratio);
    }

    /// Drop every ratio.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Ratios currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no ratios are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consistency score of the window.
    #[must_use]
    pub fn consistency_score(&self) -> f64 {
        consistency_score(&self.values)
    }
}

/// `mean / std` (population) of a set of return ratios.
///
/// 0 with fewer than two samples or when the std is at most [`STD_EPSILON`].
pub fn consistency_score<'a, I>(returns: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let iter = returns.into_iter();
    let (count, sum) = iter.clone().fold((0usize, 0.0), |(n, s), &r| (n + 1, s + r));
    if count < 2 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = iter.map(|&r| (r - mean).powi(2)).sum::<f64>() / count as f64;
    let std = variance.sqrt();
    if std <= STD_EPSILON {
        0.0
    } else {
        mean / std
    }
}

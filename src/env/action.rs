//! Discrete action decoding.
//!
//! With `k` stake levels the action space is `0..=2k`:
//! - `0`: hold (no bet)
//! - `1..=k`: low side at `bet_percentages[a − 1]`
//! - `k+1..=2k`: high side at `bet_percentages[a − k − 1]`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{TrainError, TrainResult};

use super::series::Side;

/// A decoded action.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BetAction {
    /// Abstain this round.
    Hold,
    /// Wager `fraction` of the balance on `side`.
    Bet {
        /// Side wagered on.
        side: Side,
        /// Stake level index into the configured percentages.
        level: usize,
        /// Fraction of the current balance.
        fraction: f64,
    },
}

impl BetAction {
    /// Decode an action index.
    ///
    /// # Errors
    ///
    /// `Precondition` if `action > 2 · bet_percentages.len()`.
    pub fn decode(action: usize, bet_percentages: &[f64]) -> TrainResult<Self> {
        let levels = bet_percentages.len();
        match action {
            0 => Ok(BetAction::Hold),
            a if a <= levels => Ok(BetAction::Bet {
                side: Side::Low,
                level: a - 1,
                fraction: bet_percentages[a - 1],
            }),
            a if a <= 2 * levels => Ok(BetAction::Bet {
                side: Side::High,
                level: a - levels - 1,
                fraction: bet_percentages[a - levels - 1],
            }),
            a => Err(TrainError::precondition(format!(
                "action {a} out of range for {} actions",
                2 * levels + 1
            ))),
        }
    }

    /// Inverse of [`BetAction::decode`] given the number of stake levels.
    #[must_use]
    pub fn index(&self, levels: usize) -> usize {
        match *self {
            BetAction::Hold => 0,
            BetAction::Bet {
                side: Side::Low,
                level,
                ..
            } => 1 + level,
            BetAction::Bet {
                side: Side::High,
                level,
                ..
            } => 1 + levels + level,
        }
    }

    /// Whether this action places a wager.
    #[must_use]
    pub fn is_bet(&self) -> bool {
        matches!(self, BetAction::Bet { .. })
    }
}

impl fmt::Display for BetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetAction::Hold => write!(f, "Hold"),
            BetAction::Bet { side, fraction, .. } => {
                let name = match side {
                    Side::Low => "Low",
                    Side::High => "High",
                };
                write!(f, "{name}({:.1}%)", fraction * 100.0)
            }
        }
    }
}

//! Deterministic policy evaluation.

use serde::{Deserialize, Serialize};

use crate::core::{TrainError, TrainResult};
use crate::env::BettingEnv;
use crate::nn::Approximator;

/// Summary of one greedy episode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Consistency score of the episode's return ratios.
    pub score: f64,
    /// Balance at the end of the episode.
    pub final_balance: f64,
    /// `final_balance − initial_balance`.
    pub profit: f64,
    /// Sum of step rewards.
    pub total_reward: f64,
    /// Steps taken.
    pub steps: u64,
    /// Bets actually placed.
    pub bets: u64,
    /// Bets won.
    pub wins: u64,
    /// Bets chosen but not placed because the balance was below one unit.
    pub declined_bets: u64,
    /// Times each action was chosen.
    pub action_counts: Vec<u64>,
}

impl EvaluationReport {
    /// Fraction of placed bets that won.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.bets == 0 {
            0.0
        } else {
            self.wins as f64 / self.bets as f64
        }
    }
}

/// Check that an approximator fits an environment's spaces.
pub(crate) fn check_compatible<A: Approximator + ?Sized>(approx: &A, env: &BettingEnv) -> TrainResult<()> {
    if approx.action_count() != env.action_count() {
        return Err(TrainError::precondition(format!(
            "approximator has {} actions, environment has {}",
            approx.action_count(),
            env.action_count()
        )));
    }
    if approx.observation_len() != env.observation_len() {
        return Err(TrainError::precondition(format!(
            "approximator expects observations of length {}, environment produces {}",
            approx.observation_len(),
            env.observation_len()
        )));
    }
    Ok(())
}

/// Run one full episode with greedy actions and summarise it.
///
/// Resets `env` first; never touches any buffer or parameters.
pub fn evaluate_policy<A: Approximator + ?Sized>(approx: &A, env: &mut BettingEnv) -> TrainResult<EvaluationReport> {
    check_compatible(approx, env)?;

    let (mut observation, _) = env.reset();
    let mut report = EvaluationReport {
        action_counts: vec![0; env.action_count()],
        ..EvaluationReport::default()
    };

    loop {
        let action = approx.act_greedy(&observation);
        let result = env.step(action)?;
        report.steps += 1;
        report.action_counts[action] += 1;
        report.total_reward += result.reward;
        match result.info.won {
            Some(won) => {
                report.bets += 1;
                report.wins += u64::from(won);
            }
            None if result.info.action.is_bet() => report.declined_bets += 1,
            None => {}
        }
        if result.done() {
            break;
        }
        observation = result.observation;
    }

    report.score = env.episode_consistency_score();
    report.final_balance = env.balance();
    report.profit = env.profit();
    Ok(report)
}

//! Wagering environment.
//!
//! ## Overview
//!
//! - **Series**: [`MarketSeries`] of aligned feature rows and outcomes, with
//!   chronological splitting and [`MinMaxScaler`]
//! - **Actions**: [`BetAction`] decoding of the discrete action space
//! - **Rewards**: [`RewardStrategy`], fixed per environment
//! - **Simulator**: [`BettingEnv`] with the balance ledger
//!
//! ## Usage
//!
//! ```
//! use wager_sac::core::EnvConfig;
//! use wager_sac::env::{BettingEnv, MarketSeries, Side};
//!
//! let features = (0..8).map(|i| vec![i as f32]).collect();
//! let outcomes = vec![Side::High; 8];
//! let series = MarketSeries::new(features, outcomes).unwrap();
//!
//! let config = EnvConfig::default()
//!     .with_window_size(3)
//!     .with_initial_balance(10_000.0)
//!     .with_bet_percentages(vec![0.1]);
//! let mut env = BettingEnv::new(series, &config).unwrap();
//!
//! let result = env.step(2).unwrap(); // High(10.0%)
//! assert_eq!(result.info.balance, 10_950.0);
//! ```

pub mod action;
pub mod environment;
pub mod reward;
pub mod series;

pub use action::BetAction;
pub use environment::{BettingEnv, ResetInfo, StepInfo, StepResult};
pub use reward::{consistency_score, ReturnsWindow, RewardStrategy};
pub use series::{MarketSeries, MinMaxScaler, SeriesSplit, Side};

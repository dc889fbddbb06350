//! Training infrastructure for discrete soft actor-critic.
//!
//! ## Overview
//!
//! - **SacLearner**: TD targets, losses, output gradients, entropy tuning
//! - **Trainer**: rollout, replay, optimisation, validation, checkpointing
//! - **Checkpoints**: [`CheckpointStore`] with file and in-memory backends
//! - **Search**: [`TrialReporter`] for hyperparameter-search pruning
//!
//! ## Usage
//!
//! ```
//! use wager_sac::core::{BufferConfig, EnvConfig, TrainingConfig};
//! use wager_sac::env::{MarketSeries, Side};
//! use wager_sac::nn::LinearActorCritic;
//! use wager_sac::training::{MemoryCheckpointStore, RunOutcome, Trainer};
//!
//! let series = |len: usize| {
//!     let features = (0..len).map(|i| vec![(i % 5) as f32 / 5.0]).collect();
//!     let outcomes = (0..len).map(|i| Side::from_is_high(i % 2 == 0)).collect();
//!     MarketSeries::new(features, outcomes).unwrap()
//! };
//!
//! let config = TrainingConfig::default()
//!     .with_total_timesteps(40)
//!     .with_learning_starts(8)
//!     .with_batch_size(8)
//!     .with_eval_freq(20)
//!     .with_buffer(BufferConfig::default().with_capacity(128))
//!     .with_env(EnvConfig::default().with_window_size(3));
//!
//! let net = LinearActorCritic::new(3, config.env.action_count(), config.seed);
//! let store = Box::new(MemoryCheckpointStore::new());
//! let mut trainer = Trainer::new(config, net, series(60), series(20), store).unwrap();
//!
//! let outcome = trainer.run().unwrap();
//! assert!(matches!(outcome, RunOutcome::Completed { .. } | RunOutcome::EarlyStopped { .. }));
//! ```

pub mod checkpoint;
pub mod evaluation;
pub mod sac;
pub mod search;
pub mod stats;
pub mod trainer;

pub use checkpoint::{
    promote_best, CheckpointId, CheckpointMetadata, CheckpointRecord, CheckpointStore,
    FileCheckpointStore, MemoryCheckpointStore, CHECKPOINT_SCHEMA,
};
pub use evaluation::{evaluate_policy, EvaluationReport};
pub use sac::{OptimizationReport, SacLearner};
pub use search::{PruneDecision, ScoreFloorPruner, TrialReporter};
pub use stats::TrainingStats;
pub use trainer::{RunOutcome, StopSignal, Trainer};

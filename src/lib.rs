//! # wager-sac
//!
//! Discrete soft actor-critic training core for a binary-outcome wagering
//! agent.
//!
//! ## Design Principles
//!
//! 1. **No Lookahead**: The decision at step `t` only ever sees feature rows
//!    before `t`. Scaling is fitted on training rows only.
//!
//! 2. **Explicit State**: No global mutable state. A run is fully described by
//!    a `TrainingConfig`, its input series and a seed.
//!
//! 3. **Pluggable Approximator**: The training loop owns the SAC mathematics;
//!    an `Approximator` owns parameters and receives gradients at its outputs.
//!
//! ## Architecture
//!
//! - **Prioritized Replay**: SumTree over a flat array, stratified sampling,
//!   annealed importance weights.
//!
//! - **Accounting Environment**: Unit-rounded stakes capped by balance,
//!   per-bet transaction costs, reward strategy fixed at construction.
//!
//! - **Checkpoints**: Immutable candidate records keyed by score, timestamp,
//!   run id and sequence; a separate best pointer.
//!
//! ## Modules
//!
//! - `core`: Configuration, errors, RNG
//! - `replay`: SumTree and prioritized buffer
//! - `env`: Series preparation and the wagering environment
//! - `nn`: Approximator trait and reference implementations
//! - `training`: SAC learner, trainer, evaluation, checkpoints, search hooks

pub mod core;
pub mod env;
pub mod nn;
pub mod replay;
pub mod training;

// Re-export commonly used types
pub use crate::core::{
    BufferConfig, CheckpointError, EnvConfig, SacConfig, TrainError, TrainResult, TrainRng,
    TrainingConfig,
};

pub use crate::env::{
    BetAction, BettingEnv, MarketSeries, MinMaxScaler, RewardStrategy, SeriesSplit, Side,
    StepInfo, StepResult,
};

pub use crate::nn::{
    ActionValues, Approximator, Evaluation, LinearActorCritic, Observation, OutputGradients,
    ParameterSnapshot, TargetValues, UniformPolicy,
};

pub use crate::replay::{PriorityBuffer, SampledBatch, SumTree, Transition};

pub use crate::training::{
    evaluate_policy, promote_best, CheckpointId, CheckpointRecord, CheckpointStore,
    EvaluationReport, FileCheckpointStore, MemoryCheckpointStore, PruneDecision, RunOutcome,
    SacLearner, StopSignal, Trainer, TrainingStats, TrialReporter,
};

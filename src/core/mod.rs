//! Core types shared by every component: configuration, errors, RNG.
//!
//! Nothing in this crate holds global mutable state; a run is fully
//! described by a `TrainingConfig` and a seed.

pub mod config;
pub mod error;
pub mod rng;

pub use config::{BufferConfig, EnvConfig, SacConfig, TrainingConfig};
pub use error::{CheckpointError, TrainError, TrainResult};
pub use rng::TrainRng;

//! Function approximation for discrete soft actor-critic.
//!
//! ## Overview
//!
//! - **Traits**: [`Approximator`] (actor, twin critics and target critics)
//! - **Reference**: [`LinearActorCritic`], a CPU linear model for tests and
//!   small runs
//! - **Baseline**: [`UniformPolicy`] for testing the loop without learning
//!
//! ## Usage
//!
//! ```
//! use wager_sac::nn::{Approximator, LinearActorCritic, Observation};
//!
//! let net = LinearActorCritic::new(6, 3, 42);
//! let obs = Observation::zeros(vec![2, 3]);
//!
//! let probs = net.policy(&obs);
//! assert_eq!(probs.len(), 3);
//! ```

pub mod linear;
pub mod traits;

pub use linear::LinearActorCritic;
pub use traits::{
    ActionValues, Approximator, Evaluation, Observation, OutputGradients, ParameterSnapshot,
    TargetValues, UniformPolicy,
};

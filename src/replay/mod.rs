//! Prioritized replay storage.
//!
//! - [`SumTree`]: flat-array prefix-sum tree over priorities
//! - [`PriorityBuffer`]: ring buffer of [`Transition`]s sampled in
//!   proportion to priority, with importance-sampling weights
//!
//! ## Usage
//!
//! ```
//! use wager_sac::core::{BufferConfig, TrainRng};
//! use wager_sac::nn::Observation;
//! use wager_sac::replay::{PriorityBuffer, Transition};
//!
//! let mut buffer = PriorityBuffer::new(&BufferConfig::default().with_capacity(8)).unwrap();
//! let obs = Observation::zeros(vec![2, 3]);
//! for td_error in [0.1, 2.0, 0.5] {
//!     let transition = Transition {
//!         state: obs.clone(),
//!         action: 0,
//!         reward: 0.0,
//!         next_state: obs.clone(),
//!         done: false,
//!     };
//!     buffer.push(td_error, transition).unwrap();
//! }
//!
//! let mut rng = TrainRng::new(7);
//! let batch = buffer.sample(2, &mut rng).unwrap();
//! assert_eq!(batch.len(), 2);
//! ```

pub mod buffer;
pub mod sum_tree;

pub use buffer::{PriorityBuffer, SampledBatch, Transition};
pub use sum_tree::SumTree;

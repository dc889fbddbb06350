//! Seeded randomness for training runs.
//!
//! Every random decision in a run (exploration, replay strata, parameter
//! initialisation) draws from a [`TrainRng`] derived from the run seed.
//! Named streams keep those consumers independent: adding a draw to one
//! never shifts the others.
//!
//! ## Usage
//!
//! ```
//! use wager_sac::core::TrainRng;
//!
//! let root = TrainRng::new(42);
//! let mut explore = root.for_context("explore");
//! let mut replay = root.for_context("replay");
//!
//! assert_ne!(explore.next_f64(), replay.next_f64());
//! ```

use std::hash::{Hash, Hasher};
use std::ops::Range;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHasher;

/// ChaCha8 stream tagged with the seed it started from.
#[derive(Clone, Debug)]
pub struct TrainRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl TrainRng {
    /// Stream for a run seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this stream started from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent stream named `context`, derived from this stream's seed.
    ///
    /// Does not consume any draws from `self`.
    #[must_use]
    pub fn for_context(&self, context: &str) -> Self {
        // FxHasher output is fixed across toolchains; DefaultHasher's is not.
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        context.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Uniform index in `range`.
    pub fn gen_range_usize(&mut self, range: Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform draw in `[low, high)`; `low` when the range is empty.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.next_f64()
    }

    /// Uniform draw in `[−scale, scale)`.
    pub fn symmetric_f32(&mut self, scale: f32) -> f32 {
        (self.inner.gen::<f32>() * 2.0 - 1.0) * scale
    }

    /// Index drawn with probability proportional to `weights`.
    ///
    /// `None` when there is no positive finite mass to draw from.
    pub fn choose_weighted(&mut self, weights: &[f32]) -> Option<usize> {
        let total: f64 = weights.iter().map(|&w| f64::from(w)).sum();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }
        let mut remaining = self.next_f64() * total;
        for (i, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            remaining -= f64::from(w);
            if remaining < 0.0 {
                return Some(i);
            }
        }
        // Rounding left a sliver of mass past the last bucket.
        weights.iter().rposition(|&w| w > 0.0)
    }
}

//! Flat-array sum tree.
//!
//! A complete binary tree of `2·capacity − 1` nodes stored in one `Vec<f64>`.
//! Leaves hold priorities at `capacity − 1 ..`; every internal node holds the
//! sum of its two children, so the root is the total mass and a prefix-sum
//! search is a single root-to-leaf descent.

use serde::{Deserialize, Serialize};

/// Sum tree over `capacity` leaf slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SumTree {
    /// All nodes; `nodes[0]` is the root.
    nodes: Vec<f64>,

    /// Number of leaf slots.
    capacity: usize,
}

impl SumTree {
    /// Create a tree of zero priorities.
    ///
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "SumTree capacity must be positive");
        Self {
            nodes: vec![0.0; 2 * capacity.max(1) - 1],
            capacity: capacity.max(1),
        }
    }

    /// Number of leaf slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of every leaf.
    #[inline]
    #[must_use]
    pub fn total(&self) -> f64 {
        self.nodes[0]
    }

    #[inline]
    fn leaf(&self, slot: usize) -> usize {
        slot + self.capacity - 1
    }

    /// Priority stored at a slot.
    #[must_use]
    pub fn get(&self, slot: usize) -> f64 {
        self.nodes[self.leaf(slot)]
    }

    /// Set the priority at a slot and refresh every ancestor.
    pub fn set(&mut self, slot: usize, priority: f64) {
        let mut idx = self.leaf(slot);
        self.nodes[idx] = priority;
        // Ancestors are recomputed from their children so rounding error
        // cannot accumulate across updates.
        while idx > 0 {
            idx = (idx - 1) / 2;
            self.nodes[idx] = self.nodes[2 * idx + 1] + self.nodes[2 * idx + 2];
        }
    }

    /// Slot whose cumulative range contains `value`.
    ///
    /// Descends left when `value` is within the left subtree's mass,
    /// otherwise subtracts that mass and descends right. A subtree with zero
    /// mass is never entered while its sibling has mass, so the result always
    /// has positive priority when the total is positive.
    #[must_use]
    pub fn find(&self, value: f64) -> usize {
        let mut value = value.max(0.0);
        let mut idx = 0;
        while idx < self.capacity - 1 {
            let left = 2 * idx + 1;
            let right = left + 1;
            let left_sum = self.nodes[left];
            if (value <= left_sum && left_sum > 0.0) || self.nodes[right] <= 0.0 {
                idx = left;
            } else {
                value -= left_sum;
                idx = right;
            }
        }
        idx + 1 - self.capacity
    }
}

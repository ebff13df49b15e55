//! Work function
//!
//! A worker turns each work item into a result through a `Compute`
//! implementation. The default, `RandomOffset`, adds a uniformly drawn offset
//! in `[0, max_offset]` to the item: a stand-in for real computation whose
//! output cannot be traced back to its item by the writer.
//!
//! # Example
//!
//! ```
//! use coordwork::work::{Compute, RandomOffset};
//!
//! let mut compute = RandomOffset::with_seed(100, 42);
//! let result = compute.compute(7);
//! assert!((7..=107).contains(&result));
//! ```

use crate::config::WorkConfig;
use crate::protocol::Rank;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Turns one work item into one result
///
/// Each worker owns its own instance, so implementations only need `Send`.
pub trait Compute: Send {
    fn compute(&mut self, item: i64) -> i64;
}

/// Adds a uniform random offset in `[0, max_offset]`
pub struct RandomOffset {
    rng: Xoshiro256PlusPlus,
    max_offset: i64,
}

impl RandomOffset {
    /// Random offsets from an entropy-seeded generator
    pub fn new(max_offset: i64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::from_entropy(),
            max_offset: max_offset.max(0),
        }
    }

    /// Reproducible offsets
    pub fn with_seed(max_offset: i64, seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            max_offset: max_offset.max(0),
        }
    }

    /// Work function for the worker at `rank`
    ///
    /// With a configured seed every worker gets its own stream (`seed + rank`)
    /// so runs are reproducible without workers sharing offsets.
    pub fn for_worker(config: &WorkConfig, rank: Rank) -> Self {
        match config.seed {
            Some(seed) => Self::with_seed(config.max_offset, seed.wrapping_add(rank as u64)),
            None => Self::new(config.max_offset),
        }
    }

    pub fn max_offset(&self) -> i64 {
        self.max_offset
    }
}

impl Compute for RandomOffset {
    fn compute(&mut self, item: i64) -> i64 {
        item.saturating_add(self.rng.gen_range(0..=self.max_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_in_range() {
        let mut compute = RandomOffset::new(100);
        for item in 0..1000 {
            let result = compute.compute(item);
            assert!(result >= item && result <= item + 100);
        }
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let mut compute = RandomOffset::new(0);
        for item in [-5, 0, 3, 99] {
            assert_eq!(compute.compute(item), item);
        }
    }

    #[test]
    fn test_negative_max_clamped() {
        let mut compute = RandomOffset::new(-3);
        assert_eq!(compute.max_offset(), 0);
        assert_eq!(compute.compute(10), 10);
    }

    #[test]
    fn test_seeded_reproducible() {
        let mut a = RandomOffset::with_seed(100, 12345);
        let mut b = RandomOffset::with_seed(100, 12345);
        for item in 0..20 {
            assert_eq!(a.compute(item), b.compute(item));
        }
    }

    #[test]
    fn test_offsets_cover_range() {
        let mut compute = RandomOffset::with_seed(9, 42);
        let mut seen = [false; 10];
        for _ in 0..2000 {
            seen[compute.compute(0) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "Offsets never hit some values: {:?}", seen);
    }

    #[test]
    fn test_per_worker_streams_differ() {
        let config = WorkConfig {
            seed: Some(7),
            ..WorkConfig::default()
        };
        let mut w2 = RandomOffset::for_worker(&config, 2);
        let mut w3 = RandomOffset::for_worker(&config, 3);
        let mut w2_again = RandomOffset::for_worker(&config, 2);

        let a: Vec<_> = (0..16).map(|i| w2.compute(i)).collect();
        let b: Vec<_> = (0..16).map(|i| w3.compute(i)).collect();
        let c: Vec<_> = (0..16).map(|i| w2_again.compute(i)).collect();

        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}

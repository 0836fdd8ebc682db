//! # Drop policy
//!
//! Each link has an independent, operator-adjustable probability of discarding an inbound frame
//! before it reaches the router (`setDropRate` / uniform random drop in the original router, used
//! to simulate lossy links during bench testing). A rate of `0.0` never drops; `1.0` drops
//! everything.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Rolls the drop decision for a single frame using the thread-local RNG.
///
/// `rate` outside `[0.0, 1.0]` is treated as its nearest bound.
pub fn should_drop(rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    rand::thread_rng().gen::<f64>() < rate
}

/// Seedable drop policy, used where a reproducible sequence of decisions is required (tests,
/// deterministic replays).
pub struct SeededDropPolicy {
    rng: Mutex<StdRng>,
}

impl SeededDropPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn should_drop(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let mut rng = self.rng.lock().expect("drop policy rng poisoned");
        rng.gen::<f64>() < rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_never_drops() {
        for _ in 0..1000 {
            assert!(!should_drop(0.0));
        }
    }

    #[test]
    fn full_rate_always_drops() {
        for _ in 0..1000 {
            assert!(should_drop(1.0));
        }
    }

    #[test]
    fn seeded_policy_is_deterministic() {
        let a = SeededDropPolicy::new(42);
        let b = SeededDropPolicy::new(42);
        let sequence_a: Vec<bool> = (0..50).map(|_| a.should_drop(0.5)).collect();
        let sequence_b: Vec<bool> = (0..50).map(|_| b.should_drop(0.5)).collect();
        assert_eq!(sequence_a, sequence_b);
    }
}

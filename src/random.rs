//! The random number facade consumed by the move engine.
//!
//! A thin wrapper over ChaCha20 so that runs are reproducible from a single
//! `u64` seed.  The three primitives match what the moves need: a uniform
//! deviate on [0,1), an inclusive integer draw, and a Gaussian.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

pub struct McRng {
    rng: ChaCha20Rng,
}

impl McRng {
    pub fn seed_from(seed: u64) -> Self {
        McRng {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Uniform deviate on [0,1).
    #[inline]
    pub fn rand(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform integer on 0..=k.
    #[inline]
    pub fn rand_int(&mut self, k: usize) -> usize {
        self.rng.gen_range(0..=k)
    }

    /// Gaussian deviate with the given mean and standard deviation.
    #[inline]
    pub fn rand_norm(&mut self, mu: f64, sigma: f64) -> f64 {
        Normal::new(mu, sigma).unwrap().sample(&mut self.rng)
    }
}

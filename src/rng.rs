//! Seedable random source shared by every stochastic operator of a run.
//!
//! All mutation, crossover and selection draws go through one [`NeatRng`], so two
//! runs started from the same seed and fed the same fitness values evolve the
//! same genomes.
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Run-scoped pseudo random generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeatRng {
    seed: u64,
    inner: Xoshiro256PlusPlus,
}

impl NeatRng {
    pub fn new(seed: u64) -> Self {
        Self { seed, inner: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }

    /// Restart the sequence of draws from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// The seed the current sequence was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform draw in `[-range, range)`. A zero range yields zero.
    pub fn symmetric(&mut self, range: f64) -> f64 {
        if range > 0.0 {
            self.inner.gen_range(-range..range)
        } else {
            0.0
        }
    }

    /// Gaussian draw with the given mean and standard deviation.
    pub fn gaussian(&mut self, mean: f64, stddev: f64) -> f64 {
        mean + stddev * self.standard_normal()
    }

    pub fn standard_normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        // gen_bool panics outside of [0, 1]; configs are validated, clamp anyway.
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform index into a collection of `len` elements. `len` must be positive.
    pub fn index(&mut self, len: usize) -> usize {
        self.inner.gen_range(0..len)
    }
}

impl Default for NeatRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RngCore for NeatRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

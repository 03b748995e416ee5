//! Random draws used throughout the context tree: seat assignment in
//! [`crate::Node::add_customer`]/[`crate::Node::remove_customer`] and the
//! auxiliary-variable resampling in [`crate::HPYLM::sample_hyperparams`].
//!
//! A [`Sampler`] wraps an explicit, seedable RNG rather than a process-wide
//! singleton, so tests stay deterministic (see the Design Notes on the
//! original's use of a global RNG).

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use rand_distr::StandardNormal;

/// Floor below which Beta/Gamma draws are clamped; the hierarchy's
/// predictive-probability recursion divides by quantities derived from
/// these draws, so an exact zero must never escape.
const MIN_POSITIVE: f64 = 1e-12;

/// Source of randomness for CRP seat assignment and hyperparameter
/// resampling.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Build a sampler seeded deterministically.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Build a sampler seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_rng(&mut rand::rng()) }
    }

    /// Draw uniformly from `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Draw a uniform integer in the inclusive range `[lo, hi]`.
    ///
    /// # Panics
    /// Panics if `lo > hi`.
    pub fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        assert!(lo <= hi, "uniform_int: empty range [{lo}, {hi}]");
        self.rng.random_range(lo..=hi)
    }

    /// Bernoulli draw with success probability `p` (clamped to `[0, 1]`).
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }

    /// Gamma(shape, rate) via the Marsaglia–Tsang construction.
    ///
    /// Supports `shape > 0`; for `shape < 1` a boosting trick
    /// (Marsaglia & Tsang 2000) is used since the base construction
    /// assumes `shape >= 1`.
    pub fn gamma(&mut self, shape: f64, rate: f64) -> f64 {
        debug_assert!(shape > 0.0, "gamma shape must be positive, got {shape}");
        debug_assert!(rate > 0.0, "gamma rate must be positive, got {rate}");

        if shape < 1.0 {
            // Ga(shape) = Ga(shape + 1) * U^(1/shape)
            let g = self.gamma_shape_ge_one(shape + 1.0);
            let u: f64 = self.uniform().max(MIN_POSITIVE);
            return (g * u.powf(1.0 / shape) / rate).max(MIN_POSITIVE);
        }
        (self.gamma_shape_ge_one(shape) / rate).max(MIN_POSITIVE)
    }

    /// Marsaglia–Tsang core routine, valid for `shape >= 1`.
    fn gamma_shape_ge_one(&mut self, shape: f64) -> f64 {
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let mut x: f64 = self.rng.sample(StandardNormal);
            let mut v = 1.0 + c * x;
            while v <= 0.0 {
                x = self.rng.sample(StandardNormal);
                v = 1.0 + c * x;
            }
            v = v * v * v;
            let u = self.uniform();
            let x2 = x * x;
            if u < 1.0 - 0.0331 * x2 * x2 {
                return d * v;
            }
            if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }

    /// Beta(a, b), derived from two independent Gamma draws:
    /// `Beta(a, b) = Ga(a, 1) / (Ga(a, 1) + Ga(b, 1))`.
    pub fn beta(&mut self, a: f64, b: f64) -> f64 {
        debug_assert!(a > 0.0 && b > 0.0, "beta params must be positive, got ({a}, {b})");
        let ga = self.gamma(a, 1.0);
        let gb = self.gamma(b, 1.0);
        (ga / (ga + gb)).clamp(MIN_POSITIVE, 1.0 - MIN_POSITIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_int_inclusive_bounds() {
        let mut s = Sampler::seeded(7);
        for _ in 0..200 {
            let v = s.uniform_int(3, 3);
            assert_eq!(v, 3);
        }
        for _ in 0..200 {
            let v = s.uniform_int(0, 1);
            assert!(v == 0 || v == 1);
        }
    }

    #[test]
    fn beta_never_hits_boundary() {
        let mut s = Sampler::seeded(1);
        for _ in 0..5000 {
            let v = s.beta(0.5, 0.5);
            assert!(v > 0.0 && v < 1.0, "beta draw escaped (0,1): {v}");
        }
    }

    #[test]
    fn gamma_is_positive() {
        let mut s = Sampler::seeded(2);
        for _ in 0..5000 {
            let v = s.gamma(0.3, 2.0);
            assert!(v > 0.0, "gamma draw was non-positive: {v}");
        }
        for _ in 0..5000 {
            let v = s.gamma(3.0, 0.7);
            assert!(v > 0.0, "gamma draw was non-positive: {v}");
        }
    }

    #[test]
    fn deterministic_given_same_seed() {
        let mut a = Sampler::seeded(42);
        let mut b = Sampler::seeded(42);
        for _ in 0..50 {
            assert_eq!(a.uniform(), b.uniform());
        }
    }
}

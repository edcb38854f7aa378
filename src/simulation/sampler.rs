use std::f64::consts::PI;

use rand::distr::Distribution;
use rand::rngs::ThreadRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Standard normal variates from the Box-Muller transform.
///
/// Each sample consumes two fresh uniforms from (0, 1) and keeps only the
/// cosine branch; the sine partner is discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxMuller;

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u1 = open_uniform(rng);
        let u2 = open_uniform(rng);
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Uniform draw from [0, 1), redrawn while it is exactly zero.
fn open_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.random();
        if u != 0.0 {
            return u;
        }
    }
}

/// Source of standard normal samples consumed by the measurement generator.
pub trait NoiseSource {
    fn standard_normal(&mut self) -> f64;
}

/// Box-Muller samples over any uniform generator.
#[derive(Clone, Debug)]
pub struct RngNoise<R: Rng> {
    rng: R,
}

impl<R: Rng> RngNoise<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> NoiseSource for RngNoise<R> {
    fn standard_normal(&mut self) -> f64 {
        BoxMuller.sample(&mut self.rng)
    }
}

/// Reproducible noise, one independent stream per seed.
pub type SeededNoise = RngNoise<ChaCha8Rng>;

impl SeededNoise {
    pub fn from_seed(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

/// Unseeded noise from the thread-local generator; runs differ every time.
pub type ThreadNoise = RngNoise<ThreadRng>;

impl Default for ThreadNoise {
    fn default() -> Self {
        Self::new(rand::rng())
    }
}

/// Zero noise, for noise-free measurements of an otherwise noisy model.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl NoiseSource for Silent {
    fn standard_normal(&mut self) -> f64 {
        0.0
    }
}

impl<N: NoiseSource + ?Sized> NoiseSource for &mut N {
    fn standard_normal(&mut self) -> f64 {
        (**self).standard_normal()
    }
}

pub fn generate_standard_normals(noise: &mut impl NoiseSource, number_samples: usize) -> Vec<f64> {
    let mut samples = Vec::with_capacity(number_samples);
    while samples.len() < number_samples {
        samples.push(noise.standard_normal());
    }

    samples
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use super::*;

    /// Yields zero first, then a constant mid-range word.
    struct ZeroFirst {
        calls: u32,
    }

    impl RngCore for ZeroFirst {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.calls += 1;
            if self.calls == 1 {
                0
            } else {
                1 << 63
            }
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for byte in dest.iter_mut() {
                *byte = self.next_u64() as u8;
            }
        }
    }

    #[test]
    fn test_moments() {
        let mut noise = SeededNoise::from_seed(7);
        let samples = generate_standard_normals(&mut noise, 100_000);

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);

        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((variance - 1.0).abs() < 0.1, "variance {variance}");
    }

    #[test]
    fn test_thread_noise_moments() {
        let samples = generate_standard_normals(&mut ThreadNoise::default(), 100_000);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn test_seeded_streams_repeat() {
        let first = generate_standard_normals(&mut SeededNoise::from_seed(42), 16);
        let second = generate_standard_normals(&mut SeededNoise::from_seed(42), 16);
        let other = generate_standard_normals(&mut SeededNoise::from_seed(43), 16);

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_zero_uniform_is_redrawn() {
        let mut rng = ZeroFirst { calls: 0 };
        assert_eq!(open_uniform(&mut rng), 0.5);
        assert_eq!(rng.calls, 2);
    }

    #[test]
    fn test_silent() {
        assert_eq!(generate_standard_normals(&mut Silent, 3), vec![0.0; 3]);
    }
}

//! Deterministic synthetic data generation (seeded ChaCha8).

use crate::engine::VectorBatch;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;

pub struct Datagen {
    rng: ChaCha8Rng,
}

impl Datagen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// One standard-normal draw via the Box–Muller transform,
    /// `sqrt(-2 ln u1) * sin(2π u2)` from two independent uniform(0,1) draws.
    pub fn standard_normal(&mut self) -> f32 {
        // 1 - u keeps u1 away from zero so ln stays finite.
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).sin()) as f32
    }

    pub fn vector(&mut self, dim: usize) -> Vec<f32> {
        (0..dim).map(|_| self.standard_normal()).collect()
    }

    /// A batch of `rows` vectors with ids `start_id..start_id + rows`.
    pub fn batch(&mut self, start_id: u64, rows: usize, dim: usize) -> VectorBatch {
        let ids = (start_id..start_id + rows as u64).collect();
        let mut vectors = Vec::with_capacity(rows * dim);
        for _ in 0..rows {
            for _ in 0..dim {
                vectors.push(self.standard_normal());
            }
        }
        VectorBatch { dim, ids, vectors }
    }
}

/// The fixed query pool: generated once, independent of dataset contents,
/// reused unmodified (same vectors, same order) across warmup and timed
/// phases. Queries may or may not have close matches in the datasets; the
/// benchmark measures latency, not recall.
pub fn generate_queries(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut gen = Datagen::new(seed);
    (0..count).map(|_| gen.vector(dim)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_seed() {
        let a = generate_queries(8, 16, 7);
        let b = generate_queries(8, 16, 7);
        assert_eq!(a, b);

        let c = generate_queries(8, 16, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shapes() {
        let pool = generate_queries(5, 32, 1);
        assert_eq!(pool.len(), 5);
        assert!(pool.iter().all(|q| q.len() == 32));

        let batch = Datagen::new(1).batch(100, 7, 3);
        assert_eq!(batch.ids, vec![100, 101, 102, 103, 104, 105, 106]);
        assert_eq!(batch.vectors.len(), 21);
    }

    #[test]
    fn test_normal_moments_roughly_standard() {
        let mut gen = Datagen::new(42);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| gen.standard_normal() as f64).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.1, "var {var}");
        assert!(samples.iter().all(|x| x.is_finite()));
    }
}

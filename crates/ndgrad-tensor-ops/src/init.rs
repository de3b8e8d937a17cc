use ndgrad_tensor::{Tensor, TensorAllocator};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::kernel::Indexer;

/// Draws normally distributed samples with the polar Box-Muller method.
///
/// Each accepted pair of uniform draws yields two independent samples; the second
/// one is cached and returned by the next call.
///
/// # Example
///
/// ```
/// use ndgrad_tensor_ops::init::NormalSampler;
///
/// let mut a = NormalSampler::new(5);
/// let mut b = NormalSampler::new(5);
/// assert_eq!(a.sample(0.0, 1.0), b.sample(0.0, 1.0));
/// ```
#[derive(Clone, Debug)]
pub struct NormalSampler {
    rng: StdRng,
    spare: Option<f64>,
}

impl NormalSampler {
    /// Creates a sampler seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spare: None,
        }
    }

    /// Draws one sample from the normal distribution with the given mean and standard deviation.
    pub fn sample(&mut self, mean: f32, stddev: f32) -> f32 {
        let z = match self.spare.take() {
            Some(z) => z,
            None => loop {
                let u = self.rng.random::<f64>() * 2.0 - 1.0;
                let v = self.rng.random::<f64>() * 2.0 - 1.0;
                let s = u * u + v * v;
                if s > 0.0 && s < 1.0 {
                    let mul = (-2.0 * s.ln() / s).sqrt();
                    self.spare = Some(v * mul);
                    break u * mul;
                }
            },
        };
        mean + stddev * z as f32
    }
}

/// Writes `value` into every element of `t`.
pub fn fill<A: TensorAllocator>(t: &mut Tensor<A>, value: f32) {
    fill_with(t, |_| value);
}

/// Fills `t` with samples drawn uniformly from `[min, max)`.
pub fn uniform<A: TensorAllocator>(t: &mut Tensor<A>, min: f32, max: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let range = max - min;
    fill_with(t, |_| rng.random::<f32>() * range + min);
}

/// Fills `t` with normally distributed samples.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{init::normal, reduce::mean};
///
/// let ctx = TensorContext::default();
/// let mut t = Tensor::zeros(&ctx, &[100, 100]).unwrap();
/// normal(&mut t, 3.0, 0.5, 11);
/// assert!((mean(&t) - 3.0).abs() < 0.05);
/// ```
pub fn normal<A: TensorAllocator>(t: &mut Tensor<A>, mean: f32, stddev: f32, seed: u64) {
    let mut sampler = NormalSampler::new(seed);
    fill_with(t, |_| sampler.sample(mean, stddev));
}

/// Writes `f(i)` at every linear index `i` of `t`, in row-major order.
pub(crate) fn fill_with<A, F>(t: &mut Tensor<A>, mut f: F)
where
    A: TensorAllocator,
    F: FnMut(usize) -> f32,
{
    let idx = Indexer::new(t);
    for i in 0..t.numel() {
        let value = f(i);
        t.write_at(idx.at(i), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce;
    use ndgrad_tensor::{TensorContext, TensorError};

    #[test]
    fn test_fill_view_only() -> Result<(), TensorError> {
        let ctx = TensorContext::default();
        let base = Tensor::zeros(&ctx, &[3, 2])?;
        let mut col = base.permute_axes(&[1, 0])?.create_view(1, 1)?;
        fill(&mut col, 7.0);
        assert_eq!(base.to_vec(), vec![0.0, 7.0, 0.0, 7.0, 0.0, 7.0]);
        Ok(())
    }

    #[test]
    fn test_uniform_range_and_seed() -> Result<(), TensorError> {
        let ctx = TensorContext::default();
        let mut a = Tensor::zeros(&ctx, &[64, 64])?;
        let mut b = Tensor::zeros(&ctx, &[64, 64])?;
        uniform(&mut a, -2.0, 3.0, 9);
        uniform(&mut b, -2.0, 3.0, 9);
        assert_eq!(a.to_vec(), b.to_vec());
        assert!(a.iter().all(|x| (-2.0..3.0).contains(&x)));
        assert!((reduce::mean(&a) - 0.5).abs() < 0.1);
        Ok(())
    }

    #[test]
    fn test_normal_moments() -> Result<(), TensorError> {
        let ctx = TensorContext::default();
        let mut t = Tensor::zeros(&ctx, &[200, 200])?;
        normal(&mut t, -1.0, 2.0, 1234);
        let m = reduce::mean(&t);
        let var = t.iter().map(|x| (x - m) * (x - m)).sum::<f32>() / t.numel() as f32;
        assert!((m + 1.0).abs() < 0.05, "mean {m}");
        assert!((var.sqrt() - 2.0).abs() < 0.05, "stddev {}", var.sqrt());
        Ok(())
    }

    #[test]
    fn test_sampler_uses_spare() {
        let mut sampler = NormalSampler::new(0);
        sampler.sample(0.0, 1.0);
        assert!(sampler.spare.is_some());
        sampler.sample(0.0, 1.0);
        assert!(sampler.spare.is_none());
    }
}

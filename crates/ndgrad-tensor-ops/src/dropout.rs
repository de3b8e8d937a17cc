use ndgrad_tensor::{Tensor, TensorAllocator};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::TensorOpsError,
    kernel::{store, Indexer, WriteMode},
};

/// Zeroes each element of `a` with probability `p` and rescales the survivors.
///
/// Surviving elements are multiplied by `1 / (1 - p)` so the expected value of every
/// element is preserved. The same seed always drops the same elements.
///
/// # Arguments
///
/// * `a` - The input tensor.
/// * `res` - The destination tensor, of the same shape as `a`.
/// * `p` - The drop probability, in `[0, 1]`.
/// * `seed` - Seed of the random generator.
/// * `mode` - Whether to overwrite or accumulate into `res`.
///
/// # Errors
///
/// Returns [`TensorOpsError::InvalidArgument`] if `p` is outside `[0, 1]` and
/// [`TensorOpsError::ShapeMismatch`] if `res` and `a` differ in shape.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{dropout::dropout, WriteMode};
///
/// let ctx = TensorContext::default();
/// let a = Tensor::from_shape_val(&ctx, &[1000], 1.0).unwrap();
/// let mut res = Tensor::zeros(&ctx, &[1000]).unwrap();
/// dropout(&a, &mut res, 0.5, 7, WriteMode::Overwrite).unwrap();
/// assert!(res.iter().all(|x| x == 0.0 || x == 2.0));
/// ```
pub fn dropout<A: TensorAllocator>(
    a: &Tensor<A>,
    res: &mut Tensor<A>,
    p: f32,
    seed: u64,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(TensorOpsError::InvalidArgument(format!(
            "dropout probability must be in [0, 1], got {p}"
        )));
    }
    if a.shape() != res.shape() {
        return Err(TensorOpsError::mismatch(a.shape(), res.shape()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let scale = 1.0 / (1.0 - p);
    let a_idx = Indexer::new(a);
    let res_idx = Indexer::new(res);
    for i in 0..a.numel() {
        // a draw in [0, 1) is always below p == 1
        let value = if rng.random::<f32>() < p {
            0.0
        } else {
            a.read_at(a_idx.at(i)) * scale
        };
        store(res, res_idx.at(i), value, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_dropout_deterministic() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_fn(&ctx, &[8, 8], |idx| (idx[0] * 8 + idx[1] + 1) as f32)?;
        let mut first = Tensor::zeros(&ctx, &[8, 8])?;
        let mut second = Tensor::zeros(&ctx, &[8, 8])?;
        dropout(&a, &mut first, 0.3, 42, WriteMode::Overwrite)?;
        dropout(&a, &mut second, 0.3, 42, WriteMode::Overwrite)?;
        assert_eq!(first.to_vec(), second.to_vec());
        Ok(())
    }

    #[test]
    fn test_dropout_rate() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_val(&ctx, &[10_000], 1.0)?;
        let mut res = Tensor::zeros(&ctx, &[10_000])?;
        dropout(&a, &mut res, 0.25, 3, WriteMode::Overwrite)?;
        let dropped = res.iter().filter(|&x| x == 0.0).count();
        assert!((2_000..3_000).contains(&dropped), "dropped {dropped}");
        let scale = 1.0 / 0.75_f32;
        assert!(res.iter().all(|x| x == 0.0 || x == scale));
        Ok(())
    }

    #[test]
    fn test_dropout_edges() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_val(&ctx, &[16], 2.0)?;
        let mut res = Tensor::zeros(&ctx, &[16])?;

        dropout(&a, &mut res, 0.0, 1, WriteMode::Overwrite)?;
        assert_eq!(res.to_vec(), a.to_vec());

        dropout(&a, &mut res, 1.0, 1, WriteMode::Overwrite)?;
        assert_eq!(res.to_vec(), vec![0.0; 16]);

        assert!(matches!(
            dropout(&a, &mut res, 1.5, 1, WriteMode::Overwrite),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        assert!(matches!(
            dropout(&a, &mut res, f32::NAN, 1, WriteMode::Overwrite),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        Ok(())
    }
}

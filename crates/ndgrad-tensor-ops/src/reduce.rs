use ndgrad_tensor::{Tensor, TensorAllocator};

use crate::{error::TensorOpsError, kernel::Indexer};

/// Reductions available along an axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// Largest element.
    Max,
    /// Smallest element.
    Min,
    /// Sum of the elements.
    Sum,
    /// Arithmetic mean of the elements.
    Mean,
}

impl ReduceOp {
    /// Folds a non-empty sequence of values.
    fn fold(self, mut values: impl Iterator<Item = f32>) -> f32 {
        let Some(first) = values.next() else {
            return 0.0;
        };
        match self {
            // strict comparisons, so a NaN seed sticks as it does for argmax/argmin
            ReduceOp::Max => values.fold(first, |acc, x| if x > acc { x } else { acc }),
            ReduceOp::Min => values.fold(first, |acc, x| if x < acc { x } else { acc }),
            ReduceOp::Sum => values.fold(first, |acc, x| acc + x),
            ReduceOp::Mean => values
                .enumerate()
                .fold(first, |mean, (i, x)| mean + (x - mean) / (i + 2) as f32),
        }
    }
}

/// The position of an extreme element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgIndex {
    /// Linear index of the element.
    pub index: usize,
    /// Buffer offset of the same logical element in the gradient tensor.
    pub grad_offset: usize,
}

fn values<A: TensorAllocator>(src: &Tensor<A>) -> impl Iterator<Item = f32> + '_ {
    let idx = Indexer::new(src);
    (0..src.numel()).map(move |i| src.read_at(idx.at(i)))
}

/// Returns the largest element of the tensor.
pub fn max<A: TensorAllocator>(src: &Tensor<A>) -> f32 {
    ReduceOp::Max.fold(values(src))
}

/// Returns the smallest element of the tensor.
pub fn min<A: TensorAllocator>(src: &Tensor<A>) -> f32 {
    ReduceOp::Min.fold(values(src))
}

/// Returns the sum of the elements of the tensor.
pub fn sum<A: TensorAllocator>(src: &Tensor<A>) -> f32 {
    ReduceOp::Sum.fold(values(src))
}

/// Returns the mean of the elements of the tensor.
///
/// The mean is updated incrementally, so a constant tensor has exactly that
/// constant as its mean.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::reduce::mean;
///
/// let ctx = TensorContext::default();
/// let t = Tensor::from_shape_val(&ctx, &[1000], 0.1).unwrap();
/// assert_eq!(mean(&t), 0.1);
/// ```
pub fn mean<A: TensorAllocator>(src: &Tensor<A>) -> f32 {
    ReduceOp::Mean.fold(values(src))
}

fn write_single<A: TensorAllocator>(
    dest: &mut Tensor<A>,
    value: f32,
) -> Result<(), TensorOpsError> {
    if dest.numel() != 1 {
        return Err(TensorOpsError::mismatch(&[1], dest.shape()));
    }
    let offset = dest.offset();
    dest.write_at(offset, value);
    Ok(())
}

/// Writes the largest element of `src` into the single cell of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` has more than one element.
pub fn max_into<A: TensorAllocator>(
    src: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    write_single(dest, max(src))
}

/// Writes the smallest element of `src` into the single cell of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` has more than one element.
pub fn min_into<A: TensorAllocator>(
    src: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    write_single(dest, min(src))
}

/// Writes the sum of `src` into the single cell of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` has more than one element.
pub fn sum_into<A: TensorAllocator>(
    src: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    write_single(dest, sum(src))
}

/// Writes the mean of `src` into the single cell of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` has more than one element.
pub fn mean_into<A: TensorAllocator>(
    src: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    write_single(dest, mean(src))
}

/// Index of the first element preferred by `better` over every element before it.
fn arg_extreme(mut values: impl Iterator<Item = f32>, better: fn(f32, f32) -> bool) -> usize {
    let Some(mut best) = values.next() else {
        return 0;
    };
    let mut best_index = 0;
    for (i, x) in values.enumerate() {
        if better(x, best) {
            best = x;
            best_index = i + 1;
        }
    }
    best_index
}

/// Returns the linear index of the largest element.
///
/// Ties resolve to the first occurrence.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::reduce::argmax;
///
/// let ctx = TensorContext::default();
/// let t = Tensor::from_shape_vec(&ctx, &[4], vec![1.0, 7.0, 3.0, 7.0]).unwrap();
/// assert_eq!(argmax(&t), 1);
/// ```
pub fn argmax<A: TensorAllocator>(src: &Tensor<A>) -> usize {
    arg_extreme(values(src), |x, best| x > best)
}

/// Returns the linear index of the smallest element.
///
/// Ties resolve to the first occurrence.
pub fn argmin<A: TensorAllocator>(src: &Tensor<A>) -> usize {
    arg_extreme(values(src), |x, best| x < best)
}

fn with_grad<A: TensorAllocator>(
    src: &Tensor<A>,
    grad_src: &Tensor<A>,
    index: usize,
) -> Result<ArgIndex, TensorOpsError> {
    if grad_src.numel() != src.numel() {
        return Err(TensorOpsError::mismatch(src.shape(), grad_src.shape()));
    }
    Ok(ArgIndex {
        index,
        grad_offset: grad_src.physical_offset(index),
    })
}

/// Locates the largest element of `src` and the matching buffer offset in `grad_src`.
///
/// Used to route a gradient back to the element selected by a max reduction.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the tensors differ in element count.
pub fn argmax_with_grad<A: TensorAllocator>(
    src: &Tensor<A>,
    grad_src: &Tensor<A>,
) -> Result<ArgIndex, TensorOpsError> {
    with_grad(src, grad_src, argmax(src))
}

/// Locates the smallest element of `src` and the matching buffer offset in `grad_src`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the tensors differ in element count.
pub fn argmin_with_grad<A: TensorAllocator>(
    src: &Tensor<A>,
    grad_src: &Tensor<A>,
) -> Result<ArgIndex, TensorOpsError> {
    with_grad(src, grad_src, argmin(src))
}

/// Visits the lanes of `src` along `axis`: one iterator of values per output cell.
fn for_each_lane<A, F>(src: &Tensor<A>, axis: usize, mut f: F) -> Result<Vec<usize>, TensorOpsError>
where
    A: TensorAllocator,
    F: FnMut(&mut dyn Iterator<Item = f32>),
{
    if axis >= src.rank() {
        return Err(TensorOpsError::DimOutOfBounds(axis, src.rank() - 1));
    }
    let mut out_shape = src.shape().to_vec();
    out_shape[axis] = 1;

    let len = src.shape()[axis];
    let step = src.strides()[axis];
    let cells: usize = out_shape.iter().product();
    for i in 0..cells {
        let base =
            ndgrad_tensor::layout::physical_offset(&out_shape, src.strides(), src.offset(), i);
        let mut lane = (0..len).map(|k| src.read_at(base + k * step));
        f(&mut lane);
    }
    Ok(out_shape)
}

/// Reduces `src` along `axis`, keeping the axis with size 1.
///
/// The result is a new tensor allocated in the context of `src`.
///
/// # Errors
///
/// Returns [`TensorOpsError::DimOutOfBounds`] if `axis` is not smaller than the rank.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::reduce::{reduce_axis, ReduceOp};
///
/// let ctx = TensorContext::default();
/// let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// let rows = reduce_axis(&t, 1, ReduceOp::Sum).unwrap();
/// assert_eq!(rows.shape(), &[2, 1]);
/// assert_eq!(rows.to_vec(), vec![6.0, 15.0]);
/// ```
pub fn reduce_axis<A: TensorAllocator>(
    src: &Tensor<A>,
    axis: usize,
    op: ReduceOp,
) -> Result<Tensor<A>, TensorOpsError> {
    let mut out = Vec::new();
    let shape = for_each_lane(src, axis, |lane| out.push(op.fold(lane)))?;
    Ok(Tensor::from_shape_vec(src.context(), &shape, out)?)
}

/// Returns, for every lane along `axis`, the position of its largest element.
///
/// Lanes are listed in row-major order of the reduced shape.
///
/// # Errors
///
/// Returns [`TensorOpsError::DimOutOfBounds`] if `axis` is not smaller than the rank.
pub fn argmax_axis<A: TensorAllocator>(
    src: &Tensor<A>,
    axis: usize,
) -> Result<Vec<usize>, TensorOpsError> {
    let mut out = Vec::new();
    for_each_lane(src, axis, |lane| out.push(arg_extreme(lane, |x, best| x > best)))?;
    Ok(out)
}

/// Returns, for every lane along `axis`, the position of its smallest element.
///
/// # Errors
///
/// Returns [`TensorOpsError::DimOutOfBounds`] if `axis` is not smaller than the rank.
pub fn argmin_axis<A: TensorAllocator>(
    src: &Tensor<A>,
    axis: usize,
) -> Result<Vec<usize>, TensorOpsError> {
    let mut out = Vec::new();
    for_each_lane(src, axis, |lane| out.push(arg_extreme(lane, |x, best| x < best)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_full_reductions() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![3.0, -1.0, 4.0, 1.0, -5.0, 9.0])?;
        assert_eq!(max(&t), 9.0);
        assert_eq!(min(&t), -5.0);
        assert_eq!(sum(&t), 11.0);
        assert_relative_eq!(mean(&t), 11.0 / 6.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_max_of_negative_values() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[3], vec![-3.0, -2.0, -7.0])?;
        assert_eq!(max(&t), -2.0);
        assert_eq!(argmax(&t), 1);
        Ok(())
    }

    #[test]
    fn test_extremes_agree_with_arg_positions_on_nan() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        for data in [
            vec![f32::NAN, 1.0, 2.0],
            vec![1.0, f32::NAN, 2.0],
            vec![3.0, 1.0, f32::NAN],
        ] {
            let t = Tensor::from_shape_vec(&ctx, &[3], data)?;
            let hi = t.get_item(argmax(&t))?;
            let lo = t.get_item(argmin(&t))?;
            assert_eq!(hi.to_bits(), max(&t).to_bits());
            assert_eq!(lo.to_bits(), min(&t).to_bits());
        }
        Ok(())
    }

    #[test]
    fn test_mean_is_exact_for_constants() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        for value in [0.1_f32, 3.7, -12.25, 1e6] {
            let t = Tensor::from_shape_val(&ctx, &[7, 13], value)?;
            assert_eq!(mean(&t), value);
        }
        Ok(())
    }

    #[test]
    fn test_into_requires_single_cell() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[4], vec![1.0, 2.0, 3.0, 4.0])?;
        let mut cell = Tensor::zeros(&ctx, &[1, 1])?;
        sum_into(&t, &mut cell)?;
        assert_eq!(cell.to_vec(), vec![10.0]);
        max_into(&t, &mut cell)?;
        assert_eq!(cell.to_vec(), vec![4.0]);
        min_into(&t, &mut cell)?;
        assert_eq!(cell.to_vec(), vec![1.0]);
        mean_into(&t, &mut cell)?;
        assert_eq!(cell.to_vec(), vec![2.5]);

        let mut wide = Tensor::zeros(&ctx, &[2])?;
        assert_eq!(
            sum_into(&t, &mut wide),
            Err(TensorOpsError::ShapeMismatch(vec![1], vec![2]))
        );
        Ok(())
    }

    #[test]
    fn test_argmin_first_occurrence() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[5], vec![2.0, 0.0, 1.0, 0.0, 2.0])?;
        assert_eq!(argmin(&t), 1);
        assert_eq!(argmax(&t), 0);
        Ok(())
    }

    #[test]
    fn test_arg_with_grad() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let src = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 9.0, 3.0])?;
        let grad_base = Tensor::zeros(&ctx, &[2, 2])?;
        let grad = grad_base.permute_axes(&[1, 0])?;

        let found = argmax_with_grad(&src, &grad)?;
        assert_eq!(found, ArgIndex { index: 2, grad_offset: 1 });

        let found = argmin_with_grad(&src, &grad_base)?;
        assert_eq!(found, ArgIndex { index: 0, grad_offset: 0 });

        let wrong = Tensor::zeros(&ctx, &[3])?;
        assert!(argmax_with_grad(&src, &wrong).is_err());
        Ok(())
    }

    #[test]
    fn test_reduce_axis() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 5.0, 3.0, 4.0, 2.0, 6.0])?;

        let cols = reduce_axis(&t, 0, ReduceOp::Max)?;
        assert_eq!(cols.shape(), &[1, 3]);
        assert_eq!(cols.to_vec(), vec![4.0, 5.0, 6.0]);

        let rows = reduce_axis(&t, 1, ReduceOp::Mean)?;
        assert_eq!(rows.to_vec(), vec![3.0, 4.0]);

        let rows = reduce_axis(&t, 1, ReduceOp::Min)?;
        assert_eq!(rows.to_vec(), vec![1.0, 2.0]);

        assert_eq!(argmax_axis(&t, 1)?, vec![1, 2]);
        assert_eq!(argmin_axis(&t, 0)?, vec![0, 1, 0]);

        let res = reduce_axis(&t, 2, ReduceOp::Sum);
        assert!(res.is_err_and(|e| e == TensorOpsError::DimOutOfBounds(2, 1)));
        Ok(())
    }

    #[test]
    fn test_reduce_axis_strided() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let tr = t.permute_axes(&[1, 0])?;
        let sums = reduce_axis(&tr, 1, ReduceOp::Sum)?;
        assert_eq!(sums.shape(), &[3, 1]);
        assert_eq!(sums.to_vec(), vec![5.0, 7.0, 9.0]);
        Ok(())
    }
}

//! Reductions that undo broadcasting.
//!
//! Broadcasting `x` of shape `[2, 9]` against `y` of shape `[5, 2, 9]` repeats `x`
//! five times. The gradient flowing back into `x` is the sum over those five copies;
//! the kernels of this module compute such sums. `a` always has the broadcast shape
//! and `dest` the shape of the operand before broadcasting.

use ndgrad_tensor::{layout, Tensor, TensorAllocator};

use crate::{
    broadcast::BinaryOp,
    error::TensorOpsError,
    kernel::{store, Indexer, WriteMode},
    unary::UnaryOp,
};

/// How the positions of `a` map onto the cells of `dest`.
struct Projection {
    /// Strides of the source over the shape of `dest`; 0 on collapsed axes.
    kept_strides: Vec<usize>,
    /// Sizes of the axes summed over, in source axis order.
    reduced_shape: Vec<usize>,
    /// Strides of the source along the summed axes.
    reduced_strides: Vec<usize>,
}

impl Projection {
    /// Splits the axes of a source laid out over `source_shape` with `strides`.
    fn new(source_shape: &[usize], strides: &[usize], dest_shape: &[usize]) -> Self {
        let lead = source_shape.len() - dest_shape.len();
        let mut kept_strides = vec![0; dest_shape.len()];
        let mut reduced_shape = Vec::new();
        let mut reduced_strides = Vec::new();

        for axis in 0..lead {
            reduced_shape.push(source_shape[axis]);
            reduced_strides.push(strides[axis]);
        }
        for (d, &dim) in dest_shape.iter().enumerate() {
            let axis = lead + d;
            if dim == source_shape[axis] {
                kept_strides[d] = strides[axis];
            } else {
                reduced_shape.push(source_shape[axis]);
                reduced_strides.push(strides[axis]);
            }
        }

        Self {
            kept_strides,
            reduced_shape,
            reduced_strides,
        }
    }

    fn reduced_count(&self) -> usize {
        self.reduced_shape.iter().product()
    }

    #[inline]
    fn base(&self, dest_shape: &[usize], offset: usize, dest_index: usize) -> usize {
        layout::physical_offset(dest_shape, &self.kept_strides, offset, dest_index)
    }

    #[inline]
    fn at(&self, base: usize, reduced_index: usize) -> usize {
        layout::physical_offset(&self.reduced_shape, &self.reduced_strides, base, reduced_index)
    }
}

/// Checks that `dest` is a pre-broadcast shape of `shape`.
fn check_debroadcast(shape: &[usize], dest: &[usize]) -> Result<(), TensorOpsError> {
    if dest.len() > shape.len() {
        return Err(TensorOpsError::mismatch(shape, dest));
    }
    let lead = shape.len() - dest.len();
    let compatible = dest
        .iter()
        .zip(&shape[lead..])
        .all(|(&d, &s)| d == s || d == 1);
    if !compatible {
        return Err(TensorOpsError::mismatch(shape, dest));
    }
    Ok(())
}

/// Sums `f(a, b)` over every position of `a` that maps onto each cell of `dest`.
fn reduce_into<A, F>(
    a: &Tensor<A>,
    b: Option<&Tensor<A>>,
    dest: &mut Tensor<A>,
    mode: WriteMode,
    f: F,
) -> Result<(), TensorOpsError>
where
    A: TensorAllocator,
    F: Fn(f32, f32) -> f32,
{
    check_debroadcast(a.shape(), dest.shape())?;

    let a_proj = Projection::new(a.shape(), a.strides(), dest.shape());
    let b_proj = match b {
        Some(b) => {
            let strides = layout::broadcast_strides(b.shape(), b.strides(), a.shape())
                .map_err(|_| TensorOpsError::mismatch(a.shape(), b.shape()))?;
            Some((b, Projection::new(a.shape(), &strides, dest.shape())))
        }
        None => None,
    };

    let dest_shape = dest.shape().to_vec();
    let dest_idx = Indexer::new(dest);
    let count = a_proj.reduced_count();

    for i in 0..dest.numel() {
        let a_base = a_proj.base(&dest_shape, a.offset(), i);
        let b_base = b_proj
            .as_ref()
            .map(|(b, proj)| proj.base(&dest_shape, b.offset(), i));

        let mut sum = 0.0;
        for j in 0..count {
            let x = a.read_at(a_proj.at(a_base, j));
            let y = match (&b_proj, b_base) {
                (Some((b, proj)), Some(base)) => b.read_at(proj.at(base, j)),
                _ => 0.0,
            };
            sum += f(x, y);
        }
        store(dest, dest_idx.at(i), sum, mode);
    }
    Ok(())
}

/// Sums `op(a, b)` back onto the pre-broadcast shape of `dest`.
///
/// `a` has the broadcast shape; `b` is a partner tensor broadcastable to it. Axes that
/// `dest` lacks, and axes where `dest` has size 1 but `a` does not, are summed over.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` has more axes than `a`, if a
/// trailing axis of `dest` is neither 1 nor equal to that of `a`, or if `b` does not
/// broadcast to `a`.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{broadcast::BinaryOp, debroadcast::debroadcast, WriteMode};
///
/// let ctx = TensorContext::default();
/// let grad = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// let b = Tensor::from_shape_vec(&ctx, &[3], vec![1.0, 1.0, 1.0]).unwrap();
/// let mut dest = Tensor::zeros(&ctx, &[3]).unwrap();
/// debroadcast(&grad, &b, &mut dest, BinaryOp::Mul, WriteMode::Overwrite).unwrap();
/// assert_eq!(dest.to_vec(), vec![5.0, 7.0, 9.0]);
/// ```
pub fn debroadcast<A: TensorAllocator>(
    a: &Tensor<A>,
    b: &Tensor<A>,
    dest: &mut Tensor<A>,
    op: BinaryOp,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    reduce_into(a, Some(b), dest, mode, |x, y| op.apply(x, y))
}

/// Sums `a` back onto the pre-broadcast shape of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` is not a pre-broadcast shape of `a`.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::debroadcast::sum_reduce_broadcast;
///
/// let ctx = TensorContext::default();
/// let grad = Tensor::from_shape_val(&ctx, &[5, 2, 9], 1.0).unwrap();
/// let mut dest = Tensor::zeros(&ctx, &[2, 9]).unwrap();
/// sum_reduce_broadcast(&grad, &mut dest).unwrap();
/// assert!(dest.iter().all(|x| x == 5.0));
/// ```
pub fn sum_reduce_broadcast<A: TensorAllocator>(
    a: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    reduce_into(a, None, dest, WriteMode::Overwrite, |x, _| x)
}

/// Accumulating counterpart of [`sum_reduce_broadcast`].
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` is not a pre-broadcast shape of `a`.
pub fn sum_reduce_broadcast_acc<A: TensorAllocator>(
    a: &Tensor<A>,
    dest: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    reduce_into(a, None, dest, WriteMode::Accumulate, |x, _| x)
}

/// Sums `op(a)` back onto the pre-broadcast shape of `dest`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `dest` is not a pre-broadcast shape of `a`.
pub fn debroadcast_unary<A: TensorAllocator>(
    a: &Tensor<A>,
    dest: &mut Tensor<A>,
    op: UnaryOp,
    param: f32,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    reduce_into(a, None, dest, mode, |x, _| op.eval(x, param))
}

macro_rules! debroadcast_wrappers {
    ($($name:ident, $acc:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Debroadcasting `", stringify!($op), "` that overwrites `dest`.")]
            ///
            /// # Errors
            ///
            /// Returns an error if `dest` is not a pre-broadcast shape of `a`.
            pub fn $name<A: TensorAllocator>(
                a: &Tensor<A>,
                b: &Tensor<A>,
                dest: &mut Tensor<A>,
            ) -> Result<(), TensorOpsError> {
                debroadcast(a, b, dest, BinaryOp::$op, WriteMode::Overwrite)
            }

            #[doc = concat!("Debroadcasting `", stringify!($op), "` that accumulates into `dest`.")]
            ///
            /// # Errors
            ///
            /// Returns an error if `dest` is not a pre-broadcast shape of `a`.
            pub fn $acc<A: TensorAllocator>(
                a: &Tensor<A>,
                b: &Tensor<A>,
                dest: &mut Tensor<A>,
            ) -> Result<(), TensorOpsError> {
                debroadcast(a, b, dest, BinaryOp::$op, WriteMode::Accumulate)
            }
        )*
    };
}

debroadcast_wrappers! {
    add_debroadcast, add_debroadcast_acc => Add;
    sub_debroadcast, sub_debroadcast_acc => Sub;
    mul_debroadcast, mul_debroadcast_acc => Mul;
    div_debroadcast, div_debroadcast_acc => Div;
    pow_debroadcast, pow_debroadcast_acc => Pow;
}

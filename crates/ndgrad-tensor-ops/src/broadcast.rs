use ndgrad_tensor::{layout, Tensor, TensorAllocator};

use crate::{
    error::TensorOpsError,
    kernel::{map_into, store, Indexer, WriteMode},
};

/// Elementwise binary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `a` raised to the power `b`
    Pow,
}

impl BinaryOp {
    /// Applies the operation to a pair of values.
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }
}

/// Computes the shape two operands broadcast to.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the shapes are not compatible.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorOpsError> {
    layout::broadcast_shape(a, b).map_err(|_| TensorOpsError::mismatch(a, b))
}

/// Combines `a` and `b` elementwise into `res`, broadcasting the operands.
///
/// The shape of `res` must be the broadcast shape of the operands. Operands of a
/// lower rank are aligned on their trailing axes and repeated along padding axes
/// and along axes of size 1.
///
/// # Arguments
///
/// * `a` - The left operand.
/// * `b` - The right operand.
/// * `res` - The destination tensor.
/// * `op` - The operation to apply.
/// * `mode` - Whether to overwrite or accumulate into `res`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the operands do not broadcast to the
/// shape of `res`.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{broadcast::{binary, BinaryOp}, WriteMode};
///
/// let ctx = TensorContext::default();
/// let a = Tensor::from_shape_vec(&ctx, &[2, 1], vec![1.0, 2.0]).unwrap();
/// let b = Tensor::from_shape_vec(&ctx, &[3], vec![10.0, 20.0, 30.0]).unwrap();
/// let mut res = Tensor::zeros(&ctx, &[2, 3]).unwrap();
/// binary(&a, &b, &mut res, BinaryOp::Add, WriteMode::Overwrite).unwrap();
/// assert_eq!(res.to_vec(), vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
/// ```
pub fn binary<A: TensorAllocator>(
    a: &Tensor<A>,
    b: &Tensor<A>,
    res: &mut Tensor<A>,
    op: BinaryOp,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    if shape != res.shape() {
        return Err(TensorOpsError::mismatch(&shape, res.shape()));
    }

    // one operand is a single value: read it once
    if b.numel() == 1 && a.shape() == res.shape() {
        let rhs = b.read_at(b.offset());
        return map_into(a, res, mode, |x| op.apply(x, rhs));
    }
    if a.numel() == 1 && b.shape() == res.shape() {
        let lhs = a.read_at(a.offset());
        return map_into(b, res, mode, |y| op.apply(lhs, y));
    }

    let a_idx = Indexer::broadcast(a, res.shape())?;
    let b_idx = Indexer::broadcast(b, res.shape())?;
    let res_idx = Indexer::new(res);
    for i in 0..res.numel() {
        let value = op.apply(a.read_at(a_idx.at(i)), b.read_at(b_idx.at(i)));
        store(res, res_idx.at(i), value, mode);
    }
    Ok(())
}

/// Combines every element of `a` with a constant into `res`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `res` and `a` differ in shape.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{broadcast::{scalar, BinaryOp}, WriteMode};
///
/// let ctx = TensorContext::default();
/// let a = Tensor::from_shape_vec(&ctx, &[3], vec![1.0, 2.0, 3.0]).unwrap();
/// let mut res = Tensor::zeros(&ctx, &[3]).unwrap();
/// scalar(&a, 2.0, &mut res, BinaryOp::Pow, WriteMode::Overwrite).unwrap();
/// assert_eq!(res.to_vec(), vec![1.0, 4.0, 9.0]);
/// ```
pub fn scalar<A: TensorAllocator>(
    a: &Tensor<A>,
    value: f32,
    res: &mut Tensor<A>,
    op: BinaryOp,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    if a.shape() != res.shape() {
        return Err(TensorOpsError::mismatch(a.shape(), res.shape()));
    }
    map_into(a, res, mode, |x| op.apply(x, value))
}

macro_rules! binary_wrappers {
    ($($name:ident, $acc:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Broadcasting `", stringify!($name), "` that overwrites `res`.")]
            ///
            /// # Errors
            ///
            /// Returns an error if the operands do not broadcast to the shape of `res`.
            pub fn $name<A: TensorAllocator>(
                a: &Tensor<A>,
                b: &Tensor<A>,
                res: &mut Tensor<A>,
            ) -> Result<(), TensorOpsError> {
                binary(a, b, res, BinaryOp::$op, WriteMode::Overwrite)
            }

            #[doc = concat!("Broadcasting `", stringify!($name), "` that accumulates into `res`.")]
            ///
            /// # Errors
            ///
            /// Returns an error if the operands do not broadcast to the shape of `res`.
            pub fn $acc<A: TensorAllocator>(
                a: &Tensor<A>,
                b: &Tensor<A>,
                res: &mut Tensor<A>,
            ) -> Result<(), TensorOpsError> {
                binary(a, b, res, BinaryOp::$op, WriteMode::Accumulate)
            }
        )*
    };
}

binary_wrappers! {
    add, add_acc => Add;
    sub, sub_acc => Sub;
    mul, mul_acc => Mul;
    div, div_acc => Div;
    pow, pow_acc => Pow;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_add_same_shape() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![5.0, 6.0, 7.0, 8.0])?;
        let mut res = Tensor::zeros(&ctx, &[2, 2])?;
        add(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![6.0, 8.0, 10.0, 12.0]);

        add_acc(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![12.0, 16.0, 20.0, 24.0]);
        Ok(())
    }

    #[test]
    fn test_broadcast_shape_law() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_fn(&ctx, &[5, 1, 9], |idx| (idx[0] * 9 + idx[2]) as f32)?;
        let b = Tensor::from_shape_fn(&ctx, &[2, 9], |idx| (idx[0] * 100) as f32)?;
        let mut res = Tensor::zeros(&ctx, &broadcast_shape(a.shape(), b.shape())?)?;
        assert_eq!(res.shape(), &[5, 2, 9]);

        add(&a, &b, &mut res)?;
        for i in 0..5 {
            for j in 0..2 {
                for k in 0..9 {
                    let expected = (i * 9 + k) as f32 + (j * 100) as f32;
                    assert_eq!(res.get(&[i, j, k]), Some(expected));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_binary_ops() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[3], vec![2.0, 4.0, 9.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[3], vec![2.0, 0.5, 0.5])?;
        let mut res = Tensor::zeros(&ctx, &[3])?;

        sub(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![0.0, 3.5, 8.5]);
        mul(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![4.0, 2.0, 4.5]);
        div(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![1.0, 8.0, 18.0]);
        pow(&a, &b, &mut res)?;
        assert_relative_eq!(res.get_item(0)?, 4.0);
        assert_relative_eq!(res.get_item(1)?, 2.0);
        assert_relative_eq!(res.get_item(2)?, 3.0);
        Ok(())
    }

    #[test]
    fn test_binary_rejects_incompatible() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::zeros(&ctx, &[3])?;
        let b = Tensor::zeros(&ctx, &[4])?;
        let mut res = Tensor::zeros(&ctx, &[3])?;
        assert_eq!(
            add(&a, &b, &mut res),
            Err(TensorOpsError::ShapeMismatch(vec![3], vec![4]))
        );

        let c = Tensor::zeros(&ctx, &[2, 3])?;
        assert_eq!(
            add(&a, &c, &mut res),
            Err(TensorOpsError::ShapeMismatch(vec![2, 3], vec![3]))
        );
        Ok(())
    }

    #[test]
    fn test_binary_strided_operands() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let base = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let tr = base.permute_axes(&[1, 0])?;
        let col = Tensor::from_shape_vec(&ctx, &[3, 1], vec![100.0, 200.0, 300.0])?;
        let mut res = Tensor::zeros(&ctx, &[3, 2])?;
        add(&tr, &col, &mut res)?;
        assert_eq!(res.to_vec(), vec![101.0, 104.0, 202.0, 205.0, 303.0, 306.0]);
        Ok(())
    }

    #[test]
    fn test_scalar_operand_left() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::scalar(&ctx, 1.0)?;
        let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 4.0, 8.0])?;
        let mut res = Tensor::zeros(&ctx, &[2, 2])?;
        div(&a, &b, &mut res)?;
        assert_eq!(res.to_vec(), vec![1.0, 0.5, 0.25, 0.125]);
        Ok(())
    }

    #[test]
    fn test_scalar_parameter() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2], vec![1.0, 2.0])?;
        let mut res = Tensor::from_shape_vec(&ctx, &[2], vec![1.0, 1.0])?;
        scalar(&a, 3.0, &mut res, BinaryOp::Mul, WriteMode::Accumulate)?;
        assert_eq!(res.to_vec(), vec![4.0, 7.0]);

        let mut wrong = Tensor::zeros(&ctx, &[3])?;
        assert!(scalar(&a, 3.0, &mut wrong, BinaryOp::Mul, WriteMode::Overwrite).is_err());
        Ok(())
    }
}

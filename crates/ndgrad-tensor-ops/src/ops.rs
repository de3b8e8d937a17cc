use ndgrad_tensor::{Tensor, TensorAllocator};

use crate::{
    broadcast::{binary, broadcast_shape, BinaryOp},
    debroadcast::sum_reduce_broadcast,
    error::TensorOpsError,
    kernel::WriteMode,
    linalg, reduce,
    unary::{unary, UnaryOp},
};

/// Allocating tensor operations.
///
/// Each method computes the shape of its result, allocates it in the context of
/// `self` and runs the matching kernel.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{TensorOps, UnaryOp};
///
/// let ctx = TensorContext::default();
/// let x = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let w = Tensor::from_shape_vec(&ctx, &[2], vec![0.5, -1.0]).unwrap();
/// let y = x.mul(&w).unwrap().map_unary(UnaryOp::Relu, 0.0).unwrap();
/// assert_eq!(y.to_vec(), vec![0.5, 0.0, 1.5, 0.0]);
/// assert_eq!(y.sum_to(&[2]).unwrap().to_vec(), vec![2.0, 0.0]);
/// ```
pub trait TensorOps: Sized {
    /// Broadcasting elementwise sum.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not broadcast.
    fn add(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Broadcasting elementwise difference.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not broadcast.
    fn sub(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Broadcasting elementwise product.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not broadcast.
    fn mul(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Broadcasting elementwise quotient.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not broadcast.
    fn div(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Broadcasting elementwise power.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not broadcast.
    fn pow(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Applies a unary operation to every element.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be allocated.
    fn map_unary(&self, op: UnaryOp, param: f32) -> Result<Self, TensorOpsError>;

    /// Batched matrix product.
    ///
    /// # Errors
    ///
    /// Returns an error if the operands are not compatible.
    fn matmul(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Product of every row vector of `self` with every matrix of `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operands are not compatible.
    fn dot(&self, other: &Self) -> Result<Self, TensorOpsError>;

    /// Sums the gradient of a broadcast result back onto `shape`.
    ///
    /// # Errors
    ///
    /// Returns an error if `shape` is not a pre-broadcast shape of `self`.
    fn sum_to(&self, shape: &[usize]) -> Result<Self, TensorOpsError>;

    /// Sum of all elements.
    fn sum(&self) -> f32;

    /// Mean of all elements.
    fn mean(&self) -> f32;

    /// Largest element.
    fn max(&self) -> f32;

    /// Smallest element.
    fn min(&self) -> f32;

    /// Linear index of the largest element, first occurrence on ties.
    fn argmax(&self) -> usize;

    /// Linear index of the smallest element, first occurrence on ties.
    fn argmin(&self) -> usize;
}

fn binary_alloc<A: TensorAllocator>(
    a: &Tensor<A>,
    b: &Tensor<A>,
    op: BinaryOp,
) -> Result<Tensor<A>, TensorOpsError> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let mut res = Tensor::zeros(a.context(), &shape)?;
    binary(a, b, &mut res, op, WriteMode::Overwrite)?;
    Ok(res)
}

impl<A: TensorAllocator> TensorOps for Tensor<A> {
    fn add(&self, other: &Self) -> Result<Self, TensorOpsError> {
        binary_alloc(self, other, BinaryOp::Add)
    }

    fn sub(&self, other: &Self) -> Result<Self, TensorOpsError> {
        binary_alloc(self, other, BinaryOp::Sub)
    }

    fn mul(&self, other: &Self) -> Result<Self, TensorOpsError> {
        binary_alloc(self, other, BinaryOp::Mul)
    }

    fn div(&self, other: &Self) -> Result<Self, TensorOpsError> {
        binary_alloc(self, other, BinaryOp::Div)
    }

    fn pow(&self, other: &Self) -> Result<Self, TensorOpsError> {
        binary_alloc(self, other, BinaryOp::Pow)
    }

    fn map_unary(&self, op: UnaryOp, param: f32) -> Result<Self, TensorOpsError> {
        let mut res = Tensor::zeros(self.context(), self.shape())?;
        unary(self, &mut res, op, param, WriteMode::Overwrite)?;
        Ok(res)
    }

    fn matmul(&self, other: &Self) -> Result<Self, TensorOpsError> {
        let shape = linalg::matmul_shape(self.shape(), other.shape())?;
        let mut res = Tensor::zeros(self.context(), &shape)?;
        linalg::matmul(self, other, &mut res)?;
        Ok(res)
    }

    fn dot(&self, other: &Self) -> Result<Self, TensorOpsError> {
        let shape = linalg::dot_shape(self.shape(), other.shape())?;
        let mut res = Tensor::zeros(self.context(), &shape)?;
        linalg::dot(self, other, &mut res)?;
        Ok(res)
    }

    fn sum_to(&self, shape: &[usize]) -> Result<Self, TensorOpsError> {
        let mut res = Tensor::zeros(self.context(), shape)?;
        sum_reduce_broadcast(self, &mut res)?;
        Ok(res)
    }

    fn sum(&self) -> f32 {
        reduce::sum(self)
    }

    fn mean(&self) -> f32 {
        reduce::mean(self)
    }

    fn max(&self) -> f32 {
        reduce::max(self)
    }

    fn min(&self) -> f32 {
        reduce::min(self)
    }

    fn argmax(&self) -> usize {
        reduce::argmax(self)
    }

    fn argmin(&self) -> usize {
        reduce::argmin(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_results_live_in_operand_context() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 1], vec![1.0, 2.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[3], vec![1.0, 2.0, 3.0])?;
        let c = a.add(&b)?;
        assert_eq!(c.shape(), &[2, 3]);
        assert!(c.context().same_scope(&ctx));
        assert_eq!(ctx.live_tensor_count(), 3);
        Ok(())
    }

    #[test]
    fn test_matmul_and_dot() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![5.0, 6.0, 7.0, 8.0])?;
        assert_eq!(a.matmul(&b)?.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
        // rows of `a` as vectors give the same product
        assert_eq!(a.dot(&b)?.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
        Ok(())
    }

    #[test]
    fn test_reductions() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let t = Tensor::from_shape_vec(&ctx, &[4], vec![2.0, 8.0, -1.0, 8.0])?;
        assert_eq!(t.sum(), 17.0);
        assert_eq!(t.mean(), 4.25);
        assert_eq!(t.max(), 8.0);
        assert_eq!(t.min(), -1.0);
        assert_eq!(t.argmax(), 1);
        assert_eq!(t.argmin(), 2);
        Ok(())
    }

    #[test]
    fn test_sub_div_pow() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2], vec![8.0, 9.0])?;
        let b = Tensor::scalar(&ctx, 2.0)?;
        assert_eq!(a.sub(&b)?.to_vec(), vec![6.0, 7.0]);
        assert_eq!(a.div(&b)?.to_vec(), vec![4.0, 4.5]);
        assert_eq!(a.pow(&b)?.to_vec(), vec![64.0, 81.0]);
        Ok(())
    }
}

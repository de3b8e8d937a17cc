use ndgrad_tensor::{layout, Tensor, TensorAllocator};

use crate::error::TensorOpsError;

/// Splits a shape into its batch axes and its trailing matrix.
fn split_matrix(shape: &[usize]) -> Result<(&[usize], usize, usize), TensorOpsError> {
    match shape {
        [batch @ .., rows, cols] => Ok((batch, *rows, *cols)),
        _ => Err(TensorOpsError::mismatch(&[1, 1], shape)),
    }
}

/// Computes the shape of the batched matrix product of `a` and `b`.
///
/// The trailing two axes are the matrices and the leading axes the batch. The batch
/// counts must agree unless one operand holds a single matrix, which is then
/// multiplied with every matrix of the other.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if an operand has fewer than two axes, if
/// the inner dimensions disagree, or if the batch counts are incompatible.
///
/// # Example
///
/// ```
/// use ndgrad_tensor_ops::linalg::matmul_shape;
///
/// assert_eq!(matmul_shape(&[4, 2, 3], &[3, 5]).unwrap(), vec![4, 2, 5]);
/// assert!(matmul_shape(&[2, 3], &[2, 3]).is_err());
/// ```
pub fn matmul_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorOpsError> {
    let (batch_a, rows, inner_a) = split_matrix(a)?;
    let (batch_b, inner_b, cols) = split_matrix(b)?;
    if inner_a != inner_b {
        return Err(TensorOpsError::mismatch(a, b));
    }
    let nmat_a: usize = batch_a.iter().product();
    let nmat_b: usize = batch_b.iter().product();
    let batch = if nmat_a == nmat_b {
        if batch_a.len() >= batch_b.len() {
            batch_a
        } else {
            batch_b
        }
    } else if nmat_b == 1 {
        batch_a
    } else if nmat_a == 1 {
        batch_b
    } else {
        return Err(TensorOpsError::mismatch(a, b));
    };
    let mut shape = batch.to_vec();
    shape.extend([rows, cols]);
    Ok(shape)
}

/// Buffer offset of matrix `m` of a batched tensor, or of its only matrix.
fn matrix_base<A: TensorAllocator>(t: &Tensor<A>, nmat: usize, m: usize) -> usize {
    let batch_rank = t.rank() - 2;
    let index = if nmat == 1 { 0 } else { m };
    layout::physical_offset(&t.shape()[..batch_rank], &t.strides()[..batch_rank], t.offset(), index)
}

/// Multiplies the matrices of `a` and `b` and adds the products into `result`.
///
/// The kernel accumulates, so `result` is expected to be zeroed by the caller for a
/// plain product. Every operand is read through its own strides, so transposed
/// views need no copy.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the operands are incompatible (see
/// [`matmul_shape`]) or if `result` does not hold `[rows_a, cols_b]` matrices for
/// every batch entry.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::linalg::matmul;
///
/// let ctx = TensorContext::default();
/// let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
/// let mut c = Tensor::zeros(&ctx, &[2, 2]).unwrap();
/// matmul(&a, &b, &mut c).unwrap();
/// assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
/// ```
pub fn matmul<A: TensorAllocator>(
    a: &Tensor<A>,
    b: &Tensor<A>,
    result: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    let expected = matmul_shape(a.shape(), b.shape())?;
    let (batch_r, rows_r, cols_r) = split_matrix(result.shape())?;
    let (expected_batch, rows, cols) = split_matrix(&expected)?;
    let nmat: usize = expected_batch.iter().product();
    if rows_r != rows || cols_r != cols || batch_r.iter().product::<usize>() != nmat {
        return Err(TensorOpsError::mismatch(&expected, result.shape()));
    }

    let inner = a.shape()[a.rank() - 1];
    let nmat_a: usize = a.shape()[..a.rank() - 2].iter().product();
    let nmat_b: usize = b.shape()[..b.rank() - 2].iter().product();
    let (sa_row, sa_col) = (a.strides()[a.rank() - 2], a.strides()[a.rank() - 1]);
    let (sb_row, sb_col) = (b.strides()[b.rank() - 2], b.strides()[b.rank() - 1]);
    let (sr_row, sr_col) = (
        result.strides()[result.rank() - 2],
        result.strides()[result.rank() - 1],
    );

    for m in 0..nmat {
        let a_base = matrix_base(a, nmat_a, m);
        let b_base = matrix_base(b, nmat_b, m);
        let r_base = matrix_base(result, nmat, m);
        for i in 0..rows {
            for j in 0..cols {
                let mut acc = 0.0;
                for k in 0..inner {
                    acc += a.read_at(a_base + i * sa_row + k * sa_col)
                        * b.read_at(b_base + k * sb_row + j * sb_col);
                }
                let offset = r_base + i * sr_row + j * sr_col;
                let current = result.read_at(offset);
                result.write_at(offset, current + acc);
            }
        }
    }
    Ok(())
}

/// Computes the shape of [`dot`] for the given operands.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `a` has no axes, `b` fewer than two,
/// or the trailing axis of `a` differs from the rows of `b`.
///
/// # Example
///
/// ```
/// use ndgrad_tensor_ops::linalg::dot_shape;
///
/// assert_eq!(dot_shape(&[4, 3], &[2, 3, 5]).unwrap(), vec![4, 2, 5]);
/// ```
pub fn dot_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorOpsError> {
    let (batch_b, inner_b, cols) = split_matrix(b)?;
    match a {
        [vectors @ .., inner_a] if *inner_a == inner_b => {
            let mut shape = vectors.to_vec();
            shape.extend_from_slice(batch_b);
            shape.push(cols);
            Ok(shape)
        }
        _ => Err(TensorOpsError::mismatch(a, b)),
    }
}

/// Multiplies every row vector of `a` with every matrix of `b`, adding into `result`.
///
/// The trailing axis of `a` holds the vectors and its leading axes enumerate them.
/// `result` has the shape given by [`dot_shape`]; like [`matmul`] the kernel
/// accumulates.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if the operands are incompatible or if
/// `result` has the wrong shape.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::linalg::dot;
///
/// let ctx = TensorContext::default();
/// let v = Tensor::from_shape_vec(&ctx, &[2], vec![1.0, 2.0]).unwrap();
/// let m = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let mut r = Tensor::zeros(&ctx, &[2]).unwrap();
/// dot(&v, &m, &mut r).unwrap();
/// assert_eq!(r.to_vec(), vec![7.0, 10.0]);
/// ```
pub fn dot<A: TensorAllocator>(
    a: &Tensor<A>,
    b: &Tensor<A>,
    result: &mut Tensor<A>,
) -> Result<(), TensorOpsError> {
    let expected = dot_shape(a.shape(), b.shape())?;
    if result.shape() != expected.as_slice() {
        return Err(TensorOpsError::mismatch(&expected, result.shape()));
    }

    let (vector_axes, inner) = (&a.shape()[..a.rank() - 1], a.shape()[a.rank() - 1]);
    let vector_strides = &a.strides()[..a.rank() - 1];
    let sa = a.strides()[a.rank() - 1];
    let nvec: usize = vector_axes.iter().product();
    let nmat: usize = b.shape()[..b.rank() - 2].iter().product();
    let cols = b.shape()[b.rank() - 1];
    let (sb_row, sb_col) = (b.strides()[b.rank() - 2], b.strides()[b.rank() - 1]);

    for v in 0..nvec {
        let a_base = layout::physical_offset(vector_axes, vector_strides, a.offset(), v);
        for m in 0..nmat {
            let b_base = matrix_base(b, nmat, m);
            for j in 0..cols {
                let mut acc = 0.0;
                for k in 0..inner {
                    acc += a.read_at(a_base + k * sa) * b.read_at(b_base + k * sb_row + j * sb_col);
                }
                let offset = result.physical_offset((v * nmat + m) * cols + j);
                let current = result.read_at(offset);
                result.write_at(offset, current + acc);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_matmul_shape() -> Result<(), TensorOpsError> {
        assert_eq!(matmul_shape(&[2, 3], &[3, 4])?, vec![2, 4]);
        assert_eq!(matmul_shape(&[3, 4], &[5, 4, 2])?, vec![5, 3, 2]);
        assert_eq!(matmul_shape(&[2, 3, 2, 2], &[6, 2, 2])?, vec![2, 3, 2, 2]);
        assert!(matmul_shape(&[3], &[3, 4]).is_err());
        assert!(matmul_shape(&[2, 2, 3], &[3, 3, 4]).is_err());
        Ok(())
    }

    #[test]
    fn test_matmul_accumulates() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![5.0, 6.0, 7.0, 8.0])?;
        let mut c = Tensor::from_shape_val(&ctx, &[2, 2], 1.0)?;
        matmul(&a, &b, &mut c)?;
        assert_eq!(c.to_vec(), vec![20.0, 23.0, 44.0, 51.0]);
        Ok(())
    }

    #[test]
    fn test_matmul_rectangular() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let b = Tensor::from_shape_vec(&ctx, &[3, 1], vec![1.0, 0.0, -1.0])?;
        let mut c = Tensor::zeros(&ctx, &[2, 1])?;
        matmul(&a, &b, &mut c)?;
        assert_eq!(c.to_vec(), vec![-2.0, -2.0]);
        Ok(())
    }

    #[test]
    fn test_matmul_transposed_view() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 3.0, 2.0, 4.0])?;
        let at = a.permute_axes(&[1, 0])?;
        let b = Tensor::from_shape_vec(&ctx, &[2, 2], vec![5.0, 6.0, 7.0, 8.0])?;
        let mut c = Tensor::zeros(&ctx, &[2, 2])?;
        matmul(&at, &b, &mut c)?;
        assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
        Ok(())
    }

    #[test]
    fn test_matmul_single_matrix_against_batch() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let b = Tensor::from_shape_fn(&ctx, &[3, 2, 2], |idx| {
            if idx[1] == idx[2] {
                (idx[0] + 1) as f32
            } else {
                0.0
            }
        })?;
        let mut c = Tensor::zeros(&ctx, &[3, 2, 2])?;
        matmul(&a, &b, &mut c)?;
        for m in 0..3 {
            let scale = (m + 1) as f32;
            let block = c.create_view(1, m * 4)?;
            assert_eq!(block.to_vec(), vec![scale, 2.0 * scale, 3.0 * scale, 4.0 * scale]);
        }
        Ok(())
    }

    #[test]
    fn test_matmul_rejects_result_shape() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::zeros(&ctx, &[2, 3])?;
        let b = Tensor::zeros(&ctx, &[3, 4])?;
        let mut c = Tensor::zeros(&ctx, &[2, 3])?;
        assert_eq!(
            matmul(&a, &b, &mut c),
            Err(TensorOpsError::ShapeMismatch(vec![2, 4], vec![2, 3]))
        );
        Ok(())
    }

    #[test]
    fn test_dot_every_vector_with_every_matrix() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 0.0, 0.0, 1.0])?;
        let b = Tensor::from_shape_vec(
            &ctx,
            &[2, 2, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )?;
        let mut r = Tensor::zeros(&ctx, &dot_shape(a.shape(), b.shape())?)?;
        assert_eq!(r.shape(), &[2, 2, 2]);
        dot(&a, &b, &mut r)?;
        // row i of every matrix, for the unit vectors e0 and e1
        assert_eq!(r.to_vec(), vec![1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0]);
        Ok(())
    }

    #[test]
    fn test_dot_rejects_inner_mismatch() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::zeros(&ctx, &[3])?;
        let b = Tensor::zeros(&ctx, &[2, 2])?;
        let mut r = Tensor::zeros(&ctx, &[2])?;
        assert!(dot(&a, &b, &mut r).is_err());
        Ok(())
    }
}

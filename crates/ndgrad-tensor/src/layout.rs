//! Coordinate arithmetic for strided tensors.
//!
//! These are pure functions over shapes and strides. Every view-safe element access
//! in the workspace ends up in [`physical_offset`].

use crate::tensor::TensorError;

/// Computes the strides for a row-major (C-contiguous) layout.
///
/// The rightmost dimension has stride 1 and each dimension's stride is the product of
/// all dimensions to its right.
///
/// # Examples
///
/// ```rust
/// use ndgrad_tensor::layout::row_major_strides;
///
/// assert_eq!(row_major_strides(&[2, 3]), vec![3, 1]);
/// assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
/// ```
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// Checks whether `strides` describe a contiguous row-major layout of `shape`.
///
/// Axes of size 1 are ignored since their stride is never used to step.
pub fn is_standard_layout(shape: &[usize], strides: &[usize]) -> bool {
    let mut expected_stride: usize = 1;
    for (&dim, &stride) in shape.iter().rev().zip(strides.iter().rev()) {
        if dim != 1 && stride != expected_stride {
            return false;
        }
        expected_stride = expected_stride.saturating_mul(dim);
    }
    true
}

/// Maps a linear (row-major logical) index to a physical buffer offset.
///
/// The index is decomposed against `shape` from the innermost axis outward and the
/// per-axis coordinates are weighted with `strides`.
///
/// # Examples
///
/// ```rust
/// use ndgrad_tensor::layout::physical_offset;
///
/// // the transpose of a 2x3 row-major matrix
/// assert_eq!(physical_offset(&[3, 2], &[1, 3], 0, 1), 3);
/// assert_eq!(physical_offset(&[3, 2], &[1, 3], 10, 2), 11);
/// ```
#[inline]
pub fn physical_offset(
    shape: &[usize],
    strides: &[usize],
    offset: usize,
    linear_index: usize,
) -> usize {
    let mut physical = offset;
    let mut remainder = linear_index;
    for dim in (0..shape.len()).rev() {
        let coord = remainder % shape[dim];
        remainder /= shape[dim];
        physical += coord * strides[dim];
    }
    physical
}

/// Decomposes a linear index into per-axis coordinates.
pub fn unravel_index(shape: &[usize], linear_index: usize) -> Vec<usize> {
    let mut coords = vec![0; shape.len()];
    let mut remainder = linear_index;
    for dim in (0..shape.len()).rev() {
        coords[dim] = remainder % shape[dim];
        remainder /= shape[dim];
    }
    coords
}

/// Returns the largest physical offset addressed by a layout.
///
/// Used to check that a view stays inside the buffer it aliases. Returns `None` if the
/// offset does not fit in a `usize`.
pub fn max_offset(shape: &[usize], strides: &[usize], offset: usize) -> Option<usize> {
    shape.iter().zip(strides).try_fold(offset, |acc, (&dim, &stride)| {
        dim.saturating_sub(1)
            .checked_mul(stride)
            .and_then(|step| acc.checked_add(step))
    })
}

/// Returns the number of elements of `shape`, or `None` if it overflows a `usize`.
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Computes the shape two operands broadcast to.
///
/// Shapes are aligned on their trailing axes; each aligned pair must be equal or
/// contain a 1. The result has the rank of the larger operand.
///
/// # Errors
///
/// Returns [`TensorError::ShapeMismatch`] if the shapes are not broadcast-compatible.
///
/// # Examples
///
/// ```rust
/// use ndgrad_tensor::layout::broadcast_shape;
///
/// assert_eq!(broadcast_shape(&[5, 1, 9], &[2, 9]).unwrap(), vec![5, 2, 9]);
/// assert!(broadcast_shape(&[3], &[4]).is_err());
/// ```
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorError> {
    let rank = a.len().max(b.len());
    let mut shape = vec![0; rank];
    for dim in 0..rank {
        let da = padded_dim(a, rank, dim);
        let db = padded_dim(b, rank, dim);
        shape[dim] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(TensorError::shape_mismatch(
                    "Shapes cannot be broadcast together",
                    a,
                    b,
                ))
            }
        };
    }
    Ok(shape)
}

/// Extends the strides of an operand to the rank of a broadcast target.
///
/// The returned vector has one entry per axis of `target`: 0 for the padding axes
/// the operand lacks, 0 for axes where the operand has size 1, and the operand's own
/// stride otherwise.
///
/// # Errors
///
/// Returns [`TensorError::ShapeMismatch`] if `shape` does not broadcast to `target`.
///
/// # Examples
///
/// ```rust
/// use ndgrad_tensor::layout::broadcast_strides;
///
/// let strides = broadcast_strides(&[2, 1], &[1, 1], &[3, 2, 4]).unwrap();
/// assert_eq!(strides, vec![0, 1, 0]);
/// ```
pub fn broadcast_strides(
    shape: &[usize],
    strides: &[usize],
    target: &[usize],
) -> Result<Vec<usize>, TensorError> {
    if shape.len() > target.len() {
        return Err(TensorError::shape_mismatch(
            "Operand has more axes than the broadcast target",
            target,
            shape,
        ));
    }
    let pad = target.len() - shape.len();
    let mut extended = vec![0; target.len()];
    for dim in pad..target.len() {
        let own = dim - pad;
        if shape[own] == 1 {
            continue;
        }
        if shape[own] != target[dim] {
            return Err(TensorError::shape_mismatch(
                "Operand does not broadcast to the target shape",
                target,
                shape,
            ));
        }
        extended[dim] = strides[own];
    }
    Ok(extended)
}

/// Dimension of `shape` at axis `dim` of a rank-`rank` target, 1 for padding axes.
#[inline]
fn padded_dim(shape: &[usize], rank: usize, dim: usize) -> usize {
    let pad = rank - shape.len();
    if dim < pad {
        1
    } else {
        shape[dim - pad]
    }
}

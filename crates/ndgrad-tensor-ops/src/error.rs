use ndgrad_tensor::TensorError;
use thiserror::Error;

/// An error type for tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorOpsError {
    /// The dimension to perform the operation over is greater than the number of dimensions of the tensor.
    #[error("Dimension out of bounds. The dimension {0} is out of bounds ({1}).")]
    DimOutOfBounds(usize, usize),

    /// Tensor error
    #[error("Error with the tensor: {0}")]
    TensorError(#[from] TensorError),

    /// Shape mismatch
    #[error("Shape mismatch: {0:?} != {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// A scalar parameter is outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No kernel is registered under the given name.
    #[error("Unknown operation: {0}")]
    UnknownOp(String),
}

impl TensorOpsError {
    /// Shape mismatch between two shapes, logged at debug level.
    pub(crate) fn mismatch(expected: &[usize], actual: &[usize]) -> Self {
        log::debug!("rejecting shapes {expected:?} and {actual:?}");
        Self::ShapeMismatch(expected.to_vec(), actual.to_vec())
    }
}

use crate::{
    allocator::TensorAllocator, context::TensorContext, layout::row_major_strides, Tensor,
    TensorError,
};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

impl<A> serde::Serialize for Tensor<A>
where
    A: TensorAllocator,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // views are written out in logical order with the strides of their clone
        let mut state = serializer.serialize_struct("Tensor", 3)?;
        state.serialize_field("data", &self.to_vec())?;
        state.serialize_field("shape", self.shape())?;
        state.serialize_field("strides", &row_major_strides(self.shape()))?;
        state.end()
    }
}

/// An owned, context-free copy of a tensor.
///
/// Tensors cannot be deserialized directly since they need a [`TensorContext`] to be
/// allocated in. Deserialize a snapshot and materialise it with
/// [`TensorSnapshot::into_tensor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorSnapshot {
    /// The elements in row-major order.
    pub data: Vec<f32>,
    /// The shape of the tensor.
    pub shape: Vec<usize>,
    /// Row-major strides of `shape`. Only validated on load.
    #[serde(default)]
    pub strides: Vec<usize>,
}

impl TensorSnapshot {
    /// Copies the logical contents of a tensor.
    pub fn from_tensor<A: TensorAllocator>(tensor: &Tensor<A>) -> Self {
        Self {
            data: tensor.to_vec(),
            shape: tensor.shape().to_vec(),
            strides: row_major_strides(tensor.shape()),
        }
    }

    /// Allocates a base tensor holding the snapshot in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the data does not fit the shape or the
    /// strides are not row-major.
    pub fn into_tensor<A: TensorAllocator>(
        self,
        ctx: &TensorContext<A>,
    ) -> Result<Tensor<A>, TensorError> {
        if !self.strides.is_empty() && self.strides != row_major_strides(&self.shape) {
            return Err(TensorError::shape_mismatch(
                "Serialized strides must be row-major",
                &row_major_strides(&self.shape),
                &self.strides,
            ));
        }
        Tensor::from_shape_vec(ctx, &self.shape, self.data)
    }
}

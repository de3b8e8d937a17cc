//! Shared traversal helpers for the elementwise kernels.

use ndgrad_tensor::{layout, Tensor, TensorAllocator};

use crate::error::TensorOpsError;

/// How a kernel combines its result with the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// `res = f`
    #[default]
    Overwrite,
    /// `res += f`, used to accumulate gradients.
    Accumulate,
}

impl WriteMode {
    /// Combines the current destination value with a freshly computed one.
    #[inline]
    pub fn combine(self, current: f32, value: f32) -> f32 {
        match self {
            WriteMode::Overwrite => value,
            WriteMode::Accumulate => current + value,
        }
    }
}

/// Writes `value` at a physical offset of `res` according to `mode`.
#[inline]
pub(crate) fn store<A: TensorAllocator>(
    res: &mut Tensor<A>,
    physical: usize,
    value: f32,
    mode: WriteMode,
) {
    let value = match mode {
        WriteMode::Overwrite => value,
        WriteMode::Accumulate => mode.combine(res.read_at(physical), value),
    };
    res.write_at(physical, value);
}

/// Owned copy of the layout of a tensor, mapping linear indices to buffer offsets.
///
/// Holding the metadata separately lets a kernel keep computing offsets of the
/// result tensor while it writes into it.
#[derive(Clone, Debug)]
pub(crate) struct Indexer {
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    contiguous: bool,
}

impl Indexer {
    pub(crate) fn new<A: TensorAllocator>(t: &Tensor<A>) -> Self {
        Self {
            shape: t.shape().to_vec(),
            strides: t.strides().to_vec(),
            offset: t.offset(),
            contiguous: t.is_standard_layout(),
        }
    }

    /// Layout of `t` read through the shape `target` it broadcasts to.
    pub(crate) fn broadcast<A: TensorAllocator>(
        t: &Tensor<A>,
        target: &[usize],
    ) -> Result<Self, TensorOpsError> {
        if t.shape() == target {
            return Ok(Self::new(t));
        }
        let strides = layout::broadcast_strides(t.shape(), t.strides(), target)
            .map_err(|_| TensorOpsError::mismatch(target, t.shape()))?;
        Ok(Self {
            shape: target.to_vec(),
            strides,
            offset: t.offset(),
            contiguous: false,
        })
    }

    #[inline]
    pub(crate) fn at(&self, linear_index: usize) -> usize {
        if self.contiguous {
            self.offset + linear_index
        } else {
            layout::physical_offset(&self.shape, &self.strides, self.offset, linear_index)
        }
    }
}

/// Applies `f` to every element of `src` and writes the results into `res`.
///
/// `src` is broadcast to the shape of `res`.
pub(crate) fn map_into<A, F>(
    src: &Tensor<A>,
    res: &mut Tensor<A>,
    mode: WriteMode,
    f: F,
) -> Result<(), TensorOpsError>
where
    A: TensorAllocator,
    F: Fn(f32) -> f32,
{
    let src_idx = Indexer::broadcast(src, res.shape())?;
    let res_idx = Indexer::new(res);
    for i in 0..res.numel() {
        let value = f(src.read_at(src_idx.at(i)));
        store(res, res_idx.at(i), value, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndgrad_tensor::{TensorContext, TensorError};

    #[test]
    fn test_write_mode() {
        assert_eq!(WriteMode::Overwrite.combine(2.0, 3.0), 3.0);
        assert_eq!(WriteMode::Accumulate.combine(2.0, 3.0), 5.0);
        assert_eq!(WriteMode::default(), WriteMode::Overwrite);
    }

    #[test]
    fn test_indexer_broadcast() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let row = Tensor::from_shape_vec(&ctx, &[3], vec![1.0, 2.0, 3.0])?;
        let idx = Indexer::broadcast(&row, &[2, 3])?;
        let offsets: Vec<usize> = (0..6).map(|i| idx.at(i)).collect();
        assert_eq!(offsets, vec![0, 1, 2, 0, 1, 2]);

        let res = Indexer::broadcast(&row, &[2, 4]);
        assert_eq!(res.unwrap_err(), TensorOpsError::ShapeMismatch(vec![2, 4], vec![3]));
        Ok(())
    }

    #[test]
    fn test_map_into_strided_result() -> Result<(), TensorError> {
        let ctx = TensorContext::default();
        let src = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let base = Tensor::zeros(&ctx, &[2, 2])?;
        let mut res = base.permute_axes(&[1, 0])?;
        map_into(&src, &mut res, WriteMode::Overwrite, |x| x * 10.0).unwrap();
        assert_eq!(base.to_vec(), vec![10.0, 30.0, 20.0, 40.0]);
        Ok(())
    }
}

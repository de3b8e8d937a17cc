use thiserror::Error;

use super::{
    allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError},
    context::TensorContext,
    layout::{
        checked_numel, is_standard_layout, max_offset, physical_offset, row_major_strides,
        unravel_index,
    },
    storage::TensorStorage,
};

/// Error type for tensor creation, view and access operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    /// The allocator could not provide a buffer.
    ///
    /// This is fatal to the call that triggered it. See [`TensorAllocatorError`]
    /// for details.
    #[error("Allocation error: {0}")]
    AllocationError(#[from] TensorAllocatorError),

    /// Shapes are incompatible for the requested operation.
    ///
    /// # Examples
    /// - Operands that cannot be broadcast together
    /// - Batch counts that disagree in a matrix product
    /// - A reshape whose element count differs from the source
    #[error("Shape mismatch: {message}. Expected shape: {expected}, got: {actual}")]
    ShapeMismatch {
        /// Human-readable description of the mismatch
        message: String,
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// An axis argument is not smaller than the rank of the tensor.
    #[error("Axis {axis} out of range for tensor of rank {rank}")]
    RankViolation {
        /// The requested axis
        axis: usize,
        /// The rank of the tensor
        rank: usize,
    },

    /// An element index or offset falls outside the addressable range.
    #[error("Index {index} out of range for size {size}")]
    IndexOutOfRange {
        /// The invalid index that was attempted
        index: usize,
        /// The size of the addressable range
        size: usize,
    },

    /// The operation is not available for this tensor configuration.
    #[error("Unsupported operation: {operation} - {reason}")]
    UnsupportedOperation {
        /// Name of the operation that failed
        operation: String,
        /// Reason why the operation is not supported
        reason: String,
    },
}

impl TensorError {
    /// Creates a ShapeMismatch error with formatted shapes.
    pub fn shape_mismatch(
        message: impl Into<String>,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Creates an IndexOutOfRange error.
    pub fn index_out_of_range(index: usize, size: usize) -> Self {
        Self::IndexOutOfRange { index, size }
    }

    /// Creates a RankViolation error.
    pub fn rank_violation(axis: usize, rank: usize) -> Self {
        Self::RankViolation { axis, rank }
    }

    /// Creates an UnsupportedOperation error with context.
    pub fn unsupported_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error comes from the allocator running out of memory.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::AllocationError(e) => e.is_out_of_memory(),
            _ => false,
        }
    }
}

/// Checks that a shape describes at least one element on every axis.
fn validate_shape(shape: &[usize]) -> Result<usize, TensorError> {
    if shape.is_empty() || shape.contains(&0) {
        return Err(TensorError::shape_mismatch(
            "Tensors need at least one axis and positive dimensions",
            &[1],
            shape,
        ));
    }
    checked_numel(shape).ok_or_else(|| {
        TensorError::shape_mismatch(
            "Element count does not fit in a usize",
            &[usize::MAX],
            shape,
        )
    })
}

/// Bytes attributed to a tensor of `rank` axes owning `owned` elements.
fn accounted_bytes<A: TensorAllocator>(rank: usize, owned: usize) -> usize {
    std::mem::size_of::<Tensor<A>>()
        + 2 * rank * std::mem::size_of::<usize>()
        + owned * std::mem::size_of::<f32>()
}

/// A strided, multi-dimensional `f32` array.
///
/// A tensor either created its buffer (a base tensor) or aliases the buffer of another
/// tensor (a view). Both kinds hold a reference-counted handle to the buffer, so a view
/// keeps the data alive even after its base has been dropped.
///
/// # Layout
///
/// `shape` lists the axis sizes, outermost first. `strides` gives, per axis, the step in
/// elements through the buffer, and `offset` the position of logical element 0. Base
/// tensors always have offset 0 and row-major strides.
///
/// # Examples
///
/// ```rust
/// use ndgrad_tensor::{Tensor, TensorContext};
///
/// let ctx = TensorContext::default();
/// let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.strides(), &[3, 1]);
///
/// // the second row, without copying
/// let row = t.create_view(1, 3).unwrap();
/// assert_eq!(row.to_vec(), vec![4.0, 5.0, 6.0]);
/// assert!(row.is_view());
/// ```
pub struct Tensor<A: TensorAllocator = CpuAllocator> {
    storage: TensorStorage<A>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    numel: usize,
    offset: usize,
    is_view: bool,
    size: usize,
    ctx: TensorContext<A>,
}

impl<A: TensorAllocator> Tensor<A> {
    /// Allocates a base tensor of `rank` axes holding `element_count` zeroed elements.
    ///
    /// The tensor starts out with the layout `[1, ..., 1, element_count]`; callers
    /// wanting another shape assign it with [`Tensor::set_layout`].
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::AllocationError`] if the buffer cannot be obtained and
    /// [`TensorError::ShapeMismatch`] if `rank` or `element_count` is zero.
    pub fn create(
        ctx: &TensorContext<A>,
        rank: usize,
        element_count: usize,
    ) -> Result<Self, TensorError> {
        if rank == 0 {
            return Err(TensorError::shape_mismatch(
                "Tensors need at least one axis",
                &[element_count],
                &[],
            ));
        }
        let mut shape = vec![1; rank];
        shape[rank - 1] = element_count;
        Self::alloc_base(ctx, shape)
    }

    /// Creates a base tensor of the given shape filled with zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is empty or has a zero dimension, or if the
    /// allocation fails.
    pub fn zeros(ctx: &TensorContext<A>, shape: &[usize]) -> Result<Self, TensorError> {
        Self::alloc_base(ctx, shape.to_vec())
    }

    /// Creates a base tensor of the given shape filled with `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is invalid or the allocation fails.
    pub fn from_shape_val(
        ctx: &TensorContext<A>,
        shape: &[usize],
        value: f32,
    ) -> Result<Self, TensorError> {
        let mut tensor = Self::alloc_base(ctx, shape.to_vec())?;
        if value != 0.0 {
            for i in 0..tensor.numel {
                tensor.write_at(i, value);
            }
        }
        Ok(tensor)
    }

    /// Creates a base tensor of the given shape from a slice of row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the number of elements in `data` does not
    /// match the shape.
    pub fn from_shape_slice(
        ctx: &TensorContext<A>,
        shape: &[usize],
        data: &[f32],
    ) -> Result<Self, TensorError> {
        let numel = validate_shape(shape)?;
        if numel != data.len() {
            return Err(TensorError::shape_mismatch(
                "Data length does not match the shape",
                shape,
                &[data.len()],
            ));
        }
        let storage = TensorStorage::from_slice(data, ctx.allocator().clone())?;
        Ok(Self::register_base(ctx, storage, shape.to_vec(), numel))
    }

    /// Creates a base tensor of the given shape from a vector of row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the number of elements in `data` does not
    /// match the shape.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let t = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(t.get(&[1, 0]), Some(3.0));
    /// assert!(Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0]).is_err());
    /// ```
    pub fn from_shape_vec(
        ctx: &TensorContext<A>,
        shape: &[usize],
        data: Vec<f32>,
    ) -> Result<Self, TensorError> {
        Self::from_shape_slice(ctx, shape, &data)
    }

    /// Creates a base tensor whose elements are generated from their coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is invalid or the allocation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let eye =
    ///     Tensor::from_shape_fn(&ctx, &[2, 2], |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 })
    ///         .unwrap();
    /// assert_eq!(eye.to_vec(), vec![1.0, 0.0, 0.0, 1.0]);
    /// ```
    pub fn from_shape_fn<F>(
        ctx: &TensorContext<A>,
        shape: &[usize],
        f: F,
    ) -> Result<Self, TensorError>
    where
        F: Fn(&[usize]) -> f32,
    {
        let mut tensor = Self::alloc_base(ctx, shape.to_vec())?;
        for i in 0..tensor.numel {
            let index = unravel_index(&tensor.shape, i);
            tensor.write_at(i, f(&index));
        }
        Ok(tensor)
    }

    /// Creates the 1-element tensor `[value]` of shape `[1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    pub fn scalar(ctx: &TensorContext<A>, value: f32) -> Result<Self, TensorError> {
        Self::from_shape_val(ctx, &[1], value)
    }

    fn alloc_base(ctx: &TensorContext<A>, shape: Vec<usize>) -> Result<Self, TensorError> {
        let numel = validate_shape(&shape)?;
        let storage = TensorStorage::new(numel, ctx.allocator().clone()).map_err(|e| {
            log::debug!("failed to allocate tensor of shape {shape:?}: {e}");
            e
        })?;
        Ok(Self::register_base(ctx, storage, shape, numel))
    }

    fn register_base(
        ctx: &TensorContext<A>,
        storage: TensorStorage<A>,
        shape: Vec<usize>,
        numel: usize,
    ) -> Self {
        let size = accounted_bytes::<A>(shape.len(), numel);
        ctx.stats().register(size);
        log::trace!("created tensor of shape {shape:?} ({size} bytes)");
        let strides = row_major_strides(&shape);
        Self {
            storage,
            shape,
            strides,
            numel,
            offset: 0,
            is_view: false,
            size,
            ctx: ctx.clone(),
        }
    }

    fn register_view(
        &self,
        shape: Vec<usize>,
        strides: Vec<usize>,
        numel: usize,
        offset: usize,
    ) -> Self {
        let size = accounted_bytes::<A>(shape.len(), 0);
        self.ctx.stats().register(size);
        log::trace!("created view of shape {shape:?} at offset {offset}");
        Self {
            storage: self.storage.clone(),
            shape,
            strides,
            numel,
            offset,
            is_view: true,
            size,
            ctx: self.ctx.clone(),
        }
    }

    /// Checks that a layout starting at `offset` stays inside the buffer.
    fn check_in_buffer(
        &self,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<(), TensorError> {
        match max_offset(shape, strides, offset) {
            Some(last) if last < self.ndata() => Ok(()),
            Some(last) => Err(TensorError::index_out_of_range(last, self.ndata())),
            None => Err(TensorError::index_out_of_range(offset, self.ndata())),
        }
    }

    /// Creates a view of the sub-tensor found at `element_offset` after dropping the
    /// first `axis` axes.
    ///
    /// The view keeps `shape[axis..]` and `strides[axis..]` and starts at
    /// `self.offset() + element_offset`. This is how the kernels step through the
    /// matrices of a batch.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::RankViolation`] if `axis >= rank` and
    /// [`TensorError::IndexOutOfRange`] if the view would address memory outside the
    /// buffer.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let batch = Tensor::from_shape_fn(&ctx, &[2, 2, 2], |idx| idx[0] as f32).unwrap();
    /// let second = batch.create_view(1, 4).unwrap();
    /// assert_eq!(second.shape(), &[2, 2]);
    /// assert_eq!(second.to_vec(), vec![1.0; 4]);
    /// ```
    pub fn create_view(&self, axis: usize, element_offset: usize) -> Result<Self, TensorError> {
        if axis >= self.rank() {
            return Err(TensorError::rank_violation(axis, self.rank()));
        }
        let shape = self.shape[axis..].to_vec();
        let strides = self.strides[axis..].to_vec();
        let offset = self
            .offset
            .checked_add(element_offset)
            .ok_or_else(|| TensorError::index_out_of_range(element_offset, self.ndata()))?;
        self.check_in_buffer(&shape, &strides, offset)?;
        let numel = validate_shape(&shape)?;
        Ok(self.register_view(shape, strides, numel, offset))
    }

    /// Creates a view of the whole tensor.
    ///
    /// # Errors
    ///
    /// Never fails for a valid tensor; the signature mirrors [`Tensor::create_view`].
    pub fn view(&self) -> Result<Self, TensorError> {
        self.create_view(0, 0)
    }

    /// Creates a view with `new_rank` axes over the same elements.
    ///
    /// The view starts out with the placeholder layout `[1, ..., 1, numel]`. Callers
    /// must assign the intended layout with [`Tensor::set_layout`] before reading or
    /// writing through the view.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if `new_rank` is zero.
    pub fn create_reshape_view(&self, new_rank: usize) -> Result<Self, TensorError> {
        if new_rank == 0 {
            return Err(TensorError::shape_mismatch(
                "Tensors need at least one axis",
                &[self.numel],
                &[],
            ));
        }
        let mut shape = vec![1; new_rank];
        shape[new_rank - 1] = self.numel;
        let strides = row_major_strides(&shape);
        Ok(self.register_view(shape, strides, self.numel, self.offset))
    }

    /// Assigns a new shape and strides without touching the data.
    ///
    /// The rank and the element count must stay the same. Base tensors only accept
    /// row-major strides.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the rank or element count changes,
    /// [`TensorError::IndexOutOfRange`] if the layout escapes the buffer, and
    /// [`TensorError::UnsupportedOperation`] for non row-major strides on a base tensor.
    pub fn set_layout(&mut self, shape: &[usize], strides: &[usize]) -> Result<(), TensorError> {
        if shape.len() != self.rank() || strides.len() != shape.len() {
            return Err(TensorError::shape_mismatch(
                "Layout must keep the rank of the tensor",
                &self.shape,
                shape,
            ));
        }
        let numel = validate_shape(shape)?;
        if numel != self.numel {
            return Err(TensorError::shape_mismatch(
                "Layout must address the same number of elements",
                &self.shape,
                shape,
            ));
        }
        if !self.is_view && !is_standard_layout(shape, strides) {
            return Err(TensorError::unsupported_operation(
                "set_layout",
                "base tensors must keep a row-major layout",
            ));
        }
        self.check_in_buffer(shape, strides, self.offset)?;
        self.shape = shape.to_vec();
        self.strides = strides.to_vec();
        Ok(())
    }

    /// Reshapes a contiguous tensor into a view with row-major strides.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the element count changes and
    /// [`TensorError::UnsupportedOperation`] if the tensor is not contiguous.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let t = Tensor::from_shape_vec(&ctx, &[4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// let m = t.reshape(&[2, 2]).unwrap();
    /// assert_eq!(m.strides(), &[2, 1]);
    /// assert_eq!(m.get(&[1, 1]), Some(4.0));
    /// ```
    pub fn reshape(&self, shape: &[usize]) -> Result<Self, TensorError> {
        if !self.is_standard_layout() {
            return Err(TensorError::unsupported_operation(
                "reshape",
                "the tensor is not contiguous; clone it first",
            ));
        }
        let numel = validate_shape(shape)?;
        if numel != self.numel {
            return Err(TensorError::shape_mismatch(
                "Reshape requires the same number of elements",
                &self.shape,
                shape,
            ));
        }
        let mut view = self.create_reshape_view(shape.len())?;
        view.set_layout(shape, &row_major_strides(shape))?;
        Ok(view)
    }

    /// Reorders the axes of the tensor without copying.
    ///
    /// `axes[i]` names the source axis that becomes axis `i` of the view.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if `axes` is not a permutation of
    /// `0..rank`.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    /// let tr = t.permute_axes(&[1, 0]).unwrap();
    /// assert_eq!(tr.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn permute_axes(&self, axes: &[usize]) -> Result<Self, TensorError> {
        let mut seen = vec![false; self.rank()];
        if axes.len() != self.rank() {
            return Err(TensorError::shape_mismatch(
                "Permutation must name every axis",
                &self.shape,
                axes,
            ));
        }
        for &axis in axes {
            if axis >= self.rank() || seen[axis] {
                return Err(TensorError::shape_mismatch(
                    "Invalid axis permutation",
                    &self.shape,
                    axes,
                ));
            }
            seen[axis] = true;
        }
        let shape = axes.iter().map(|&a| self.shape[a]).collect();
        let strides = axes.iter().map(|&a| self.strides[a]).collect();
        Ok(self.register_view(shape, strides, self.numel, self.offset))
    }

    /// Copies the logical elements of `self` into `dest` in row-major order.
    ///
    /// `dest` takes over the shape of `self` with row-major strides and offset 0.
    /// Contiguous sources are copied in one block; strided sources are gathered
    /// element by element, through a temporary when `self` aliases `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::UnsupportedOperation`] if `dest` is a view and
    /// [`TensorError::ShapeMismatch`] if its buffer is too small.
    pub fn clone_into(&self, dest: &mut Tensor<A>) -> Result<(), TensorError> {
        if dest.is_view {
            return Err(TensorError::unsupported_operation(
                "clone",
                "the destination must own its buffer",
            ));
        }
        if dest.ndata() < self.numel {
            return Err(TensorError::shape_mismatch(
                "Destination buffer is too small",
                &self.shape,
                &dest.shape,
            ));
        }

        if self.is_standard_layout() {
            self.storage.copy_range_to(self.offset, &dest.storage, 0, self.numel);
        } else if self.shares_storage(dest) {
            log::debug!("gathering strided tensor of shape {:?} into its own buffer", self.shape);
            for (i, value) in self.to_vec().into_iter().enumerate() {
                dest.storage.set(i, value);
            }
        } else {
            log::debug!("gathering strided tensor of shape {:?}", self.shape);
            for i in 0..self.numel {
                let value = self.read_at(self.physical_offset(i));
                dest.storage.set(i, value);
            }
        }

        let new_size = accounted_bytes::<A>(self.rank(), dest.ndata());
        dest.ctx.stats().resize(dest.size, new_size);
        dest.size = new_size;
        dest.shape = self.shape.clone();
        dest.strides = row_major_strides(&self.shape);
        dest.numel = self.numel;
        dest.offset = 0;
        Ok(())
    }

    /// Materialises the tensor into a new contiguous base tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad_tensor::{Tensor, TensorContext};
    ///
    /// let ctx = TensorContext::default();
    /// let t = Tensor::from_shape_vec(&ctx, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// let tr = t.permute_axes(&[1, 0]).unwrap().clone_tensor().unwrap();
    /// assert!(!tr.is_view());
    /// assert!(tr.is_standard_layout());
    /// assert_eq!(tr.to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
    /// ```
    pub fn clone_tensor(&self) -> Result<Tensor<A>, TensorError> {
        let mut dest = Self::create(&self.ctx, self.rank(), self.numel)?;
        self.clone_into(&mut dest)?;
        Ok(dest)
    }

    /// Releases the tensor.
    ///
    /// Views only release their metadata; the buffer is released once no tensor
    /// references it anymore. Equivalent to dropping the tensor.
    pub fn free(self) {
        drop(self)
    }

    /// Returns the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the strides of the tensor, in elements.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Returns the number of axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of logical elements.
    #[inline]
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Returns the number of elements of the underlying buffer.
    #[inline]
    pub fn ndata(&self) -> usize {
        self.storage.len()
    }

    /// Returns the buffer offset of logical element 0.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the tensor aliases a buffer it did not create.
    #[inline]
    pub fn is_view(&self) -> bool {
        self.is_view
    }

    /// Returns the bytes this tensor contributes to the allocation counters.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Returns the storage of the tensor.
    #[inline]
    pub fn storage(&self) -> &TensorStorage<A> {
        &self.storage
    }

    /// Returns the context the tensor was created in.
    #[inline]
    pub fn context(&self) -> &TensorContext<A> {
        &self.ctx
    }

    /// Returns true if both tensors alias the same buffer.
    #[inline]
    pub fn shares_storage(&self, other: &Tensor<A>) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    /// Checks if logical element `i` lives at `offset + i` in the buffer.
    pub fn is_standard_layout(&self) -> bool {
        is_standard_layout(&self.shape, &self.strides)
    }

    /// Maps a linear index to the buffer offset of that element.
    ///
    /// Contiguous tensors skip the coordinate decomposition.
    #[inline]
    pub fn physical_offset(&self, linear_index: usize) -> usize {
        if self.is_standard_layout() {
            self.offset + linear_index
        } else {
            physical_offset(&self.shape, &self.strides, self.offset, linear_index)
        }
    }

    /// Reads the buffer at a physical offset.
    ///
    /// # Panics
    ///
    /// Panics if `physical` is outside the buffer.
    #[inline]
    pub fn read_at(&self, physical: usize) -> f32 {
        self.storage.get(physical)
    }

    /// Writes the buffer at a physical offset.
    ///
    /// # Panics
    ///
    /// Panics if `physical` is outside the buffer.
    #[inline]
    pub fn write_at(&mut self, physical: usize, value: f32) {
        self.storage.set(physical, value)
    }

    /// Reads the element at a linear index.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfRange`] if `linear_index >= numel`.
    pub fn get_item(&self, linear_index: usize) -> Result<f32, TensorError> {
        if linear_index >= self.numel {
            return Err(TensorError::index_out_of_range(linear_index, self.numel));
        }
        Ok(self.read_at(self.physical_offset(linear_index)))
    }

    /// Writes the element at a linear index.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfRange`] if `linear_index >= numel`.
    pub fn set_item(&mut self, linear_index: usize, value: f32) -> Result<(), TensorError> {
        if linear_index >= self.numel {
            return Err(TensorError::index_out_of_range(linear_index, self.numel));
        }
        let physical = self.physical_offset(linear_index);
        self.write_at(physical, value);
        Ok(())
    }

    /// Reads the element at a multi-dimensional index, or `None` if out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.rank() {
            return None;
        }
        let mut physical = self.offset;
        for ((&idx, &dim), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if idx >= dim {
                return None;
            }
            physical += idx * stride;
        }
        Some(self.read_at(physical))
    }

    /// Returns an iterator over the logical elements in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.numel).map(move |i| self.read_at(self.physical_offset(i)))
    }

    /// Copies the logical elements into a vector in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }
}

impl<A: TensorAllocator> Drop for Tensor<A> {
    fn drop(&mut self) {
        self.ctx.stats().release(self.size);
        log::trace!(
            "freed {} of shape {:?} ({} bytes)",
            if self.is_view { "view" } else { "tensor" },
            self.shape,
            self.size
        );
    }
}

impl<A: TensorAllocator> std::fmt::Debug for Tensor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("is_view", &self.is_view)
            .field("data", &self.to_vec())
            .finish()
    }
}

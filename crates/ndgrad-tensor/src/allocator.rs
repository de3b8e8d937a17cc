use std::alloc;
use std::alloc::Layout;

use thiserror::Error;

/// An error type for tensor allocator operations.
#[derive(Debug, Error, PartialEq)]
pub enum TensorAllocatorError {
    /// The requested buffer size cannot be described by a memory layout.
    #[error("Invalid tensor layout {0}")]
    LayoutError(core::alloc::LayoutError),

    /// The allocator returned a null pointer.
    #[error("Null pointer")]
    NullPointer,
}

impl TensorAllocatorError {
    /// Returns true if the allocator ran out of memory.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::NullPointer)
    }
}

/// A trait for allocating and deallocating memory for tensors.
///
/// # Methods
///
/// * `alloc` - Allocates memory for a tensor with the given layout.
/// * `dealloc` - Deallocates memory for a tensor with the given layout.
pub trait TensorAllocator: Clone {
    /// Allocates zeroed memory for a tensor with the given layout.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError>;

    /// Deallocates memory for a tensor with the given layout.
    fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

#[derive(Clone, Debug)]
/// A tensor allocator that uses the system allocator.
pub struct CpuAllocator;

impl Default for CpuAllocator {
    fn default() -> Self {
        Self
    }
}

impl TensorAllocator for CpuAllocator {
    /// Allocates zeroed memory for a tensor with the given layout.
    ///
    /// # Arguments
    ///
    /// * `layout` - The layout of the buffer. Must have a non-zero size.
    ///
    /// # Returns
    ///
    /// A non-null pointer to the allocated memory if successful, otherwise an error.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        if layout.size() == 0 {
            return Err(TensorAllocatorError::NullPointer);
        }
        // SAFETY: the layout has a non-zero size (checked above)
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            Err(TensorAllocatorError::NullPointer)?
        }
        Ok(ptr)
    }

    /// Deallocates memory for a tensor with the given layout.
    ///
    /// # Arguments
    ///
    /// * `ptr` - A non-null pointer to the allocated memory.
    /// * `layout` - The layout the memory was allocated with.
    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !ptr.is_null() {
            // SAFETY: ptr was returned by `alloc` with the same layout
            unsafe { alloc::dealloc(ptr, layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocator() -> Result<(), TensorAllocatorError> {
        let allocator = CpuAllocator;
        let layout = Layout::array::<f32>(256).map_err(TensorAllocatorError::LayoutError)?;
        let ptr = allocator.alloc(layout)?;
        // memory comes back zeroed
        let first = unsafe { *(ptr as *const f32) };
        assert_eq!(first, 0.0);
        allocator.dealloc(ptr, layout);
        Ok(())
    }

    #[test]
    fn test_cpu_allocator_zero_size() {
        let allocator = CpuAllocator;
        let layout = Layout::from_size_align(0, 4).unwrap();
        let res = allocator.alloc(layout);
        assert_eq!(res, Err(TensorAllocatorError::NullPointer));
        assert!(res.unwrap_err().is_out_of_memory());
    }
}

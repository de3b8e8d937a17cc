//! Reference-counted buffer storage shared between a base tensor and its views.
//!
//! A [`TensorStorage`] owns one `f32` buffer obtained from a [`TensorAllocator`].
//! Cloning the storage only bumps a reference count, so any number of views can
//! alias the same buffer and the memory is released when the last handle is dropped.

use std::{alloc::Layout, ptr::NonNull, rc::Rc};

use crate::allocator::{TensorAllocator, TensorAllocatorError};

/// Inner storage holding the allocation.
struct StorageImpl<A: TensorAllocator> {
    /// The pointer to the buffer which must be non-null.
    ptr: NonNull<f32>,
    /// Number of `f32` elements in the buffer.
    len: usize,
    /// The memory layout used for allocation.
    layout: Layout,
    /// The allocator used to release the buffer.
    alloc: A,
}

impl<A: TensorAllocator> Drop for StorageImpl<A> {
    fn drop(&mut self) {
        log::trace!("releasing buffer of {} elements", self.len);
        self.alloc
            .dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
    }
}

/// A shared `f32` buffer.
///
/// Element access goes through raw pointer reads and writes with bounds checks,
/// never through long-lived references, so an input tensor and the result tensor
/// of a kernel may alias the same buffer. The type is neither `Send` nor `Sync`.
pub struct TensorStorage<A: TensorAllocator> {
    inner: Rc<StorageImpl<A>>,
}

impl<A: TensorAllocator> TensorStorage<A> {
    /// Allocates a zero-initialised buffer of `len` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout overflows or the allocator fails.
    pub fn new(len: usize, alloc: A) -> Result<Self, TensorAllocatorError> {
        let layout = Layout::array::<f32>(len).map_err(TensorAllocatorError::LayoutError)?;
        let raw_ptr = alloc.alloc(layout)?;
        let ptr = NonNull::new(raw_ptr as *mut f32).ok_or(TensorAllocatorError::NullPointer)?;

        Ok(Self {
            inner: Rc::new(StorageImpl {
                ptr,
                len,
                layout,
                alloc,
            }),
        })
    }

    /// Allocates a buffer and copies `data` into it.
    ///
    /// # Errors
    ///
    /// Returns an error if memory allocation fails.
    pub fn from_slice(data: &[f32], alloc: A) -> Result<Self, TensorAllocatorError> {
        let storage = Self::new(data.len(), alloc)?;
        // SAFETY: the buffer was just allocated with room for data.len() elements
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), storage.inner.ptr.as_ptr(), data.len());
        }
        Ok(storage)
    }

    /// Returns the number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Returns true if the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Returns true if no other handle references this buffer.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Rc::strong_count(&self.inner) == 1
    }

    /// Returns the number of handles referencing this buffer.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Returns true if both handles reference the same buffer.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reads the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        assert!(
            index < self.inner.len,
            "storage index {index} out of bounds for buffer of {} elements",
            self.inner.len
        );
        // SAFETY: index is within the allocation (checked above)
        unsafe { self.inner.ptr.as_ptr().add(index).read() }
    }

    /// Writes `value` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        assert!(
            index < self.inner.len,
            "storage index {index} out of bounds for buffer of {} elements",
            self.inner.len
        );
        // SAFETY: index is within the allocation (checked above) and no references
        // into the buffer are handed out, so the write cannot invalidate a borrow
        unsafe { self.inner.ptr.as_ptr().add(index).write(value) }
    }

    /// Copies `len` elements starting at `src_start` in `self` to `dst_start` in `dst`.
    ///
    /// # Panics
    ///
    /// Panics if either range is out of bounds.
    pub fn copy_range_to(&self, src_start: usize, dst: &Self, dst_start: usize, len: usize) {
        assert!(src_start + len <= self.inner.len, "source range out of bounds");
        assert!(dst_start + len <= dst.inner.len, "destination range out of bounds");
        // SAFETY: both ranges are in bounds; `copy` tolerates overlapping ranges
        unsafe {
            std::ptr::copy(
                self.inner.ptr.as_ptr().add(src_start),
                dst.inner.ptr.as_ptr().add(dst_start),
                len,
            );
        }
    }

    /// Copies the whole buffer into a vector.
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.inner.len).map(|i| self.get(i)).collect()
    }
}

impl<A: TensorAllocator> Clone for TensorStorage<A> {
    /// Creates a new handle to the same buffer. No data is copied.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: TensorAllocator> std::fmt::Debug for TensorStorage<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("ptr", &self.inner.ptr)
            .field("len", &self.inner.len)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

//! Allocation context and memory accounting.
//!
//! Every tensor is created through a [`TensorContext`], which owns the allocator and
//! a shared [`MemoryStats`] record. Tensors keep a handle to the stats of the context
//! that created them and settle their bytes when they are dropped.

use std::{cell::Cell, rc::Rc};

use crate::allocator::{CpuAllocator, TensorAllocator};

/// Counters of the bytes and tensors currently alive in a context.
#[derive(Debug, Default)]
pub struct MemoryStats {
    allocated: Cell<usize>,
    live_tensors: Cell<u64>,
}

impl MemoryStats {
    /// Returns the number of bytes attributed to live tensors.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.get()
    }

    /// Returns the number of live tensors, base tensors and views alike.
    pub fn live_tensor_count(&self) -> u64 {
        self.live_tensors.get()
    }

    /// Returns a copy of the counters.
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            allocated_bytes: self.allocated_bytes(),
            live_tensors: self.live_tensor_count(),
        }
    }

    pub(crate) fn register(&self, bytes: usize) {
        self.allocated.set(self.allocated.get() + bytes);
        self.live_tensors.set(self.live_tensors.get() + 1);
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.allocated.set(self.allocated.get().saturating_sub(bytes));
        self.live_tensors.set(self.live_tensors.get().saturating_sub(1));
    }

    pub(crate) fn resize(&self, old_bytes: usize, new_bytes: usize) {
        let allocated = self.allocated.get().saturating_sub(old_bytes) + new_bytes;
        self.allocated.set(allocated);
    }
}

/// A point-in-time copy of [`MemoryStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemorySnapshot {
    /// Bytes attributed to live tensors.
    pub allocated_bytes: usize,
    /// Number of live tensors.
    pub live_tensors: u64,
}

/// The allocation scope of a group of tensors.
///
/// Cloning a context is cheap and yields a handle to the same counters.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
///
/// let ctx = TensorContext::default();
/// let t = Tensor::zeros(&ctx, &[2, 3]).unwrap();
/// assert_eq!(ctx.live_tensor_count(), 1);
/// drop(t);
/// assert_eq!(ctx.live_tensor_count(), 0);
/// assert_eq!(ctx.allocated_bytes(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct TensorContext<A: TensorAllocator = CpuAllocator> {
    alloc: A,
    stats: Rc<MemoryStats>,
}

impl<A: TensorAllocator> TensorContext<A> {
    /// Creates a new context with zeroed counters.
    pub fn new(alloc: A) -> Self {
        Self {
            alloc,
            stats: Rc::new(MemoryStats::default()),
        }
    }

    /// Returns the allocator of the context.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Returns the shared counters of the context.
    pub fn stats(&self) -> &Rc<MemoryStats> {
        &self.stats
    }

    /// Returns the number of bytes attributed to live tensors.
    pub fn allocated_bytes(&self) -> usize {
        self.stats.allocated_bytes()
    }

    /// Returns the number of live tensors.
    pub fn live_tensor_count(&self) -> u64 {
        self.stats.live_tensor_count()
    }

    /// Returns true if both handles share the same counters.
    pub fn same_scope(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.stats, &other.stats)
    }
}

impl Default for TensorContext<CpuAllocator> {
    fn default() -> Self {
        Self::new(CpuAllocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_register_release() {
        let stats = MemoryStats::default();
        stats.register(100);
        stats.register(20);
        assert_eq!(stats.allocated_bytes(), 120);
        assert_eq!(stats.live_tensor_count(), 2);

        stats.release(20);
        assert_eq!(
            stats.snapshot(),
            MemorySnapshot {
                allocated_bytes: 100,
                live_tensors: 1
            }
        );

        stats.resize(100, 40);
        assert_eq!(stats.allocated_bytes(), 40);
    }

    #[test]
    fn test_context_clone_shares_counters() {
        let ctx = TensorContext::default();
        let other = ctx.clone();
        ctx.stats().register(8);
        assert_eq!(other.allocated_bytes(), 8);
        assert!(ctx.same_scope(&other));
        assert!(!ctx.same_scope(&TensorContext::default()));
    }
}

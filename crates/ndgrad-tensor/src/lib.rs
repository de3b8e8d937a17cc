#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `ndgrad-tensor` provides a dynamic-rank, strided `f32` tensor. A tensor is a
//! shape, a set of strides and an offset over a shared buffer, so slicing a batch,
//! transposing or reshaping never copies data.
//!
//! # Architecture
//!
//! - **Tensor**: shape, strides and offset over a buffer, either owned (base) or aliased (view)
//! - **TensorStorage**: the reference-counted buffer shared by a base tensor and its views
//! - **TensorContext**: the allocator plus the memory counters every tensor reports to
//! - **layout**: pure coordinate arithmetic, from linear indices to buffer offsets
//!
//! # Quick Start
//!
//! ```rust
//! use ndgrad_tensor::{Tensor, TensorContext};
//!
//! let ctx = TensorContext::default();
//! let t = Tensor::from_shape_vec(&ctx, &[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//!
//! // a transposed view shares the buffer
//! let tr = t.permute_axes(&[1, 0]).unwrap();
//! assert_eq!(tr.get(&[2, 1]), Some(6.0));
//!
//! // cloning materialises the view into contiguous memory
//! let owned = tr.clone_tensor().unwrap();
//! assert_eq!(owned.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
//! assert_eq!(ctx.live_tensor_count(), 3);
//! ```

/// Allocator module containing memory management utilities.
///
/// This module provides the [`TensorAllocator`] trait and the default
/// [`CpuAllocator`] backed by the system allocator.
pub mod allocator;

/// Allocation scope and memory counters.
pub mod context;

/// Coordinate arithmetic for strided layouts.
pub mod layout;

/// Serde module for JSON/other format serialization and deserialization.
#[cfg(feature = "serde")]
pub mod serde;

/// Storage module containing the shared buffer implementation.
pub mod storage;

/// Tensor module containing the main tensor implementation and error types.
///
/// This module provides the core [`tensor::Tensor`] struct and related functionality.
pub mod tensor;

pub use crate::allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError};
pub use crate::context::{MemorySnapshot, MemoryStats, TensorContext};
#[cfg(feature = "serde")]
pub use crate::serde::TensorSnapshot;
pub use crate::tensor::{Tensor, TensorError};

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Kernels take their operands by reference and write into a caller-provided
//! result, either overwriting it or accumulating into it ([`WriteMode`]). Every
//! kernel reads and writes through strides, so views work everywhere a
//! contiguous tensor does. The [`TensorOps`] trait wraps the kernels into
//! allocating methods.

/// Broadcasting elementwise binary kernels.
pub mod broadcast;

/// Reductions that undo broadcasting, used for gradient propagation.
pub mod debroadcast;

/// Stochastic dropout kernel.
pub mod dropout;

/// Error types for tensor operations.
///
/// Defines [`TensorOpsError`] for handling failures during tensor computations.
pub mod error;

/// Buffer initializers.
pub mod init;

mod kernel;

/// Batched matrix products.
pub mod linalg;

/// High-level tensor operations and traits.
///
/// Provides the [`TensorOps`] trait with allocating arithmetic, linear algebra and
/// reduction methods.
pub mod ops;

/// Full and per-axis reductions.
pub mod reduce;

/// Elementwise unary kernels and their derivatives.
pub mod unary;

pub use broadcast::BinaryOp;
pub use error::TensorOpsError;
pub use kernel::WriteMode;
pub use ops::TensorOps;
pub use reduce::{ArgIndex, ReduceOp};
pub use unary::UnaryOp;

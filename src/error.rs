//! Error types for convr

use thiserror::Error;

/// Result type alias using convr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing an NCHWc dispatch
///
/// The threaded executors themselves never fail; every error is produced by
/// the validation layer before any worker runs, or by the aligned allocator.
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Buffer too small for the tensor described by the dispatch geometry
    #[error("Buffer '{arg}' holds {got} elements but the operation requires at least {required}")]
    BufferTooSmall {
        /// The buffer argument name
        arg: &'static str,
        /// Minimum element count implied by the geometry
        required: usize,
        /// Actual element count supplied
        got: usize,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}

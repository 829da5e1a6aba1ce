//! # convr
//!
//! **Single-precision NCHWc convolution and pooling kernels for CPUs.**
//!
//! convr computes 2-D convolutions and pooling over tensors laid out in a
//! channel-blocked format: a `[N, C, H, W]` tensor is traversed as
//! `[N, C/B, H, W, B]`, where the block size `B` is detected per platform
//! so that one block fills one SIMD register. The blocking makes channel
//! loads contiguous, which is what lets direct convolution run at register
//! tile speed without an im2col transformation.
//!
//! ## What it does
//!
//! - **One dispatch front-end, four convolution variants**: direct NCHWc,
//!   first-layer NCHW-to-NCHWc, pointwise (1x1), and depthwise, selected
//!   from the shape parameters; plus max/average pooling.
//! - **Edge handling outside the kernels**: per-dimension output spans are
//!   split into left-pad / interior / right-pad partitions and the kernel
//!   height is trimmed at the tensor edges, so microkernels never see
//!   out-of-bounds taps and padded input is never materialized.
//! - **Fused epilogues**: accumulate-or-overwrite, bias, and ReLU fold
//!   into the kernel's final store through a flag word; other activations
//!   run as a pass over the just-written tile.
//! - **Data-parallel fork-join**: work is partitioned into contiguous,
//!   disjoint ranges per worker; results are bit-identical for any worker
//!   count.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use convr::prelude::*;
//!
//! let geometry = ConvGeometry {
//!     dimensions: 2,
//!     input_shape: &[1, 64, 56, 56],
//!     kernel_shape: Some(&[3, 3]),
//!     dilation_shape: None,
//!     padding: Some(&[1, 1, 1, 1]),
//!     stride_shape: None,
//!     output_shape: &[1, 64, 56, 56],
//!     group_count: 1,
//! };
//!
//! // Pack the filter for the variant the engine will select.
//! assert_eq!(conv_algorithm(&geometry)?, ConvAlgorithm::Nchwc);
//!
//! conv(
//!     &geometry,
//!     &input,
//!     &filter,
//!     Some(&bias),
//!     &mut output,
//!     Activation::Relu,
//!     true,
//!     default_thread_pool(),
//! )?;
//! ```
//!
//! ## Feature flags
//!
//! - `rayon` (default): drive dispatches through the rayon global pool.
//!   Without it the default pool runs sequentially; any [`threading::ThreadPool`]
//!   implementation can be supplied instead.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activation;
pub mod alloc;
pub mod error;
pub mod kernels;
pub mod nchwc;
pub mod platform;
pub mod threading;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activation::Activation;
    pub use crate::alloc::AlignedBuffer;
    pub use crate::error::{Error, Result};
    pub use crate::nchwc::{
        ConvAlgorithm, ConvGeometry, PoolGeometry, PoolingKind, conv, conv_algorithm, pool,
    };
    pub use crate::platform::block_size;
    pub use crate::threading::{SequentialPool, ThreadPool, default_thread_pool};

    #[cfg(feature = "rayon")]
    pub use crate::threading::RayonPool;
}

//! Platform detection and microkernel dispatch table
//!
//! The NCHWc block size is the channel blocking factor of every tensor the
//! engine touches and the lane width of the microkernel register tiles. It
//! is detected once per process: 16 when AVX-512 is available on x86-64,
//! 8 otherwise.
//!
//! The microkernel table is the seam between the engine and its
//! hand-tuned kernel collaborators. The table entries default to the
//! reference scalar kernels in [`crate::kernels::scalar`], which implement
//! the full boundary-strip contract and serve as the exact-agreement
//! baseline for every optimized kernel.

use std::sync::OnceLock;

use crate::kernels::scalar;
use crate::kernels::{ConvDepthwiseKernelFn, ConvKernelFn, ConvPointwiseKernelFn, PoolKernelFn};
use crate::nchwc::PoolingKind;

/// Per-process kernel configuration.
pub(crate) struct Platform {
    /// Channel blocking factor for every NCHWc tensor
    pub block_size: usize,
    /// Direct convolution kernel, NCHWc input layout
    pub conv_nchwc_kernel: ConvKernelFn,
    /// Direct convolution kernel, NCHW (unblocked) input layout
    pub conv_nchw_kernel: ConvKernelFn,
    /// Pointwise (1x1) convolution kernel
    pub conv_pointwise_kernel: ConvPointwiseKernelFn,
    /// Depthwise convolution kernel
    pub conv_depthwise_kernel: ConvDepthwiseKernelFn,
    /// Maximum pooling kernel
    pub pool_maximum_kernel: PoolKernelFn,
    /// Average pooling kernel, padding counted in the divisor
    pub pool_average_include_pad_kernel: PoolKernelFn,
    /// Average pooling kernel, only valid taps in the divisor
    pub pool_average_exclude_pad_kernel: PoolKernelFn,
}

impl Platform {
    /// Select the pooling kernel for `kind`.
    pub fn pool_kernel(&self, kind: PoolingKind) -> PoolKernelFn {
        match kind {
            PoolingKind::Maximum => self.pool_maximum_kernel,
            PoolingKind::AverageIncludePad => self.pool_average_include_pad_kernel,
            PoolingKind::AverageExcludePad => self.pool_average_exclude_pad_kernel,
        }
    }
}

static PLATFORM: OnceLock<Platform> = OnceLock::new();

/// The process-wide kernel configuration.
pub(crate) fn platform() -> &'static Platform {
    PLATFORM.get_or_init(|| {
        let block_size = detect_block_size();
        debug_assert!(block_size <= crate::kernels::MAX_BLOCK_SIZE);
        Platform {
            block_size,
            conv_nchwc_kernel: scalar::conv_nchwc,
            conv_nchw_kernel: scalar::conv_nchw,
            conv_pointwise_kernel: scalar::conv_pointwise,
            conv_depthwise_kernel: scalar::conv_depthwise,
            pool_maximum_kernel: scalar::pool_maximum,
            pool_average_include_pad_kernel: scalar::pool_average_include_pad,
            pool_average_exclude_pad_kernel: scalar::pool_average_exclude_pad,
        }
    })
}

#[cfg(target_arch = "x86_64")]
fn detect_block_size() -> usize {
    if is_x86_feature_detected!("avx512f") {
        16
    } else {
        8
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect_block_size() -> usize {
    8
}

/// Returns the NCHWc block size for the platform.
///
/// Callers need this value to lay out blocked tensors and to repack filter
/// tensors into the layout the selected convolution algorithm expects.
pub fn block_size() -> usize {
    platform().block_size
}

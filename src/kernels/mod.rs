//! Microkernel contract for the NCHWc engine
//!
//! The executors in [`crate::nchwc`] decompose a dispatch into per-row
//! microkernel calls; the kernels themselves are oblivious to tensor edges.
//! Each call describes one output row as three column strips emitted in
//! order: `output_count_left_pad` columns whose leftmost taps may fall
//! before the row start, `output_count` interior columns reading only valid
//! input, and `output_count_right_pad` columns whose rightmost taps may
//! fall past the row end. Kernels bounds-check taps only inside the two pad
//! strips, using `input_base` (the row start without the padding offset) as
//! the lower bound and `input_base + input_width` as the upper bound; the
//! interior strip reads straight through the pre-offset `input` pointer.
//!
//! Vertical trimming is the caller's job: `kernel_height` is the effective
//! kernel height after removing rows that would read outside the input, and
//! both input pointers already point at the first valid row.
//!
//! All strides are element counts of f32. Pointer arguments may be
//! conceptually out of range by the left padding offset; kernels must form
//! tap addresses with wrapping arithmetic and dereference only addresses
//! inside the row bounds.

pub mod scalar;

/// Largest block size any platform selects; reference kernels size their
/// accumulator tiles with this bound.
pub const MAX_BLOCK_SIZE: usize = 16;

/// Epilogue flag word passed to every convolution microkernel.
///
/// Bits 1..3 may only be set on the final-writer call for an output
/// element, i.e. the call that accumulates the last input channel tile.
pub mod flags {
    /// Accumulate into existing output instead of overwriting it.
    pub const ACCUMULATE_OUTPUT: u32 = 0x1;
    /// Add the bias vector before storing.
    pub const BIAS_ADDITION: u32 = 0x2;
    /// Apply ReLU before storing.
    pub const RELU_ACTIVATION: u32 = 0x4;
    /// The caller applies a non-ReLU activation after the kernel returns;
    /// the kernel itself stores the raw accumulation.
    pub const OTHER_ACTIVATION: u32 = 0x8;
}

/// Arguments for the direct convolution kernels (NCHWc and NCHW input
/// layouts share this shape; they differ in filter tap layout and in
/// whether the input row is channel-blocked).
#[derive(Clone, Copy)]
pub struct ConvKernelArgs {
    /// Channel blocking factor
    pub block_size: usize,
    /// Input row pointer with the left padding offset already subtracted
    pub input: *const f32,
    /// Filter tile for this call
    pub filter: *const f32,
    /// Output row base
    pub output: *mut f32,
    /// Elements between the input reads of adjacent output columns
    pub stride_width: usize,
    /// Elements between adjacent kernel taps along X
    pub dilation_width: usize,
    /// Filter blocks resident in this call
    pub filter_count: usize,
    /// Bump from the end of one kernel row sweep to the start of the next
    pub input_stride: usize,
    /// Elements between filter blocks
    pub filter_stride: usize,
    /// Elements between output planes
    pub output_stride: usize,
    /// Effective kernel height after vertical trimming
    pub kernel_height: usize,
    /// Kernel width
    pub kernel_width: usize,
    /// Input row start without the padding offset, for pad-strip bounds
    pub input_base: *const f32,
    /// Elements in one input row
    pub input_width: usize,
    /// Elements between vertically adjacent (dilated) input rows
    pub dilated_input_width: usize,
    /// Output columns in the left pad strip
    pub output_count_left_pad: usize,
    /// Output columns reading only valid input
    pub output_count: usize,
    /// Output columns in the right pad strip
    pub output_count_right_pad: usize,
    /// Bias vector for the resident filter blocks; null when absent
    pub bias: *const f32,
    /// Epilogue flag word (see [`flags`])
    pub flags: u32,
}

/// Arguments for the pointwise convolution kernel.
///
/// Pointwise convolution has no kernel extent and no padding, so the strip
/// machinery disappears: the kernel emits `output_count` output elements,
/// which may span several flattened output rows when the convolution is
/// unstrided.
#[derive(Clone, Copy)]
pub struct ConvPointwiseKernelArgs {
    /// Channel blocking factor
    pub block_size: usize,
    /// Input position of the first output element
    pub input: *const f32,
    /// Filter tile for this call
    pub filter: *const f32,
    /// Output base
    pub output: *mut f32,
    /// Elements between the input reads of adjacent output elements
    pub stride_width: usize,
    /// Input channel blocks resident in this call
    pub input_channels: usize,
    /// Filter blocks resident in this call
    pub filter_count: usize,
    /// Elements between input channel blocks
    pub input_stride: usize,
    /// Elements between filter blocks
    pub filter_stride: usize,
    /// Elements between output planes
    pub output_stride: usize,
    /// Output elements to emit
    pub output_count: usize,
    /// Bias vector for the resident filter blocks; null when absent
    pub bias: *const f32,
    /// Epilogue flag word (see [`flags`])
    pub flags: u32,
}

/// Arguments for the depthwise convolution kernel.
///
/// Depthwise convolution processes one channel block per call, so there is
/// no filter block count and the filter tile holds one weight per lane and
/// tap.
#[derive(Clone, Copy)]
pub struct ConvDepthwiseKernelArgs {
    /// Channel blocking factor
    pub block_size: usize,
    /// Input row pointer with the left padding offset already subtracted
    pub input: *const f32,
    /// Filter tile for this call
    pub filter: *const f32,
    /// Output row base
    pub output: *mut f32,
    /// Elements between the input reads of adjacent output columns
    pub stride_width: usize,
    /// Elements between adjacent kernel taps along X
    pub dilation_width: usize,
    /// Bump from the end of one kernel row sweep to the start of the next
    pub input_stride: usize,
    /// Effective kernel height after vertical trimming
    pub kernel_height: usize,
    /// Kernel width
    pub kernel_width: usize,
    /// Input row start without the padding offset, for pad-strip bounds
    pub input_base: *const f32,
    /// Elements in one input row
    pub input_width: usize,
    /// Elements between vertically adjacent (dilated) input rows
    pub dilated_input_width: usize,
    /// Output columns in the left pad strip
    pub output_count_left_pad: usize,
    /// Output columns reading only valid input
    pub output_count: usize,
    /// Output columns in the right pad strip
    pub output_count_right_pad: usize,
    /// Bias vector for this channel block; null when absent
    pub bias: *const f32,
    /// Epilogue flag word (see [`flags`])
    pub flags: u32,
}

/// Arguments for the pooling kernels.
#[derive(Clone, Copy)]
pub struct PoolKernelArgs {
    /// Channel blocking factor
    pub block_size: usize,
    /// Input row pointer with the left padding offset already subtracted
    pub input: *const f32,
    /// Output row base
    pub output: *mut f32,
    /// Elements between the input reads of adjacent output columns
    pub stride_width: usize,
    /// Elements between adjacent kernel taps along X
    pub dilation_width: usize,
    /// Bump from the end of one kernel row sweep to the start of the next
    pub input_stride: usize,
    /// Full kernel tap count, the divisor for include-pad averaging;
    /// ignored by maximum pooling
    pub kernel_size: usize,
    /// Effective kernel height after vertical trimming
    pub kernel_height: usize,
    /// Kernel width
    pub kernel_width: usize,
    /// Input row start without the padding offset, for pad-strip bounds
    pub input_base: *const f32,
    /// Elements in one input row
    pub input_width: usize,
    /// Elements between vertically adjacent (dilated) input rows
    pub dilated_input_width: usize,
    /// Output columns in the left pad strip
    pub output_count_left_pad: usize,
    /// Output columns reading only valid input
    pub output_count: usize,
    /// Output columns in the right pad strip
    pub output_count_right_pad: usize,
}

/// Direct convolution kernel entry (NCHWc or NCHW input layout).
pub type ConvKernelFn = unsafe fn(&ConvKernelArgs);

/// Pointwise convolution kernel entry.
pub type ConvPointwiseKernelFn = unsafe fn(&ConvPointwiseKernelArgs);

/// Depthwise convolution kernel entry.
pub type ConvDepthwiseKernelFn = unsafe fn(&ConvDepthwiseKernelArgs);

/// Pooling kernel entry.
pub type PoolKernelFn = unsafe fn(&PoolKernelArgs);

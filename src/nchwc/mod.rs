//! NCHWc convolution and pooling entry points
//!
//! The entry points validate the dispatch geometry, derive the work block,
//! select the algorithm variant from the shape parameters, and fan the
//! chosen executor out over the thread pool, returning once every worker
//! has completed.
//!
//! Tensors are channel-blocked: a `[N, C, H, W]` tensor is stored as
//! `[N, C/B, H, W, B]` where `B` is [`crate::platform::block_size`]. The
//! filter tensor must be pre-packed into the layout the selected algorithm
//! expects, which is why the selection rules are part of the public
//! contract (see [`conv_algorithm`]).

mod conv;
mod pool;
pub(crate) mod work;

use std::ptr;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::platform::block_size;
use crate::threading::ThreadPool;
use work::{ConvWorkBlock, PoolWorkBlock, WorkBlock, prepare_work_block};

/// Pooling operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolingKind {
    /// Maximum over the kernel window
    Maximum,
    /// Average with padding positions counted in the divisor
    AverageIncludePad,
    /// Average over valid positions only
    AverageExcludePad,
}

/// Convolution algorithm selected from the shape parameters.
///
/// The caller must pre-pack the filter tensor into the layout matching the
/// variant this engine will select, so the selection rules are public:
///
/// 1. At least one block of input channels per group, a 1x1 kernel, and no
///    padding selects [`ConvAlgorithm::Pointwise`].
/// 2. Otherwise, at least one block of input channels per group selects
///    [`ConvAlgorithm::Nchwc`].
/// 3. Otherwise, one input and one output channel per group selects
///    [`ConvAlgorithm::Depthwise`].
/// 4. Everything else selects [`ConvAlgorithm::Nchw`], the first-layer
///    path with unblocked input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvAlgorithm {
    /// Direct convolution over NCHWc input
    Nchwc,
    /// Direct convolution over NCHW input, producing NCHWc output
    Nchw,
    /// 1x1 convolution with no padding
    Pointwise,
    /// One channel per group, B-wide lanes
    Depthwise,
}

/// Geometry of one convolution dispatch.
///
/// Optional parameter arrays follow the ONNX defaulting conventions: a
/// missing kernel shape copies the input spatial shape, dilation defaults
/// to one, padding to zero, stride to one. `padding` holds the leading
/// padding for each dimension followed by the trailing padding for each
/// dimension.
#[derive(Clone, Copy, Debug)]
pub struct ConvGeometry<'a> {
    /// Spatial dimension count (1 or 2; a 1-D dispatch runs over a
    /// degenerate trailing axis)
    pub dimensions: usize,
    /// Input shape: batch, channels, then spatial extents
    pub input_shape: &'a [usize],
    /// Kernel spatial shape
    pub kernel_shape: Option<&'a [usize]>,
    /// Dilation per spatial dimension
    pub dilation_shape: Option<&'a [usize]>,
    /// Leading then trailing padding per spatial dimension
    pub padding: Option<&'a [usize]>,
    /// Stride per spatial dimension
    pub stride_shape: Option<&'a [usize]>,
    /// Output shape: batch, channels, then spatial extents
    pub output_shape: &'a [usize],
    /// Channel group count
    pub group_count: usize,
}

/// Geometry of one pooling dispatch; fields as in [`ConvGeometry`].
#[derive(Clone, Copy, Debug)]
pub struct PoolGeometry<'a> {
    /// Spatial dimension count (1 or 2)
    pub dimensions: usize,
    /// Input shape: batch, channels, then spatial extents
    pub input_shape: &'a [usize],
    /// Kernel spatial shape; defaults to the input spatial shape, which
    /// yields global pooling
    pub kernel_shape: Option<&'a [usize]>,
    /// Dilation per spatial dimension
    pub dilation_shape: Option<&'a [usize]>,
    /// Leading then trailing padding per spatial dimension
    pub padding: Option<&'a [usize]>,
    /// Stride per spatial dimension
    pub stride_shape: Option<&'a [usize]>,
    /// Output shape: batch, channels, then spatial extents
    pub output_shape: &'a [usize],
}

// ============================================================================
// Validation
// ============================================================================

fn validate_positive(value: usize, name: &'static str, op: &'static str) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidArgument {
            arg: name,
            reason: format!("{op} requires {name} > 0, got 0"),
        });
    }
    Ok(())
}

fn validate_array_len(
    values: Option<&[usize]>,
    expected: usize,
    name: &'static str,
    op: &'static str,
) -> Result<()> {
    if let Some(values) = values {
        if values.len() != expected {
            return Err(Error::InvalidArgument {
                arg: name,
                reason: format!(
                    "{op} expects {expected} entries in {name}, got {}",
                    values.len()
                ),
            });
        }
    }
    Ok(())
}

/// Output extent of one dimension.
///
/// `output = floor((input + pad_begin + pad_end - dilation*(kernel-1) - 1) / stride) + 1`
fn output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    pad_begin: usize,
    pad_end: usize,
) -> usize {
    let span = dilation * (kernel - 1) + 1;
    let padded = input + pad_begin + pad_end;
    if padded < span {
        0
    } else {
        (padded - span) / stride + 1
    }
}

/// Shared geometry validation for convolution and pooling: ranks, array
/// lengths, positivity, and the consistency of the supplied output shape
/// with the computed per-dimension extents.
#[allow(clippy::too_many_arguments)]
fn validate_geometry(
    op: &'static str,
    dimensions: usize,
    input_shape: &[usize],
    kernel_shape: Option<&[usize]>,
    dilation_shape: Option<&[usize]>,
    padding: Option<&[usize]>,
    stride_shape: Option<&[usize]>,
    output_shape: &[usize],
) -> Result<()> {
    // The executors compute over two spatial dimensions; a 1-D dispatch
    // runs with a degenerate trailing axis.
    if dimensions == 0 || dimensions > 2 {
        return Err(Error::InvalidArgument {
            arg: "dimensions",
            reason: format!("{op} supports 1 or 2 spatial dimensions, got {dimensions}"),
        });
    }

    let rank = dimensions + 2;
    validate_array_len(Some(input_shape), rank, "input_shape", op)?;
    validate_array_len(Some(output_shape), rank, "output_shape", op)?;
    validate_array_len(kernel_shape, dimensions, "kernel_shape", op)?;
    validate_array_len(dilation_shape, dimensions, "dilation_shape", op)?;
    validate_array_len(padding, 2 * dimensions, "padding", op)?;
    validate_array_len(stride_shape, dimensions, "stride_shape", op)?;

    if input_shape[0] != output_shape[0] {
        return Err(Error::InvalidArgument {
            arg: "output_shape",
            reason: format!(
                "{op} requires matching batch counts, got {} and {}",
                input_shape[0], output_shape[0]
            ),
        });
    }

    let mut expected = output_shape.to_vec();
    for dim in 0..dimensions {
        let input = input_shape[2 + dim];
        let kernel = kernel_shape.map_or(input, |k| k[dim]);
        let dilation = dilation_shape.map_or(1, |d| d[dim]);
        let stride = stride_shape.map_or(1, |s| s[dim]);
        let (pad_begin, pad_end) = padding.map_or((0, 0), |p| (p[dim], p[dim + dimensions]));

        validate_positive(kernel, "kernel_shape", op)?;
        validate_positive(dilation, "dilation_shape", op)?;
        validate_positive(stride, "stride_shape", op)?;

        expected[2 + dim] = output_extent(input, kernel, stride, dilation, pad_begin, pad_end);
    }

    if expected[2..] != output_shape[2..] {
        return Err(Error::shape_mismatch(&expected, output_shape));
    }

    Ok(())
}

fn validate_buffer(len: usize, required: usize, arg: &'static str) -> Result<()> {
    if len < required {
        return Err(Error::BufferTooSmall { arg, required, got: len });
    }
    Ok(())
}

// ============================================================================
// Algorithm selection
// ============================================================================

/// Select the convolution variant from the prepared work block. The block
/// already holds per-group channel counts.
fn select_algorithm(block: &WorkBlock) -> ConvAlgorithm {
    let bs = block_size();

    if block.input_channels >= bs {
        if block.kernel_shape[0] == 1
            && block.kernel_shape[1] == 1
            && block.padding[0] == 0
            && block.padding[1] == 0
            && block.padding[work::MAX_DIMENSIONS] == 0
            && block.padding[work::MAX_DIMENSIONS + 1] == 0
        {
            ConvAlgorithm::Pointwise
        } else {
            ConvAlgorithm::Nchwc
        }
    } else if block.input_channels == 1 && block.output_channels == 1 {
        ConvAlgorithm::Depthwise
    } else {
        ConvAlgorithm::Nchw
    }
}

/// Validate a convolution geometry, derive its work block with per-group
/// channel counts, and select the algorithm variant.
fn prepare_conv(geometry: &ConvGeometry<'_>) -> Result<(WorkBlock, ConvAlgorithm)> {
    const OP: &str = "conv";

    validate_geometry(
        OP,
        geometry.dimensions,
        geometry.input_shape,
        geometry.kernel_shape,
        geometry.dilation_shape,
        geometry.padding,
        geometry.stride_shape,
        geometry.output_shape,
    )?;

    validate_positive(geometry.group_count, "group_count", OP)?;

    let input_channels = geometry.input_shape[1];
    let output_channels = geometry.output_shape[1];

    if !input_channels.is_multiple_of(geometry.group_count)
        || !output_channels.is_multiple_of(geometry.group_count)
    {
        return Err(Error::InvalidArgument {
            arg: "group_count",
            reason: format!(
                "{OP} requires channel counts ({input_channels}, {output_channels}) \
                 divisible by group_count ({})",
                geometry.group_count
            ),
        });
    }

    let mut block = prepare_work_block(
        geometry.dimensions,
        geometry.input_shape,
        geometry.kernel_shape,
        geometry.dilation_shape,
        geometry.padding,
        geometry.stride_shape,
        geometry.output_shape,
    );

    // Selection operates on per-group channel counts.
    block.input_channels /= geometry.group_count;
    block.output_channels /= geometry.group_count;

    let algorithm = select_algorithm(&block);

    // The blocked paths require whole channel blocks per group; the NCHW
    // path blocks only its output.
    let bs = block_size();
    match algorithm {
        ConvAlgorithm::Nchwc | ConvAlgorithm::Pointwise => {
            if !block.input_channels.is_multiple_of(bs)
                || !block.output_channels.is_multiple_of(bs)
            {
                return Err(Error::InvalidArgument {
                    arg: "input_shape",
                    reason: format!(
                        "{OP} requires per-group channels ({}, {}) to be multiples \
                         of the block size ({bs}) on the blocked path",
                        block.input_channels, block.output_channels
                    ),
                });
            }
        }
        ConvAlgorithm::Nchw => {
            if !block.output_channels.is_multiple_of(bs) {
                return Err(Error::InvalidArgument {
                    arg: "output_shape",
                    reason: format!(
                        "{OP} requires per-group output channels ({}) to be a \
                         multiple of the block size ({bs})",
                        block.output_channels
                    ),
                });
            }
        }
        ConvAlgorithm::Depthwise => {}
    }

    Ok((block, algorithm))
}

/// Return the convolution variant this engine will select for `geometry`.
///
/// Callers use this to pre-pack the filter tensor into the matching
/// layout before invoking [`conv`].
pub fn conv_algorithm(geometry: &ConvGeometry<'_>) -> Result<ConvAlgorithm> {
    prepare_conv(geometry).map(|(_, algorithm)| algorithm)
}

// ============================================================================
// Entry points
// ============================================================================

/// Compute a 2-D convolution over channel-blocked tensors.
///
/// The filter must be pre-packed for the variant [`conv_algorithm`]
/// selects. When `zero_mode` is false the convolution accumulates into the
/// existing output contents instead of overwriting them. The call blocks
/// until every worker has finished; workers write disjoint output regions
/// and the result is identical for any worker count.
///
/// # Errors
///
/// Fails when the geometry is inconsistent, a channel count violates the
/// selected variant's blocking requirements, or a buffer is too small for
/// the described tensors.
#[allow(clippy::too_many_arguments)]
pub fn conv(
    geometry: &ConvGeometry<'_>,
    input: &[f32],
    filter: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
    activation: Activation,
    zero_mode: bool,
    thread_pool: &dyn ThreadPool,
) -> Result<()> {
    let (mut block, algorithm) = prepare_conv(geometry)?;

    let bs = block_size();
    let group_count = geometry.group_count;
    let batch = block.batch_count;

    // Buffer lower bounds in the blocked layouts. Depthwise tensors round
    // the group count up to whole blocks.
    let (input_len, filter_len, output_len, bias_len) = match algorithm {
        ConvAlgorithm::Nchwc | ConvAlgorithm::Pointwise | ConvAlgorithm::Nchw => (
            batch * group_count * block.input_channels * block.input_size,
            group_count * block.output_channels * block.input_channels * block.kernel_size(),
            batch * group_count * block.output_channels * block.output_size,
            group_count * block.output_channels,
        ),
        ConvAlgorithm::Depthwise => {
            let blocked_groups = group_count.div_ceil(bs) * bs;
            (
                batch * blocked_groups * block.input_size,
                blocked_groups * block.kernel_size(),
                batch * blocked_groups * block.output_size,
                blocked_groups,
            )
        }
    };

    validate_buffer(input.len(), input_len, "input")?;
    validate_buffer(filter.len(), filter_len, "filter")?;
    validate_buffer(output.len(), output_len, "output")?;
    if let Some(bias) = bias {
        validate_buffer(bias.len(), bias_len, "bias")?;
    }

    if batch == 0 || block.output_size == 0 {
        return Ok(());
    }

    block.thread_count = thread_pool.max_threads().max(1);

    let work = ConvWorkBlock {
        base: block,
        input: input.as_ptr(),
        filter: filter.as_ptr(),
        bias: bias.map_or(ptr::null(), |b| b.as_ptr()),
        output: output.as_mut_ptr(),
        group_count,
        activation,
        zero_mode,
    };

    let routine: unsafe fn(&ConvWorkBlock, usize) = match algorithm {
        ConvAlgorithm::Pointwise => conv::execute_pointwise,
        ConvAlgorithm::Nchwc => conv::execute_nchwc,
        ConvAlgorithm::Depthwise => conv::execute_depthwise,
        ConvAlgorithm::Nchw => conv::execute_nchw,
    };

    let work_ref = &work;
    let thread_count = work.base.thread_count;
    thread_pool.execute(thread_count, &|index| unsafe { routine(work_ref, index) });

    Ok(())
}

/// Compute a 2-D pooling operation over channel-blocked tensors.
///
/// The call blocks until every worker has finished.
///
/// # Errors
///
/// Fails when the geometry is inconsistent, the channel counts differ
/// between input and output, or a buffer is too small for the described
/// tensors.
pub fn pool(
    kind: PoolingKind,
    geometry: &PoolGeometry<'_>,
    input: &[f32],
    output: &mut [f32],
    thread_pool: &dyn ThreadPool,
) -> Result<()> {
    const OP: &str = "pool";

    validate_geometry(
        OP,
        geometry.dimensions,
        geometry.input_shape,
        geometry.kernel_shape,
        geometry.dilation_shape,
        geometry.padding,
        geometry.stride_shape,
        geometry.output_shape,
    )?;

    if geometry.input_shape[1] != geometry.output_shape[1] {
        return Err(Error::InvalidArgument {
            arg: "output_shape",
            reason: format!(
                "{OP} preserves the channel count, got {} and {}",
                geometry.input_shape[1], geometry.output_shape[1]
            ),
        });
    }

    let mut block = prepare_work_block(
        geometry.dimensions,
        geometry.input_shape,
        geometry.kernel_shape,
        geometry.dilation_shape,
        geometry.padding,
        geometry.stride_shape,
        geometry.output_shape,
    );

    let bs = block_size();
    let channel_blocks = (block.batch_count * block.input_channels).div_ceil(bs);
    validate_buffer(input.len(), channel_blocks * bs * block.input_size, "input")?;
    validate_buffer(
        output.len(),
        channel_blocks * bs * block.output_size,
        "output",
    )?;

    if block.batch_count == 0 || block.output_size == 0 || block.input_channels == 0 {
        return Ok(());
    }

    block.thread_count = thread_pool.max_threads().max(1);

    let work = PoolWorkBlock {
        base: block,
        input: input.as_ptr(),
        output: output.as_mut_ptr(),
        kind,
    };

    let work_ref = &work;
    let thread_count = work.base.thread_count;
    thread_pool.execute(thread_count, &|index| unsafe {
        pool::execute_pool(work_ref, index)
    });

    Ok(())
}

//! Work block preparation and partitioning
//!
//! A work block is the read-only context one dispatch shares with its
//! workers: sanitized per-dimension shape parameters plus, for each spatial
//! dimension, the three output span counts that drive the boundary
//! handling. For a dimension with input extent `i`, kernel `k`, dilation
//! `d`, stride `s` and leading padding `p`, the dilated kernel span is
//! `d * (k - 1) + 1`; `output_count` is the number of output positions
//! whose taps all read valid input, `output_count_left_pad` the leading
//! positions that may touch leading padding, and `output_count_right_pad`
//! the trailing positions that may touch trailing padding. The three always
//! sum to the output extent.

use crate::activation::Activation;
use crate::nchwc::PoolingKind;

/// Dimension capacity of a work block. Dispatches with fewer spatial
/// dimensions leave the trailing dimensions at their identity defaults, so
/// a 1-D dispatch degenerates to a 2-D one over a singleton axis.
pub(crate) const MAX_DIMENSIONS: usize = 3;

/// Shared shape context for one NCHWc dispatch (convolution or pooling).
#[derive(Clone, Debug, Default)]
pub(crate) struct WorkBlock {
    /// Worker count the dispatch is partitioned across
    pub thread_count: usize,
    pub batch_count: usize,
    /// Input channels; divided by the group count on the convolution path
    pub input_channels: usize,
    /// Output channels; divided by the group count on the convolution path
    pub output_channels: usize,
    pub input_shape: [usize; MAX_DIMENSIONS],
    pub input_size: usize,
    pub output_shape: [usize; MAX_DIMENSIONS],
    pub output_size: usize,
    pub kernel_shape: [usize; MAX_DIMENSIONS],
    pub dilation_shape: [usize; MAX_DIMENSIONS],
    /// Leading padding per dimension at `[dim]`, trailing padding at
    /// `[dim + MAX_DIMENSIONS]`
    pub padding: [usize; 2 * MAX_DIMENSIONS],
    pub stride_shape: [usize; MAX_DIMENSIONS],
    pub output_count_left_pad: [usize; MAX_DIMENSIONS],
    pub output_count: [usize; MAX_DIMENSIONS],
    pub output_count_right_pad: [usize; MAX_DIMENSIONS],
}

impl WorkBlock {
    /// Total kernel tap count across the spatial dimensions.
    pub fn kernel_size(&self) -> usize {
        self.kernel_shape.iter().product()
    }
}

/// Worker context for a convolution dispatch.
///
/// The buffer pointers are the dispatch-wide originals; each worker copies
/// them into cursors that it advances privately. Shared read-only across
/// workers for the lifetime of one dispatch.
pub(crate) struct ConvWorkBlock {
    pub base: WorkBlock,
    pub input: *const f32,
    pub filter: *const f32,
    /// Null when the dispatch carries no bias
    pub bias: *const f32,
    pub output: *mut f32,
    pub group_count: usize,
    pub activation: Activation,
    /// When false, the first channel tile accumulates into existing output
    pub zero_mode: bool,
}

// Workers read the shared tensors and write disjoint byte ranges of the
// output; the partitioning by flattened work index guarantees no two
// workers touch the same output element.
unsafe impl Sync for ConvWorkBlock {}

/// Worker context for a pooling dispatch.
pub(crate) struct PoolWorkBlock {
    pub base: WorkBlock,
    pub input: *const f32,
    pub output: *mut f32,
    pub kind: PoolingKind,
}

// Same disjoint-write contract as ConvWorkBlock.
unsafe impl Sync for PoolWorkBlock {}

/// Populate a work block from the dispatch geometry.
///
/// Optional parameter arrays default per the ONNX conventions: a missing
/// kernel shape copies the input spatial shape (global pooling), dilation
/// defaults to one, padding to zero, stride to one. Shape validity is a
/// precondition; this routine performs no error checking.
pub(crate) fn prepare_work_block(
    dimensions: usize,
    input_shape: &[usize],
    kernel_shape: Option<&[usize]>,
    dilation_shape: Option<&[usize]>,
    padding: Option<&[usize]>,
    stride_shape: Option<&[usize]>,
    output_shape: &[usize],
) -> WorkBlock {
    let mut block = WorkBlock {
        batch_count: input_shape[0],
        input_channels: input_shape[1],
        output_channels: output_shape[1],
        input_shape: [1; MAX_DIMENSIONS],
        output_shape: [1; MAX_DIMENSIONS],
        kernel_shape: [1; MAX_DIMENSIONS],
        dilation_shape: [1; MAX_DIMENSIONS],
        padding: [0; 2 * MAX_DIMENSIONS],
        stride_shape: [1; MAX_DIMENSIONS],
        ..WorkBlock::default()
    };

    // The leading batch and channel counts were extracted above; the
    // remaining entries are the spatial extents.
    let input_shape = &input_shape[2..];
    let output_shape = &output_shape[2..];

    for dim in 0..dimensions {
        block.input_shape[dim] = input_shape[dim];
        block.output_shape[dim] = output_shape[dim];

        if let Some(kernel_shape) = kernel_shape {
            block.kernel_shape[dim] = kernel_shape[dim];
        } else {
            block.kernel_shape[dim] = input_shape[dim];
        }

        if let Some(dilation_shape) = dilation_shape {
            block.dilation_shape[dim] = dilation_shape[dim];
        }

        if let Some(padding) = padding {
            block.padding[dim] = padding[dim];
            block.padding[dim + MAX_DIMENSIONS] = padding[dim + dimensions];
        }

        if let Some(stride_shape) = stride_shape {
            block.stride_shape[dim] = stride_shape[dim];
        }
    }

    block.input_size = block.input_shape.iter().product();
    block.output_size = block.output_shape.iter().product();

    for dim in 0..MAX_DIMENSIONS {
        let input_value = block.input_shape[dim];
        let output_value = block.output_shape[dim];
        let span = block.dilation_shape[dim] * (block.kernel_shape[dim] - 1) + 1;
        let stride = block.stride_shape[dim];
        let padding_left = block.padding[dim];

        let output_count = if input_value >= span {
            (input_value - span) / stride + 1
        } else {
            0
        };

        let output_count_with_left_pad = if input_value + padding_left >= span {
            (input_value + padding_left - span) / stride + 1
        } else {
            output_value
        };

        let mut output_count_left_pad = output_count_with_left_pad - output_count;
        let mut output_count = output_count;

        // Force the first output position onto the boundary path whenever
        // leading padding exists, even if its taps happen to stay in
        // bounds: the kernels generate the leading strip with the same
        // generator as the trailing strip, and that generator expects at
        // least one column when the input pointer is offset by the pad.
        if output_count_left_pad == 0 && padding_left > 0 {
            output_count_left_pad = 1;
            output_count -= 1;
        }

        let output_count_right_pad = output_value - output_count_with_left_pad;

        block.output_count_left_pad[dim] = output_count_left_pad;
        block.output_count[dim] = output_count;
        block.output_count_right_pad[dim] = output_count_right_pad;
    }

    block
}

/// Split `total_work` items across `thread_count` workers, returning the
/// contiguous range `(start, count)` owned by worker `index`.
///
/// The first `total_work % thread_count` workers receive one extra item;
/// ranges are contiguous, disjoint, and cover `[0, total_work)` exactly.
/// Workers beyond the work count receive an empty range.
pub(crate) fn partition_work(index: usize, thread_count: usize, total_work: usize) -> (usize, usize) {
    let work_per_thread = total_work / thread_count;
    let work_per_thread_extra = total_work % thread_count;

    if index < work_per_thread_extra {
        ((work_per_thread + 1) * index, work_per_thread + 1)
    } else {
        (
            work_per_thread * index + work_per_thread_extra,
            work_per_thread,
        )
    }
}

/// Result of trimming the vertical kernel extent at a tensor edge.
pub(crate) struct EffectiveKernel {
    /// First valid input row the kernel reads
    pub input_row: usize,
    /// Kernel rows remaining after trimming
    pub height: usize,
    /// Leading kernel rows skipped; the caller advances its filter cursor
    /// past these rows
    pub leading_rows: usize,
}

/// Trim the kernel height for output row `ph` so that only valid input
/// rows remain.
///
/// The starting input row is computed in wrapping arithmetic: rows in the
/// leading padding wrap to large values and fail the `< input_extent`
/// comparison, so the same walk handles both edges. For each kernel row
/// that falls outside the input, the height shrinks; while the invalid row
/// is still the starting row, the start also advances by the dilation and
/// the skipped-row count grows. Rows strictly inside the interior span skip
/// the walk entirely.
pub(crate) fn effective_kernel(
    ph: usize,
    stride: usize,
    padding_left: usize,
    output_count_left_pad: usize,
    output_count: usize,
    kernel: usize,
    dilation: usize,
    input_extent: usize,
) -> EffectiveKernel {
    let mut input_row = (ph * stride).wrapping_sub(padding_left);
    let mut height = kernel;
    let mut leading_rows = 0;

    if ph.wrapping_sub(output_count_left_pad) >= output_count {
        let mut step = input_row;

        for _kh in 0..kernel {
            if step >= input_extent {
                if step == input_row {
                    input_row = input_row.wrapping_add(dilation);
                    leading_rows += 1;
                }
                height -= 1;
            }
            step = step.wrapping_add(dilation);
        }
    }

    EffectiveKernel {
        input_row,
        height,
        leading_rows,
    }
}

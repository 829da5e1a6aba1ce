//! Pooling executor
//!
//! Pooling shares the shape arithmetic and boundary machinery of the
//! convolution path but has no channel accumulation: each work item is one
//! output row of one channel block, produced by a single kernel call. The
//! pooling kind selects the kernel; there is no flag word and no epilogue.

use crate::kernels::PoolKernelArgs;
use crate::nchwc::work::{PoolWorkBlock, effective_kernel, partition_work};
use crate::platform::platform;

const HEIGHT_SHAPE_INDEX: usize = 0;
const WIDTH_SHAPE_INDEX: usize = 1;

/// Pooling executor over NCHWc input.
///
/// # Safety
///
/// The work block must describe valid, non-aliased tensors in the blocked
/// layout, with buffers sized for the channel count rounded up to the
/// block size.
pub(crate) unsafe fn execute_pool(work: &PoolWorkBlock, index: usize) {
    let base = &work.base;
    let bs = platform().block_size;

    let input_height = base.input_shape[HEIGHT_SHAPE_INDEX];
    let input_width = base.input_shape[WIDTH_SHAPE_INDEX];
    let output_height = base.output_shape[HEIGHT_SHAPE_INDEX];
    let output_width = base.output_shape[WIDTH_SHAPE_INDEX];
    let kernel_height = base.kernel_shape[HEIGHT_SHAPE_INDEX];
    let kernel_width = base.kernel_shape[WIDTH_SHAPE_INDEX];
    let dilation_height = base.dilation_shape[HEIGHT_SHAPE_INDEX];
    let dilation_width = base.dilation_shape[WIDTH_SHAPE_INDEX];
    let padding_left_y = base.padding[HEIGHT_SHAPE_INDEX];
    let padding_left_x = base.padding[WIDTH_SHAPE_INDEX];
    let stride_height = base.stride_shape[HEIGHT_SHAPE_INDEX];

    let total_work =
        (base.batch_count * base.input_channels).div_ceil(bs) * output_height;

    let (work_index, mut work_remaining) =
        partition_work(index, base.thread_count, total_work);

    let mut ph = work_index % output_height;
    let batch_channel = work_index / output_height;

    let mut input = work
        .input
        .wrapping_add(batch_channel * bs * base.input_size);
    let mut output = work.output.wrapping_add(work_index * bs * output_width);

    let stride_width = bs * base.stride_shape[WIDTH_SHAPE_INDEX];
    let dilation_width_elements = bs * dilation_width;
    let input_width_elements = bs * input_width;
    let dilated_input_width = bs * dilation_height * input_width;
    let input_stride = dilated_input_width.wrapping_sub(kernel_width * dilation_width_elements);

    let kernel = platform().pool_kernel(work.kind);

    while work_remaining > 0 {
        // Trim the vertical kernel extent when the output row reads
        // padding rows, so the kernel sees only valid input rows. The
        // divisor for include-pad averaging stays the full kernel size.
        let trimmed = effective_kernel(
            ph,
            stride_height,
            padding_left_y,
            base.output_count_left_pad[HEIGHT_SHAPE_INDEX],
            base.output_count[HEIGHT_SHAPE_INDEX],
            kernel_height,
            dilation_height,
            input_height,
        );

        let args = PoolKernelArgs {
            block_size: bs,
            input: input.wrapping_add(bs.wrapping_mul(
                trimmed
                    .input_row
                    .wrapping_mul(input_width)
                    .wrapping_sub(padding_left_x),
            )),
            output,
            stride_width,
            dilation_width: dilation_width_elements,
            input_stride,
            kernel_size: kernel_height * kernel_width,
            kernel_height: trimmed.height,
            kernel_width,
            input_base: input
                .wrapping_add(bs.wrapping_mul(trimmed.input_row.wrapping_mul(input_width))),
            input_width: input_width_elements,
            dilated_input_width,
            output_count_left_pad: base.output_count_left_pad[WIDTH_SHAPE_INDEX],
            output_count: base.output_count[WIDTH_SHAPE_INDEX],
            output_count_right_pad: base.output_count_right_pad[WIDTH_SHAPE_INDEX],
        };
        kernel(&args);

        output = output.wrapping_add(bs * output_width);

        work_remaining -= 1;

        ph += 1;
        if ph == output_height {
            input = input.wrapping_add(bs * base.input_size);
            ph = 0;
        }
    }
}

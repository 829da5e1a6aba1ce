//! Convolution executors
//!
//! Each executor maps a worker's contiguous range of flattened work items
//! onto (batch, group, filter set, output row) positions, advances private
//! copies of the buffer pointers incrementally as the range progresses, and
//! invokes the platform microkernel once per output row and input channel
//! tile. Pointers are never recomputed from scratch inside the loop; the
//! state machine advances them on each axis wrap, and resets the filter and
//! bias cursors to the dispatch originals when the last group completes
//! (groups share filter memory across batches).
//!
//! Cursor arithmetic uses wrapping pointer operations: a cursor may sit one
//! step past its buffer between iterations (or before it, by the left
//! padding offset), and is only dereferenced through the microkernel
//! bounds-checked paths.

use crate::activation::Activation;
use crate::kernels::{ConvDepthwiseKernelArgs, ConvKernelArgs, ConvPointwiseKernelArgs, flags};
use crate::nchwc::work::{ConvWorkBlock, effective_kernel, partition_work};
use crate::platform::platform;

const HEIGHT_SHAPE_INDEX: usize = 0;
const WIDTH_SHAPE_INDEX: usize = 1;

/// Number of output channel blocks co-resident in the inner loop of the
/// grouped executors; amortizes input reloads across filter blocks.
pub(crate) const FILTER_SET_SIZE: usize = 4;

/// Input channels batched per pointwise kernel call. Smaller batches flush
/// partial sums to the output tensor more often; larger ones thrash the
/// cache.
const MAXIMUM_INPUT_CHANNEL_BATCH: usize = 128;

/// Work-block values captured as local constants, plus the buffer cursors a
/// worker advances as it steps through the operation.
struct ConvState<'a> {
    work: &'a ConvWorkBlock,
    block_size: usize,
    batch_count: usize,
    input_channels: usize,
    output_channels: usize,
    input_height: usize,
    input_width: usize,
    input_size: usize,
    output_height: usize,
    output_width: usize,
    output_size: usize,
    kernel_height: usize,
    kernel_width: usize,
    kernel_size: usize,
    dilation_height: usize,
    dilation_width: usize,
    padding_left_y: usize,
    padding_left_x: usize,
    stride_height: usize,
    stride_width: usize,
    output_count_left_pad_y: usize,
    output_count_y: usize,
    output_count_left_pad_x: usize,
    output_count_x: usize,
    output_count_right_pad_x: usize,
    group_count: usize,
    activation: Activation,
    zero_mode: bool,
    input: *const f32,
    filter: *const f32,
    bias: *const f32,
    output: *mut f32,
}

impl<'a> ConvState<'a> {
    fn new(work: &'a ConvWorkBlock) -> Self {
        let base = &work.base;
        ConvState {
            work,
            block_size: platform().block_size,
            batch_count: base.batch_count,
            input_channels: base.input_channels,
            output_channels: base.output_channels,
            input_height: base.input_shape[HEIGHT_SHAPE_INDEX],
            input_width: base.input_shape[WIDTH_SHAPE_INDEX],
            input_size: base.input_size,
            output_height: base.output_shape[HEIGHT_SHAPE_INDEX],
            output_width: base.output_shape[WIDTH_SHAPE_INDEX],
            output_size: base.output_size,
            kernel_height: base.kernel_shape[HEIGHT_SHAPE_INDEX],
            kernel_width: base.kernel_shape[WIDTH_SHAPE_INDEX],
            kernel_size: base.kernel_shape[HEIGHT_SHAPE_INDEX] * base.kernel_shape[WIDTH_SHAPE_INDEX],
            dilation_height: base.dilation_shape[HEIGHT_SHAPE_INDEX],
            dilation_width: base.dilation_shape[WIDTH_SHAPE_INDEX],
            padding_left_y: base.padding[HEIGHT_SHAPE_INDEX],
            padding_left_x: base.padding[WIDTH_SHAPE_INDEX],
            stride_height: base.stride_shape[HEIGHT_SHAPE_INDEX],
            stride_width: base.stride_shape[WIDTH_SHAPE_INDEX],
            output_count_left_pad_y: base.output_count_left_pad[HEIGHT_SHAPE_INDEX],
            output_count_y: base.output_count[HEIGHT_SHAPE_INDEX],
            output_count_left_pad_x: base.output_count_left_pad[WIDTH_SHAPE_INDEX],
            output_count_x: base.output_count[WIDTH_SHAPE_INDEX],
            output_count_right_pad_x: base.output_count_right_pad[WIDTH_SHAPE_INDEX],
            group_count: work.group_count,
            activation: work.activation,
            zero_mode: work.zero_mode,
            input: work.input,
            filter: work.filter,
            bias: work.bias,
            output: work.output,
        }
    }

    /// Trim the vertical kernel extent for output row `ph` and advance the
    /// filter cursor past the skipped leading rows, so the microkernel sees
    /// a contiguous, fully valid slab of kernel rows.
    fn compute_effective_kernel(
        &self,
        ph: usize,
        filter_stride: usize,
        filter: &mut *const f32,
    ) -> (usize, usize) {
        let trimmed = effective_kernel(
            ph,
            self.stride_height,
            self.padding_left_y,
            self.output_count_left_pad_y,
            self.output_count_y,
            self.kernel_height,
            self.dilation_height,
            self.input_height,
        );
        *filter = filter.wrapping_add(trimmed.leading_rows * filter_stride);
        (trimmed.input_row, trimmed.height)
    }

    /// Build the flag word for one kernel call. Bias and activation bits
    /// are only set on the final-writer call, the one accumulating the last
    /// input channel tile of an output element.
    fn kernel_flags(&self, first_tile: bool, final_writer: bool) -> u32 {
        let mut word = 0;

        if !first_tile || !self.zero_mode {
            word |= flags::ACCUMULATE_OUTPUT;
        }

        if final_writer {
            if !self.bias.is_null() {
                word |= flags::BIAS_ADDITION;
            }

            match self.activation {
                Activation::Relu => word |= flags::RELU_ACTIVATION,
                Activation::Identity => {}
                _ => word |= flags::OTHER_ACTIVATION,
            }
        }

        word
    }

    /// Apply a non-fused activation in place over the tile the kernel just
    /// wrote.
    ///
    /// The tile is `filter_count` rows of `blocked_output_width` elements.
    /// Pointwise convolution may flatten several logical rows into one
    /// call, so the width can exceed one blocked output row. The row stride
    /// is the blocked output plane size so that successive rows land in the
    /// correct NCHWc output planes.
    unsafe fn deferred_activation(
        &self,
        output: *mut f32,
        filter_count: usize,
        blocked_output_width: usize,
    ) {
        self.activation.apply_strided(
            output,
            filter_count,
            blocked_output_width,
            self.block_size * self.output_size,
        );
    }
}

/// Shared work decomposition for the grouped convolution executors: the
/// flattened work index orders (batch, group, filter set, output row) with
/// the output row innermost.
struct GroupedConv<'a> {
    state: ConvState<'a>,
    filter_set_count: usize,
    ph: usize,
    filter_set: usize,
    group: usize,
    work_remaining: usize,
    filter_count: usize,
}

impl<'a> GroupedConv<'a> {
    fn new(work: &'a ConvWorkBlock) -> Self {
        let state = ConvState::new(work);
        let filter_set_count = state
            .output_channels
            .div_ceil(state.block_size * FILTER_SET_SIZE);
        GroupedConv {
            state,
            filter_set_count,
            ph: 0,
            filter_set: 0,
            group: 0,
            work_remaining: 0,
            filter_count: 0,
        }
    }

    /// Number of filter blocks resident in the current filter set; the last
    /// set of a group may be partial.
    fn compute_filter_count(&mut self) {
        let output_blocks = self.state.output_channels / self.state.block_size;
        self.filter_count = FILTER_SET_SIZE.min(output_blocks - self.filter_set * FILTER_SET_SIZE);
    }

    /// Decompose the worker's starting work index and advance the buffer
    /// cursors to that position.
    fn prepare_work(&mut self, index: usize) {
        let s = &mut self.state;
        let total_work =
            s.batch_count * s.group_count * self.filter_set_count * s.output_height;

        let (work_index, work_remaining) =
            partition_work(index, s.work.base.thread_count, total_work);
        self.work_remaining = work_remaining;

        self.ph = work_index % s.output_height;
        let batch_group_filter_set = work_index / s.output_height;

        self.filter_set = batch_group_filter_set % self.filter_set_count;
        let batch_group = batch_group_filter_set / self.filter_set_count;

        self.group = batch_group % s.group_count;

        // The batch-group index advances the input across batches and
        // groups in one step because groups partition the channels.
        let bs = s.block_size;
        s.input = s
            .input
            .wrapping_add(batch_group * s.input_channels * s.input_size);

        s.output = s
            .output
            .wrapping_add(batch_group * s.output_channels * s.output_size)
            .wrapping_add(bs * self.filter_set * FILTER_SET_SIZE * s.output_size);

        s.filter = s
            .filter
            .wrapping_add(self.group * s.output_channels * s.input_channels * s.kernel_size)
            .wrapping_add(bs * self.filter_set * FILTER_SET_SIZE * s.input_channels * s.kernel_size);

        if !s.bias.is_null() {
            s.bias = s
                .bias
                .wrapping_add(self.group * s.output_channels)
                .wrapping_add(bs * self.filter_set * FILTER_SET_SIZE);
        }

        self.compute_filter_count();
    }

    /// Account for finished output rows and step the cursors across filter
    /// set, group, and batch boundaries as axes wrap.
    fn complete_work(&mut self, work_this_iteration: usize) {
        self.work_remaining -= work_this_iteration;
        self.ph += work_this_iteration;

        if self.ph == self.state.output_height {
            let filter_count = self.filter_count;
            let s = &mut self.state;
            let blocked_filter_count = s.block_size * filter_count;

            s.output = s.output.wrapping_add(blocked_filter_count * s.output_size);
            s.filter = s
                .filter
                .wrapping_add(blocked_filter_count * s.input_channels * s.kernel_size);

            if !s.bias.is_null() {
                s.bias = s.bias.wrapping_add(blocked_filter_count);
            }

            self.filter_set += 1;
            if self.filter_set == self.filter_set_count {
                s.input = s.input.wrapping_add(s.input_channels * s.input_size);

                self.group += 1;
                if self.group == s.group_count {
                    s.filter = s.work.filter;
                    s.bias = s.work.bias;
                    self.group = 0;
                }

                self.filter_set = 0;
            }

            self.compute_filter_count();
            self.ph = 0;
        }
    }
}

/// Direct convolution executor over NCHWc input.
///
/// # Safety
///
/// The work block must describe valid, non-aliased tensors in the layouts
/// the NCHWc path expects, with per-group channel counts that are exact
/// multiples of the block size.
pub(crate) unsafe fn execute_nchwc(work: &ConvWorkBlock, index: usize) {
    let mut alg = GroupedConv::new(work);
    alg.prepare_work(index);

    let bs = alg.state.block_size;
    let stride_width = bs * alg.state.stride_width;
    let dilation_width = bs * alg.state.dilation_width;
    let filter_stride = bs * alg.state.input_channels * alg.state.kernel_size;
    let output_stride = bs * alg.state.output_size;
    let input_width = bs * alg.state.input_width;
    let dilated_input_width = bs * alg.state.dilation_height * alg.state.input_width;
    let input_stride = dilated_input_width.wrapping_sub(alg.state.kernel_width * dilation_width);
    let blocked_output_width = bs * alg.state.output_width;

    let kernel = platform().conv_nchwc_kernel;

    while alg.work_remaining > 0 {
        // Dequeue as many output rows as remain in this output image.
        let work_this_iteration = alg.work_remaining.min(alg.state.output_height - alg.ph);

        // Walk the input image as a set of channel blocks; the final block
        // carries the epilogue bits.
        let mut ic = 0;
        while ic < alg.state.input_channels {
            let word = alg
                .state
                .kernel_flags(ic == 0, ic + bs == alg.state.input_channels);

            let input = alg.state.input.wrapping_add(ic * alg.state.input_size);
            let mut output = alg.state.output.wrapping_add(alg.ph * blocked_output_width);

            for work in 0..work_this_iteration {
                let mut filter = alg
                    .state
                    .filter
                    .wrapping_add(bs * ic * alg.state.kernel_size);

                let (ih, effective_kernel_height) = alg.state.compute_effective_kernel(
                    alg.ph + work,
                    bs * bs * alg.state.kernel_width,
                    &mut filter,
                );

                let args = ConvKernelArgs {
                    block_size: bs,
                    input: input.wrapping_add(bs.wrapping_mul(
                        ih.wrapping_mul(alg.state.input_width)
                            .wrapping_sub(alg.state.padding_left_x),
                    )),
                    filter,
                    output,
                    stride_width,
                    dilation_width,
                    filter_count: alg.filter_count,
                    input_stride,
                    filter_stride,
                    output_stride,
                    kernel_height: effective_kernel_height,
                    kernel_width: alg.state.kernel_width,
                    input_base: input
                        .wrapping_add(bs.wrapping_mul(ih.wrapping_mul(alg.state.input_width))),
                    input_width,
                    dilated_input_width,
                    output_count_left_pad: alg.state.output_count_left_pad_x,
                    output_count: alg.state.output_count_x,
                    output_count_right_pad: alg.state.output_count_right_pad_x,
                    bias: alg.state.bias,
                    flags: word,
                };
                kernel(&args);

                if word & flags::OTHER_ACTIVATION != 0 {
                    alg.state
                        .deferred_activation(output, alg.filter_count, blocked_output_width);
                }

                output = output.wrapping_add(blocked_output_width);
            }

            ic += bs;
        }

        alg.complete_work(work_this_iteration);
    }
}

/// First-layer convolution executor: NCHW (unblocked) input producing
/// NCHWc output.
///
/// # Safety
///
/// Same contract as [`execute_nchwc`], with an unblocked input tensor and
/// arbitrary input channel count.
pub(crate) unsafe fn execute_nchw(work: &ConvWorkBlock, index: usize) {
    let mut alg = GroupedConv::new(work);
    alg.prepare_work(index);

    let bs = alg.state.block_size;
    // Input strides use the element size: the input is not blocked.
    let stride_width = alg.state.stride_width;
    let dilation_width = alg.state.dilation_width;
    let filter_stride = bs * alg.state.input_channels * alg.state.kernel_size;
    let output_stride = bs * alg.state.output_size;
    let input_width = alg.state.input_width;
    let dilated_input_width = alg.state.dilation_height * alg.state.input_width;
    let input_stride = dilated_input_width.wrapping_sub(alg.state.kernel_width * dilation_width);
    let blocked_output_width = bs * alg.state.output_width;

    let kernel = platform().conv_nchw_kernel;

    while alg.work_remaining > 0 {
        let mut filter = alg.state.filter;
        let (ih, effective_kernel_height) = alg.state.compute_effective_kernel(
            alg.ph,
            bs * alg.state.kernel_width,
            &mut filter,
        );

        // Walk the input one channel at a time; the final channel carries
        // the epilogue bits.
        let mut input = alg.state.input;
        let output = alg
            .state
            .output
            .wrapping_add(bs * alg.ph * alg.state.output_width);

        for icc in 0..alg.state.input_channels {
            let word = alg
                .state
                .kernel_flags(icc == 0, icc + 1 == alg.state.input_channels);

            let args = ConvKernelArgs {
                block_size: bs,
                input: input.wrapping_add(
                    ih.wrapping_mul(input_width)
                        .wrapping_sub(alg.state.padding_left_x),
                ),
                filter,
                output,
                stride_width,
                dilation_width,
                filter_count: alg.filter_count,
                input_stride,
                filter_stride,
                output_stride,
                kernel_height: effective_kernel_height,
                kernel_width: alg.state.kernel_width,
                input_base: input.wrapping_add(ih.wrapping_mul(input_width)),
                input_width,
                dilated_input_width,
                output_count_left_pad: alg.state.output_count_left_pad_x,
                output_count: alg.state.output_count_x,
                output_count_right_pad: alg.state.output_count_right_pad_x,
                bias: alg.state.bias,
                flags: word,
            };
            kernel(&args);

            if word & flags::OTHER_ACTIVATION != 0 {
                alg.state
                    .deferred_activation(output, alg.filter_count, blocked_output_width);
            }

            input = input.wrapping_add(alg.state.input_size);
            filter = filter.wrapping_add(bs * alg.state.kernel_size);
        }

        alg.complete_work(1);
    }
}

/// Pointwise (1x1, unpadded) convolution executor.
///
/// # Safety
///
/// Same contract as [`execute_nchwc`]; the kernel shape must be 1x1 with
/// zero padding.
pub(crate) unsafe fn execute_pointwise(work: &ConvWorkBlock, index: usize) {
    let mut alg = GroupedConv::new(work);
    alg.prepare_work(index);

    let bs = alg.state.block_size;
    let stride_width = bs * alg.state.stride_width;
    let input_stride = bs * alg.state.input_size;
    let filter_stride = bs * alg.state.input_channels;
    let output_stride = bs * alg.state.output_size;

    let kernel = platform().conv_pointwise_kernel;

    while alg.work_remaining > 0 {
        // An unstrided convolution has no gaps between the input reads of
        // adjacent output rows, so the remaining rows of the image flatten
        // into a single long row; a strided convolution emits one row at a
        // time. This flattening is only sound with no kernel extent.
        let work_this_iteration = if alg.state.stride_height == 1 && alg.state.stride_width == 1 {
            alg.work_remaining.min(alg.state.output_height - alg.ph)
        } else {
            1
        };

        let output_this_iteration = work_this_iteration * alg.state.output_width;

        let mut input = alg.state.input.wrapping_add(
            bs * (alg.ph * alg.state.stride_height * alg.state.input_width),
        );
        let mut filter = alg.state.filter;
        let output = alg
            .state
            .output
            .wrapping_add(bs * alg.ph * alg.state.output_width);

        // Batch the input channels to balance cache residency against
        // partial-sum flushing; the final batch carries the epilogue bits.
        let mut ic = 0;
        while ic < alg.state.input_channels {
            let input_channel_batch =
                (alg.state.input_channels - ic).min(MAXIMUM_INPUT_CHANNEL_BATCH);

            let word = alg.state.kernel_flags(
                ic == 0,
                ic + input_channel_batch == alg.state.input_channels,
            );

            let args = ConvPointwiseKernelArgs {
                block_size: bs,
                input,
                filter,
                output,
                stride_width,
                input_channels: input_channel_batch / bs,
                filter_count: alg.filter_count,
                input_stride,
                filter_stride,
                output_stride,
                output_count: output_this_iteration,
                bias: alg.state.bias,
                flags: word,
            };
            kernel(&args);

            if word & flags::OTHER_ACTIVATION != 0 {
                alg.state.deferred_activation(
                    output,
                    alg.filter_count,
                    bs * output_this_iteration,
                );
            }

            input = input.wrapping_add(MAXIMUM_INPUT_CHANNEL_BATCH * alg.state.input_size);
            filter = filter.wrapping_add(bs * MAXIMUM_INPUT_CHANNEL_BATCH);
            ic += input_channel_batch;
        }

        alg.complete_work(work_this_iteration);
    }
}

/// Depthwise convolution executor: one channel per group, processed as
/// channel blocks of independent lanes.
///
/// # Safety
///
/// The work block must describe valid, non-aliased tensors in the
/// depthwise layouts, with buffers sized for the group count rounded up to
/// the block size.
pub(crate) unsafe fn execute_depthwise(work: &ConvWorkBlock, index: usize) {
    let mut state = ConvState::new(work);
    let bs = state.block_size;

    let group_block_count = state.group_count.div_ceil(bs);
    let total_work = state.batch_count * group_block_count * state.output_height;

    let (work_index, mut work_remaining) =
        partition_work(index, work.base.thread_count, total_work);

    let mut ph = work_index % state.output_height;
    let batch_group = work_index / state.output_height;
    let mut group = batch_group % group_block_count;

    state.input = state
        .input
        .wrapping_add(batch_group * bs * state.input_size);
    state.output = state
        .output
        .wrapping_add(work_index * bs * state.output_width);
    state.filter = state.filter.wrapping_add(group * bs * state.kernel_size);

    if !state.bias.is_null() {
        state.bias = state.bias.wrapping_add(bs * group);
    }

    let stride_width = bs * state.stride_width;
    let dilation_width = bs * state.dilation_width;
    let input_width = bs * state.input_width;
    let dilated_input_width = bs * state.dilation_height * state.input_width;
    let input_stride = dilated_input_width.wrapping_sub(state.kernel_width * dilation_width);
    let blocked_output_width = bs * state.output_width;

    let kernel = platform().conv_depthwise_kernel;

    while work_remaining > 0 {
        let mut filter = state.filter;
        let (ih, effective_kernel_height) =
            state.compute_effective_kernel(ph, bs * state.kernel_width, &mut filter);

        // There is no channel tile loop, so every call is the final writer
        // and carries the full epilogue.
        let word = state.kernel_flags(true, true);

        let args = ConvDepthwiseKernelArgs {
            block_size: bs,
            input: state.input.wrapping_add(bs.wrapping_mul(
                ih.wrapping_mul(state.input_width)
                    .wrapping_sub(state.padding_left_x),
            )),
            filter,
            output: state.output,
            stride_width,
            dilation_width,
            input_stride,
            kernel_height: effective_kernel_height,
            kernel_width: state.kernel_width,
            input_base: state
                .input
                .wrapping_add(bs.wrapping_mul(ih.wrapping_mul(state.input_width))),
            input_width,
            dilated_input_width,
            output_count_left_pad: state.output_count_left_pad_x,
            output_count: state.output_count_x,
            output_count_right_pad: state.output_count_right_pad_x,
            bias: state.bias,
            flags: word,
        };
        kernel(&args);

        if word & flags::OTHER_ACTIVATION != 0 {
            state.deferred_activation(state.output, 1, blocked_output_width);
        }

        state.output = state.output.wrapping_add(blocked_output_width);

        work_remaining -= 1;

        ph += 1;
        if ph == state.output_height {
            state.input = state.input.wrapping_add(bs * state.input_size);
            state.filter = state.filter.wrapping_add(bs * state.kernel_size);

            if !state.bias.is_null() {
                state.bias = state.bias.wrapping_add(bs);
            }

            group += 1;
            if group == group_block_count {
                state.filter = work.filter;
                state.bias = work.bias;
                group = 0;
            }

            ph = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nchwc::work::{WorkBlock, prepare_work_block};
    use std::ptr;

    fn conv_block(
        input_channels: usize,
        output_channels: usize,
        zero_mode: bool,
        activation: Activation,
        with_bias: bool,
    ) -> ConvWorkBlock {
        let bs = platform().block_size;
        let mut base: WorkBlock = prepare_work_block(
            2,
            &[1, input_channels, 4, 4],
            Some(&[1, 1]),
            None,
            None,
            None,
            &[1, output_channels, 4, 4],
        );
        base.thread_count = 1;
        ConvWorkBlock {
            base,
            input: ptr::null(),
            filter: ptr::null(),
            bias: if with_bias {
                // Only nullness is inspected by the flag builder.
                bs as *const f32
            } else {
                ptr::null()
            },
            output: ptr::null_mut(),
            group_count: 1,
            activation,
            zero_mode,
        }
    }

    #[test]
    fn test_kernel_flags_first_tile() {
        let bs = platform().block_size;
        let work = conv_block(2 * bs, bs, true, Activation::Identity, false);
        let state = ConvState::new(&work);

        // Zero mode: the first tile overwrites, later tiles accumulate.
        assert_eq!(state.kernel_flags(true, false), 0);
        assert_eq!(state.kernel_flags(false, false), flags::ACCUMULATE_OUTPUT);
    }

    #[test]
    fn test_kernel_flags_accumulate_mode() {
        let bs = platform().block_size;
        let work = conv_block(2 * bs, bs, false, Activation::Identity, false);
        let state = ConvState::new(&work);

        // Without zero mode every tile accumulates, including the first.
        assert_eq!(state.kernel_flags(true, false), flags::ACCUMULATE_OUTPUT);
    }

    #[test]
    fn test_kernel_flags_final_writer_only() {
        let bs = platform().block_size;
        let work = conv_block(2 * bs, bs, true, Activation::Relu, true);
        let state = ConvState::new(&work);

        // Bias and activation bits appear only on the final writer.
        assert_eq!(state.kernel_flags(false, false), flags::ACCUMULATE_OUTPUT);
        assert_eq!(
            state.kernel_flags(false, true),
            flags::ACCUMULATE_OUTPUT | flags::BIAS_ADDITION | flags::RELU_ACTIVATION
        );
    }

    #[test]
    fn test_kernel_flags_deferred_activation() {
        let bs = platform().block_size;
        let work = conv_block(bs, bs, true, Activation::Sigmoid, false);
        let state = ConvState::new(&work);

        let word = state.kernel_flags(true, true);
        assert_eq!(word, flags::OTHER_ACTIVATION);
    }

    #[test]
    fn test_grouped_prepare_work_decomposition() {
        let bs = platform().block_size;
        // Two batches, one group, two filter sets (FILTER_SET_SIZE + 1
        // output blocks), output height 4.
        let mut work = conv_block(
            bs,
            (FILTER_SET_SIZE + 1) * bs,
            true,
            Activation::Identity,
            false,
        );
        work.base.batch_count = 2;

        let mut alg = GroupedConv::new(&work);
        assert_eq!(alg.filter_set_count, 2);

        // Work item 13 = batch 1, filter set 1, output row 1 with an
        // output height of 4.
        alg.prepare_work(0);
        let total = 2 * 2 * 4;
        assert_eq!(alg.work_remaining, total);

        let mut alg = GroupedConv::new(&work);
        work_index_check(&mut alg, 13);
    }

    fn work_index_check(alg: &mut GroupedConv<'_>, work_index: usize) {
        // Walk the state machine to the target work index one row at a
        // time and confirm the decomposition against quotient/remainder.
        alg.prepare_work(0);
        for _ in 0..work_index {
            alg.complete_work(
                1.min(alg.state.output_height - alg.ph).min(alg.work_remaining),
            );
        }
        let output_height = alg.state.output_height;
        assert_eq!(alg.ph, work_index % output_height);
        let batch_group_filter_set = work_index / output_height;
        assert_eq!(alg.filter_set, batch_group_filter_set % alg.filter_set_count);
    }

    #[test]
    fn test_partial_filter_set_count() {
        let bs = platform().block_size;
        let work = conv_block(
            bs,
            (FILTER_SET_SIZE + 1) * bs,
            true,
            Activation::Identity,
            false,
        );

        let mut alg = GroupedConv::new(&work);
        alg.prepare_work(0);
        assert_eq!(alg.filter_count, FILTER_SET_SIZE);

        // Advance to the second filter set: only one block remains.
        for _ in 0..alg.state.output_height {
            alg.complete_work(1);
        }
        assert_eq!(alg.filter_set, 1);
        assert_eq!(alg.filter_count, 1);
    }
}

//! Reference scalar microkernels
//!
//! Straightforward implementations of the microkernel contract, used as the
//! default dispatch table entries and as the exact-agreement baseline for
//! optimized kernels. Each kernel walks the tap cursor exactly the way the
//! vectorized kernels do: along a kernel row by `dilation_width`, then to
//! the next row by `input_stride`, with `row_base`/`row_end` bounding the
//! valid span of each input row for the pad-strip columns.
//!
//! The tap cursor is formed with wrapping pointer arithmetic because the
//! caller hands over an input pointer with the left padding offset already
//! subtracted; addresses are dereferenced only after the range check
//! against the row bounds.

use super::{
    ConvDepthwiseKernelArgs, ConvKernelArgs, ConvPointwiseKernelArgs, MAX_BLOCK_SIZE,
    PoolKernelArgs, flags,
};

#[inline]
fn check_conv_flags(word: u32) {
    debug_assert!(
        word & (flags::RELU_ACTIVATION | flags::OTHER_ACTIVATION)
            != flags::RELU_ACTIVATION | flags::OTHER_ACTIVATION,
        "fused ReLU and deferred activation are mutually exclusive"
    );
}

/// Direct convolution over NCHWc input.
///
/// The filter tile is laid out `[kh][kw][ic][oc]` per (filter block, input
/// channel block) pair, with `ic` and `oc` running over the block lanes.
///
/// # Safety
///
/// `args` must describe valid tensors per the module contract: every
/// interior-strip tap and every pad-strip tap passing the row-bounds check
/// must be readable, the output row writable, and `bias` readable for
/// `filter_count * block_size` elements when the bias flag is set.
pub unsafe fn conv_nchwc(args: &ConvKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);
    check_conv_flags(args.flags);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;

    for fc in 0..args.filter_count {
        let filter = args.filter.add(fc * args.filter_stride);
        let output = args.output.add(fc * args.output_stride);

        for x in 0..output_width {
            let interior = x >= args.output_count_left_pad && x < interior_end;

            let mut acc = [0.0f32; MAX_BLOCK_SIZE];

            let mut tap = args.input.wrapping_add(x * args.stride_width);
            let mut row_base = args.input_base;
            let mut filter_row = filter;

            for _kh in 0..args.kernel_height {
                let row_end = row_base.wrapping_add(args.input_width);

                for kw in 0..args.kernel_width {
                    if interior || (tap >= row_base && tap < row_end) {
                        let weights = filter_row.add(kw * bs * bs);
                        for ic in 0..bs {
                            let value = *tap.add(ic);
                            for oc in 0..bs {
                                acc[oc] += value * *weights.add(ic * bs + oc);
                            }
                        }
                    }
                    tap = tap.wrapping_add(args.dilation_width);
                }

                tap = tap.wrapping_add(args.input_stride);
                row_base = row_base.wrapping_add(args.dilated_input_width);
                filter_row = filter_row.add(bs * bs * args.kernel_width);
            }

            for oc in 0..bs {
                let out = output.add(x * bs + oc);
                let mut value = acc[oc];
                if args.flags & flags::ACCUMULATE_OUTPUT != 0 {
                    value += *out;
                }
                if args.flags & flags::BIAS_ADDITION != 0 {
                    value += *args.bias.add(fc * bs + oc);
                }
                if args.flags & flags::RELU_ACTIVATION != 0 {
                    value = value.max(0.0);
                }
                *out = value;
            }
        }
    }
}

/// Direct convolution over a single unblocked (NCHW) input channel.
///
/// The filter tile is laid out `[kh][kw][oc]` per (filter block, input
/// channel) pair; output remains channel-blocked.
///
/// # Safety
///
/// Same contract as [`conv_nchwc`], with the input row unblocked.
pub unsafe fn conv_nchw(args: &ConvKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);
    check_conv_flags(args.flags);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;

    for fc in 0..args.filter_count {
        let filter = args.filter.add(fc * args.filter_stride);
        let output = args.output.add(fc * args.output_stride);

        for x in 0..output_width {
            let interior = x >= args.output_count_left_pad && x < interior_end;

            let mut acc = [0.0f32; MAX_BLOCK_SIZE];

            let mut tap = args.input.wrapping_add(x * args.stride_width);
            let mut row_base = args.input_base;
            let mut filter_row = filter;

            for _kh in 0..args.kernel_height {
                let row_end = row_base.wrapping_add(args.input_width);

                for kw in 0..args.kernel_width {
                    if interior || (tap >= row_base && tap < row_end) {
                        let value = *tap;
                        let weights = filter_row.add(kw * bs);
                        for oc in 0..bs {
                            acc[oc] += value * *weights.add(oc);
                        }
                    }
                    tap = tap.wrapping_add(args.dilation_width);
                }

                tap = tap.wrapping_add(args.input_stride);
                row_base = row_base.wrapping_add(args.dilated_input_width);
                filter_row = filter_row.add(bs * args.kernel_width);
            }

            for oc in 0..bs {
                let out = output.add(x * bs + oc);
                let mut value = acc[oc];
                if args.flags & flags::ACCUMULATE_OUTPUT != 0 {
                    value += *out;
                }
                if args.flags & flags::BIAS_ADDITION != 0 {
                    value += *args.bias.add(fc * bs + oc);
                }
                if args.flags & flags::RELU_ACTIVATION != 0 {
                    value = value.max(0.0);
                }
                *out = value;
            }
        }
    }
}

/// Pointwise convolution over NCHWc input.
///
/// The filter tile is laid out `[icb][ic][oc]` per filter block. No
/// padding is possible on this path, so no bounds checks are required.
///
/// # Safety
///
/// `args` must describe valid tensors per the module contract:
/// `input_channels` channel blocks of `output_count` strided elements
/// readable, the output writable, and `bias` readable for
/// `filter_count * block_size` elements when the bias flag is set.
pub unsafe fn conv_pointwise(args: &ConvPointwiseKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);
    check_conv_flags(args.flags);

    let bs = args.block_size;

    for fc in 0..args.filter_count {
        let filter = args.filter.add(fc * args.filter_stride);
        let output = args.output.add(fc * args.output_stride);

        for e in 0..args.output_count {
            let element = args.input.add(e * args.stride_width);

            let mut acc = [0.0f32; MAX_BLOCK_SIZE];

            for icb in 0..args.input_channels {
                let block = element.add(icb * args.input_stride);
                let weights = filter.add(icb * bs * bs);
                for ic in 0..bs {
                    let value = *block.add(ic);
                    for oc in 0..bs {
                        acc[oc] += value * *weights.add(ic * bs + oc);
                    }
                }
            }

            for oc in 0..bs {
                let out = output.add(e * bs + oc);
                let mut value = acc[oc];
                if args.flags & flags::ACCUMULATE_OUTPUT != 0 {
                    value += *out;
                }
                if args.flags & flags::BIAS_ADDITION != 0 {
                    value += *args.bias.add(fc * bs + oc);
                }
                if args.flags & flags::RELU_ACTIVATION != 0 {
                    value = value.max(0.0);
                }
                *out = value;
            }
        }
    }
}

/// Depthwise convolution over one NCHWc channel block.
///
/// The filter tile is laid out `[kh][kw][lane]`; every lane convolves
/// independently.
///
/// # Safety
///
/// Same contract as [`conv_nchwc`] restricted to a single channel block;
/// `bias` must be readable for `block_size` elements when the bias flag is
/// set.
pub unsafe fn conv_depthwise(args: &ConvDepthwiseKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);
    check_conv_flags(args.flags);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;

    for x in 0..output_width {
        let interior = x >= args.output_count_left_pad && x < interior_end;

        let mut acc = [0.0f32; MAX_BLOCK_SIZE];

        let mut tap = args.input.wrapping_add(x * args.stride_width);
        let mut row_base = args.input_base;
        let mut filter_row = args.filter;

        for _kh in 0..args.kernel_height {
            let row_end = row_base.wrapping_add(args.input_width);

            for kw in 0..args.kernel_width {
                if interior || (tap >= row_base && tap < row_end) {
                    let weights = filter_row.add(kw * bs);
                    for lane in 0..bs {
                        acc[lane] += *tap.add(lane) * *weights.add(lane);
                    }
                }
                tap = tap.wrapping_add(args.dilation_width);
            }

            tap = tap.wrapping_add(args.input_stride);
            row_base = row_base.wrapping_add(args.dilated_input_width);
            filter_row = filter_row.add(bs * args.kernel_width);
        }

        for lane in 0..bs {
            let out = args.output.add(x * bs + lane);
            let mut value = acc[lane];
            if args.flags & flags::ACCUMULATE_OUTPUT != 0 {
                value += *out;
            }
            if args.flags & flags::BIAS_ADDITION != 0 {
                value += *args.bias.add(lane);
            }
            if args.flags & flags::RELU_ACTIVATION != 0 {
                value = value.max(0.0);
            }
            *out = value;
        }
    }
}

/// Maximum pooling over one NCHWc channel block.
///
/// Padding positions never contribute: vertical trimming removed invalid
/// rows and the row-bounds check skips invalid columns, so the maximum
/// ranges over valid taps only.
///
/// # Safety
///
/// `args` must describe valid tensors per the module contract.
pub unsafe fn pool_maximum(args: &PoolKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;

    for x in 0..output_width {
        let interior = x >= args.output_count_left_pad && x < interior_end;

        let mut best = [f32::MIN; MAX_BLOCK_SIZE];

        let mut tap = args.input.wrapping_add(x * args.stride_width);
        let mut row_base = args.input_base;

        for _kh in 0..args.kernel_height {
            let row_end = row_base.wrapping_add(args.input_width);

            for _kw in 0..args.kernel_width {
                if interior || (tap >= row_base && tap < row_end) {
                    for lane in 0..bs {
                        best[lane] = best[lane].max(*tap.add(lane));
                    }
                }
                tap = tap.wrapping_add(args.dilation_width);
            }

            tap = tap.wrapping_add(args.input_stride);
            row_base = row_base.wrapping_add(args.dilated_input_width);
        }

        for lane in 0..bs {
            *args.output.add(x * bs + lane) = best[lane];
        }
    }
}

/// Average pooling with padding positions counted in the divisor.
///
/// The divisor is the full kernel tap count supplied by the caller, so
/// trimmed and skipped taps contribute zero to the sum but still dilute
/// the average.
///
/// # Safety
///
/// `args` must describe valid tensors per the module contract.
pub unsafe fn pool_average_include_pad(args: &PoolKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;
    let divisor = args.kernel_size as f32;

    for x in 0..output_width {
        let interior = x >= args.output_count_left_pad && x < interior_end;

        let mut sum = [0.0f32; MAX_BLOCK_SIZE];

        let mut tap = args.input.wrapping_add(x * args.stride_width);
        let mut row_base = args.input_base;

        for _kh in 0..args.kernel_height {
            let row_end = row_base.wrapping_add(args.input_width);

            for _kw in 0..args.kernel_width {
                if interior || (tap >= row_base && tap < row_end) {
                    for lane in 0..bs {
                        sum[lane] += *tap.add(lane);
                    }
                }
                tap = tap.wrapping_add(args.dilation_width);
            }

            tap = tap.wrapping_add(args.input_stride);
            row_base = row_base.wrapping_add(args.dilated_input_width);
        }

        for lane in 0..bs {
            *args.output.add(x * bs + lane) = sum[lane] / divisor;
        }
    }
}

/// Average pooling with only valid taps in the divisor.
///
/// # Safety
///
/// `args` must describe valid tensors per the module contract.
pub unsafe fn pool_average_exclude_pad(args: &PoolKernelArgs) {
    debug_assert!(args.block_size <= MAX_BLOCK_SIZE);

    let bs = args.block_size;
    let output_width = args.output_count_left_pad + args.output_count + args.output_count_right_pad;
    let interior_end = args.output_count_left_pad + args.output_count;

    for x in 0..output_width {
        let interior = x >= args.output_count_left_pad && x < interior_end;

        let mut sum = [0.0f32; MAX_BLOCK_SIZE];
        let mut valid_taps = 0usize;

        let mut tap = args.input.wrapping_add(x * args.stride_width);
        let mut row_base = args.input_base;

        for _kh in 0..args.kernel_height {
            let row_end = row_base.wrapping_add(args.input_width);

            for _kw in 0..args.kernel_width {
                if interior || (tap >= row_base && tap < row_end) {
                    valid_taps += 1;
                    for lane in 0..bs {
                        sum[lane] += *tap.add(lane);
                    }
                }
                tap = tap.wrapping_add(args.dilation_width);
            }

            tap = tap.wrapping_add(args.input_stride);
            row_base = row_base.wrapping_add(args.dilated_input_width);
        }

        let divisor = valid_taps as f32;
        for lane in 0..bs {
            *args.output.add(x * bs + lane) = sum[lane] / divisor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    // A block size of two keeps the hand-computed expectations readable;
    // the kernels take the block size at runtime.
    const BS: usize = 2;

    /// Build NCHWc input for one channel block: value = base + y * 10 + x,
    /// lane 1 negated.
    fn blocked_input(height: usize, width: usize, base: f32) -> Vec<f32> {
        let mut data = vec![0.0f32; height * width * BS];
        for y in 0..height {
            for x in 0..width {
                let value = base + (y * 10 + x) as f32;
                data[(y * width + x) * BS] = value;
                data[(y * width + x) * BS + 1] = -value;
            }
        }
        data
    }

    #[test]
    fn test_depthwise_kernel_interior() {
        // 3x3 input, 2x2 kernel of ones, no padding: each output is the sum
        // of a 2x2 window.
        let input = blocked_input(3, 3, 1.0);
        let filter = vec![1.0f32; 2 * 2 * BS];
        let mut output = vec![0.0f32; 2 * 2 * BS];

        for ph in 0..2 {
            let args = ConvDepthwiseKernelArgs {
                block_size: BS,
                input: input[ph * 3 * BS..].as_ptr(),
                filter: filter.as_ptr(),
                output: output[ph * 2 * BS..].as_mut_ptr(),
                stride_width: BS,
                dilation_width: BS,
                input_stride: BS * 3 - 2 * BS,
                kernel_height: 2,
                kernel_width: 2,
                input_base: input[ph * 3 * BS..].as_ptr(),
                input_width: BS * 3,
                dilated_input_width: BS * 3,
                output_count_left_pad: 0,
                output_count: 2,
                output_count_right_pad: 0,
                bias: ptr::null(),
                flags: 0,
            };
            unsafe { conv_depthwise(&args) };
        }

        // Window sums: (1+2+11+12)=26, (2+3+12+13)=30, (11+12+21+22)=66,
        // (12+13+22+23)=70; lane 1 is the negation.
        let expected = [26.0, -26.0, 30.0, -30.0, 66.0, -66.0, 70.0, -70.0];
        for (got, want) in output.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_depthwise_kernel_left_pad_strip() {
        // 1x3 input row, 1x3 kernel, left and right padding of one column:
        // output column 0 misses its leftmost tap, column 2 its rightmost.
        let input = blocked_input(1, 3, 1.0);
        let filter = vec![1.0f32; 3 * BS];
        let mut output = vec![0.0f32; 3 * BS];

        let args = ConvDepthwiseKernelArgs {
            block_size: BS,
            input: input.as_ptr().wrapping_sub(BS),
            filter: filter.as_ptr(),
            output: output.as_mut_ptr(),
            stride_width: BS,
            dilation_width: BS,
            input_stride: 0,
            kernel_height: 1,
            kernel_width: 3,
            input_base: input.as_ptr(),
            input_width: BS * 3,
            dilated_input_width: BS * 3,
            output_count_left_pad: 1,
            output_count: 1,
            output_count_right_pad: 1,
            bias: ptr::null(),
            flags: 0,
        };
        unsafe { conv_depthwise(&args) };

        // Columns: (1+2)=3, (1+2+3)=6, (2+3)=5.
        let expected = [3.0, -3.0, 6.0, -6.0, 5.0, -5.0];
        for (got, want) in output.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_depthwise_kernel_epilogue_flags() {
        // Single 1x1 kernel over a single column; exercise accumulate,
        // bias, and fused ReLU together.
        let input = [2.0f32, -2.0];
        let filter = [1.0f32, 1.0];
        let bias = [-5.0f32, 1.0];
        let mut output = [1.0f32, 0.5];

        let args = ConvDepthwiseKernelArgs {
            block_size: BS,
            input: input.as_ptr(),
            filter: filter.as_ptr(),
            output: output.as_mut_ptr(),
            stride_width: BS,
            dilation_width: BS,
            input_stride: 0,
            kernel_height: 1,
            kernel_width: 1,
            input_base: input.as_ptr(),
            input_width: BS,
            dilated_input_width: BS,
            output_count_left_pad: 0,
            output_count: 1,
            output_count_right_pad: 0,
            bias: bias.as_ptr(),
            flags: flags::ACCUMULATE_OUTPUT | flags::BIAS_ADDITION | flags::RELU_ACTIVATION,
        };
        unsafe { conv_depthwise(&args) };

        // Lane 0: relu(2 + 1 - 5) = 0; lane 1: relu(-2 + 0.5 + 1) = 0.
        assert_eq!(output, [0.0, 0.0]);
    }

    #[test]
    fn test_pointwise_kernel() {
        // Two input channel blocks (4 channels), one filter block, three
        // output elements, unstrided.
        let spatial = 3;
        // Channel c holds value (c + 1) at every position.
        let mut input = vec![0.0f32; 2 * spatial * BS];
        for icb in 0..2 {
            for e in 0..spatial {
                for lane in 0..BS {
                    input[icb * spatial * BS + e * BS + lane] = (icb * BS + lane + 1) as f32;
                }
            }
        }
        // Output lane 0 sums all channels; lane 1 picks channel 2 only.
        let mut filter = vec![0.0f32; 2 * BS * BS];
        for icb in 0..2 {
            for ic in 0..BS {
                filter[icb * BS * BS + ic * BS] = 1.0;
            }
        }
        // [icb=1][ic=0][oc=1] selects channel 2 (value 3).
        filter[BS * BS + 1] = 1.0;

        let mut output = vec![0.0f32; spatial * BS];

        let args = ConvPointwiseKernelArgs {
            block_size: BS,
            input: input.as_ptr(),
            filter: filter.as_ptr(),
            output: output.as_mut_ptr(),
            stride_width: BS,
            input_channels: 2,
            filter_count: 1,
            input_stride: spatial * BS,
            filter_stride: 2 * BS * BS,
            output_stride: spatial * BS,
            output_count: spatial,
            bias: ptr::null(),
            flags: 0,
        };
        unsafe { conv_pointwise(&args) };

        // Lane 0: 1+2+3+4 = 10; lane 1: channel 2's value = 3.
        for e in 0..spatial {
            assert_eq!(output[e * BS], 10.0);
            assert_eq!(output[e * BS + 1], 3.0);
        }
    }

    #[test]
    fn test_pool_maximum_kernel() {
        // 2x2 windows over a 4x4 input, stride 2.
        let input = blocked_input(4, 4, 0.0);
        let mut output = vec![0.0f32; 2 * 2 * BS];

        for ph in 0..2 {
            let args = PoolKernelArgs {
                block_size: BS,
                input: input[ph * 2 * 4 * BS..].as_ptr(),
                output: output[ph * 2 * BS..].as_mut_ptr(),
                stride_width: 2 * BS,
                dilation_width: BS,
                input_stride: BS * 4 - 2 * BS,
                kernel_size: 4,
                kernel_height: 2,
                kernel_width: 2,
                input_base: input[ph * 2 * 4 * BS..].as_ptr(),
                input_width: BS * 4,
                dilated_input_width: BS * 4,
                output_count_left_pad: 0,
                output_count: 2,
                output_count_right_pad: 0,
            };
            unsafe { pool_maximum(&args) };
        }

        // Lane 0 maxima are the bottom-right corners of each window; lane 1
        // holds negated values so its maxima are the top-left corners.
        let expected = [11.0, -0.0, 13.0, -2.0, 31.0, -20.0, 33.0, -22.0];
        for (got, want) in output.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_pool_average_divisors() {
        // One 2x2 window with one column trimmed on the right: include-pad
        // divides by the full kernel size, exclude-pad by the valid taps.
        let input = blocked_input(2, 1, 4.0);
        let mut include = vec![0.0f32; BS];
        let mut exclude = vec![0.0f32; BS];

        let base = PoolKernelArgs {
            block_size: BS,
            input: input.as_ptr(),
            output: include.as_mut_ptr(),
            stride_width: 2 * BS,
            dilation_width: BS,
            // One-column rows make this wrap negative, as in real
            // dispatches over narrow inputs.
            input_stride: BS.wrapping_sub(2 * BS),
            kernel_size: 4,
            kernel_height: 2,
            kernel_width: 2,
            input_base: input.as_ptr(),
            input_width: BS,
            dilated_input_width: BS,
            output_count_left_pad: 0,
            output_count: 0,
            output_count_right_pad: 1,
        };
        unsafe { pool_average_include_pad(&base) };

        let mut args = base;
        args.output = exclude.as_mut_ptr();
        unsafe { pool_average_exclude_pad(&args) };

        // Valid taps are 4.0 and 14.0: include-pad averages over 4 taps,
        // exclude-pad over 2.
        assert!((include[0] - 4.5).abs() < 1e-6);
        assert!((exclude[0] - 9.0).abs() < 1e-6);
    }
}

//! Shared test harness: plain NCHW reference implementations, blocked
//! layout packing, and the per-variant filter repacking that callers run
//! before handing a filter to the engine.
//!
//! Test data uses small integer values so that every sum is exact in f32
//! and results are bit-identical regardless of accumulation order.

#![allow(dead_code)]

use convr::activation::Activation;
use convr::nchwc::PoolingKind;
use convr::platform::block_size;

// ============================================================================
// Deterministic data
// ============================================================================

/// Small-integer pattern in [-3, 3]; exact in f32.
pub fn pattern(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (((i * 31 + seed * 17) % 7) as f32) - 3.0)
        .collect()
}

pub fn assert_allclose(actual: &[f32], expected: &[f32], tolerance: f32, what: &str) {
    assert_eq!(actual.len(), expected.len(), "{what}: length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "{what}: mismatch at {i}: got {a}, want {e}"
        );
    }
}

// ============================================================================
// Shape arithmetic
// ============================================================================

pub fn conv_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    pad_begin: usize,
    pad_end: usize,
) -> usize {
    let span = dilation * (kernel - 1) + 1;
    let padded = input + pad_begin + pad_end;
    if padded < span { 0 } else { (padded - span) / stride + 1 }
}

/// Channel count rounded up to whole blocks.
pub fn blocked(channels: usize) -> usize {
    let bs = block_size();
    channels.div_ceil(bs) * bs
}

// ============================================================================
// Blocked layout packing
// ============================================================================

/// NCHW to NCHWc, zero-padding the trailing partial channel block.
pub fn pack_nchwc(data: &[f32], n: usize, c: usize, h: usize, w: usize) -> Vec<f32> {
    let bs = block_size();
    let cb = blocked(c);
    let mut out = vec![0.0f32; n * cb * h * w];
    for b in 0..n {
        for ch in 0..c {
            let block = ch / bs;
            let lane = ch % bs;
            for y in 0..h {
                for x in 0..w {
                    let value = data[((b * c + ch) * h + y) * w + x];
                    out[(((b * (cb / bs) + block) * h + y) * w + x) * bs + lane] = value;
                }
            }
        }
    }
    out
}

/// NCHWc back to NCHW, dropping the padding channels.
pub fn unpack_nchwc(data: &[f32], n: usize, c: usize, h: usize, w: usize) -> Vec<f32> {
    let bs = block_size();
    let cb = blocked(c);
    let mut out = vec![0.0f32; n * c * h * w];
    for b in 0..n {
        for ch in 0..c {
            let block = ch / bs;
            let lane = ch % bs;
            for y in 0..h {
                for x in 0..w {
                    out[((b * c + ch) * h + y) * w + x] =
                        data[(((b * (cb / bs) + block) * h + y) * w + x) * bs + lane];
                }
            }
        }
    }
    out
}

// ============================================================================
// Filter repacking (per selected algorithm)
// ============================================================================

/// OIHW to the direct NCHWc layout: `[g][ocb][icb][kh][kw][ic][oc]`.
pub fn repack_filter_nchwc(
    filter: &[f32],
    groups: usize,
    c_out_per_group: usize,
    c_in_per_group: usize,
    kernel_h: usize,
    kernel_w: usize,
) -> Vec<f32> {
    let bs = block_size();
    let ocb_count = c_out_per_group / bs;
    let icb_count = c_in_per_group / bs;
    let mut out = vec![0.0f32; groups * c_out_per_group * c_in_per_group * kernel_h * kernel_w];
    for g in 0..groups {
        for oc in 0..c_out_per_group {
            for ic in 0..c_in_per_group {
                for y in 0..kernel_h {
                    for x in 0..kernel_w {
                        let value = filter[(((g * c_out_per_group + oc) * c_in_per_group + ic)
                            * kernel_h
                            + y)
                            * kernel_w
                            + x];
                        let index = (((((g * ocb_count + oc / bs) * icb_count + ic / bs)
                            * kernel_h
                            + y)
                            * kernel_w
                            + x)
                            * bs
                            + ic % bs)
                            * bs
                            + oc % bs;
                        out[index] = value;
                    }
                }
            }
        }
    }
    out
}

/// OIHW to the first-layer layout: `[g][ocb][ic][kh][kw][oc]`.
pub fn repack_filter_nchw(
    filter: &[f32],
    groups: usize,
    c_out_per_group: usize,
    c_in_per_group: usize,
    kernel_h: usize,
    kernel_w: usize,
) -> Vec<f32> {
    let bs = block_size();
    let ocb_count = c_out_per_group / bs;
    let mut out = vec![0.0f32; groups * c_out_per_group * c_in_per_group * kernel_h * kernel_w];
    for g in 0..groups {
        for oc in 0..c_out_per_group {
            for ic in 0..c_in_per_group {
                for y in 0..kernel_h {
                    for x in 0..kernel_w {
                        let value = filter[(((g * c_out_per_group + oc) * c_in_per_group + ic)
                            * kernel_h
                            + y)
                            * kernel_w
                            + x];
                        let index = ((((g * ocb_count + oc / bs) * c_in_per_group + ic)
                            * kernel_h
                            + y)
                            * kernel_w
                            + x)
                            * bs
                            + oc % bs;
                        out[index] = value;
                    }
                }
            }
        }
    }
    out
}

/// OIHW with a 1x1 kernel to the pointwise layout: `[g][ocb][icb][ic][oc]`.
pub fn repack_filter_pointwise(
    filter: &[f32],
    groups: usize,
    c_out_per_group: usize,
    c_in_per_group: usize,
) -> Vec<f32> {
    let bs = block_size();
    let ocb_count = c_out_per_group / bs;
    let icb_count = c_in_per_group / bs;
    let mut out = vec![0.0f32; groups * c_out_per_group * c_in_per_group];
    for g in 0..groups {
        for oc in 0..c_out_per_group {
            for ic in 0..c_in_per_group {
                let value = filter[(g * c_out_per_group + oc) * c_in_per_group + ic];
                let index = (((g * ocb_count + oc / bs) * icb_count + ic / bs) * bs + ic % bs)
                    * bs
                    + oc % bs;
                out[index] = value;
            }
        }
    }
    out
}

/// Per-channel kernels `[c][kh][kw]` to the depthwise layout:
/// `[cb][kh][kw][lane]`, zero-padding the trailing partial block.
pub fn repack_filter_depthwise(
    filter: &[f32],
    channels: usize,
    kernel_h: usize,
    kernel_w: usize,
) -> Vec<f32> {
    let bs = block_size();
    let mut out = vec![0.0f32; blocked(channels) * kernel_h * kernel_w];
    for ch in 0..channels {
        for y in 0..kernel_h {
            for x in 0..kernel_w {
                let value = filter[(ch * kernel_h + y) * kernel_w + x];
                out[(((ch / bs) * kernel_h + y) * kernel_w + x) * bs + ch % bs] = value;
            }
        }
    }
    out
}

// ============================================================================
// Reference implementations
// ============================================================================

/// Plain NCHW grouped convolution, the semantic reference for every
/// engine variant.
#[allow(clippy::too_many_arguments)]
pub fn reference_conv2d(
    input: &[f32],
    n: usize,
    c_in: usize,
    h: usize,
    w: usize,
    filter: &[f32],
    bias: Option<&[f32]>,
    c_out: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride: (usize, usize),
    dilation: (usize, usize),
    padding: (usize, usize, usize, usize),
    groups: usize,
    activation: Activation,
) -> Vec<f32> {
    let (pad_top, pad_left, pad_bottom, pad_right) = padding;
    let oh = conv_output_size(h, kernel_h, stride.0, dilation.0, pad_top, pad_bottom);
    let ow = conv_output_size(w, kernel_w, stride.1, dilation.1, pad_left, pad_right);

    let c_in_per_group = c_in / groups;
    let c_out_per_group = c_out / groups;

    let mut out = vec![0.0f32; n * c_out * oh * ow];
    for b in 0..n {
        for g in 0..groups {
            for oc in 0..c_out_per_group {
                let oc_index = g * c_out_per_group + oc;
                for oy in 0..oh {
                    for ox in 0..ow {
                        let mut sum = 0.0f32;
                        for ic in 0..c_in_per_group {
                            let ic_index = g * c_in_per_group + ic;
                            for ky in 0..kernel_h {
                                for kx in 0..kernel_w {
                                    let iy = (oy * stride.0 + ky * dilation.0) as isize
                                        - pad_top as isize;
                                    let ix = (ox * stride.1 + kx * dilation.1) as isize
                                        - pad_left as isize;
                                    if iy >= 0
                                        && (iy as usize) < h
                                        && ix >= 0
                                        && (ix as usize) < w
                                    {
                                        let in_value = input[((b * c_in + ic_index) * h
                                            + iy as usize)
                                            * w
                                            + ix as usize];
                                        let w_value = filter[(((oc_index) * c_in_per_group + ic)
                                            * kernel_h
                                            + ky)
                                            * kernel_w
                                            + kx];
                                        sum += in_value * w_value;
                                    }
                                }
                            }
                        }
                        if let Some(bias) = bias {
                            sum += bias[oc_index];
                        }
                        out[((b * c_out + oc_index) * oh + oy) * ow + ox] =
                            activation.apply(sum);
                    }
                }
            }
        }
    }
    out
}

/// Plain NCHW pooling reference.
#[allow(clippy::too_many_arguments)]
pub fn reference_pool2d(
    input: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kind: PoolingKind,
    kernel_h: usize,
    kernel_w: usize,
    stride: (usize, usize),
    dilation: (usize, usize),
    padding: (usize, usize, usize, usize),
) -> Vec<f32> {
    let (pad_top, pad_left, pad_bottom, pad_right) = padding;
    let oh = conv_output_size(h, kernel_h, stride.0, dilation.0, pad_top, pad_bottom);
    let ow = conv_output_size(w, kernel_w, stride.1, dilation.1, pad_left, pad_right);

    let mut out = vec![0.0f32; n * c * oh * ow];
    for b in 0..n {
        for ch in 0..c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut maximum = f32::MIN;
                    let mut sum = 0.0f32;
                    let mut valid = 0usize;
                    for ky in 0..kernel_h {
                        for kx in 0..kernel_w {
                            let iy =
                                (oy * stride.0 + ky * dilation.0) as isize - pad_top as isize;
                            let ix =
                                (ox * stride.1 + kx * dilation.1) as isize - pad_left as isize;
                            if iy >= 0 && (iy as usize) < h && ix >= 0 && (ix as usize) < w {
                                let value =
                                    input[((b * c + ch) * h + iy as usize) * w + ix as usize];
                                maximum = maximum.max(value);
                                sum += value;
                                valid += 1;
                            }
                        }
                    }
                    out[((b * c + ch) * oh + oy) * ow + ox] = match kind {
                        PoolingKind::Maximum => maximum,
                        PoolingKind::AverageIncludePad => sum / (kernel_h * kernel_w) as f32,
                        PoolingKind::AverageExcludePad => sum / valid as f32,
                    };
                }
            }
        }
    }
    out
}

//! Activation functions fused into or applied after convolution output
//!
//! Identity and ReLU are folded into the microkernel epilogue through the
//! kernel flag word. Every other kind is applied by an in-place sweep over
//! the output tile after the microkernel returns, with a row stride equal to
//! the blocked output plane size so that successive filter rows land in the
//! correct NCHWc output planes.

/// Activation applied to convolution output.
///
/// Only [`Activation::Identity`] and [`Activation::Relu`] are fused into the
/// microkernels; the remaining kinds run as a separate pass over the tile
/// the microkernel just wrote.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Activation {
    /// No transformation
    Identity,
    /// max(x, 0)
    Relu,
    /// x for x > 0, else alpha * x
    LeakyRelu {
        /// Slope applied to negative inputs
        alpha: f32,
    },
    /// clamp(x, min, max)
    Clip {
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
    /// 1 / (1 + exp(-x))
    Sigmoid,
    /// tanh(x)
    Tanh,
    /// clamp(alpha * x + beta, 0, 1)
    HardSigmoid {
        /// Input scale
        alpha: f32,
        /// Input offset
        beta: f32,
    },
}

impl Activation {
    /// Returns true when the activation is folded into the microkernel
    /// epilogue instead of requiring a separate output pass.
    pub fn is_fused(&self) -> bool {
        matches!(self, Activation::Identity | Activation::Relu)
    }

    /// Apply the activation to a single value.
    pub fn apply(&self, x: f32) -> f32 {
        match *self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Clip { min, max } => x.clamp(min, max),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::HardSigmoid { alpha, beta } => (alpha * x + beta).clamp(0.0, 1.0),
        }
    }

    /// Apply the activation in place over `rows` rows of `cols` elements,
    /// where consecutive rows are `stride` elements apart.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for reads and writes of
    /// `(rows - 1) * stride + cols` elements when `rows > 0`.
    pub(crate) unsafe fn apply_strided(&self, buffer: *mut f32, rows: usize, cols: usize, stride: usize) {
        for m in 0..rows {
            let row = buffer.add(m * stride);
            for n in 0..cols {
                let value = row.add(n);
                *value = self.apply(*value);
            }
        }
    }
}

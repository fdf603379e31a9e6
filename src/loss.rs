//! Loss functions.
//!
//! Losses operate on a whole batch of predictions (row-major, `width` columns) and
//! report the mean per-sample loss. The backward pass writes `dL/d(pred)` for that
//! batch mean, so gradients already carry the `1 / batch` factor.
//!
//! Typical step:
//!
//! - run the model's batched forward pass
//! - `loss.backward(...)` into the output-gradient buffer, or `loss.backward_fused(...)`
//!   when [`Loss::fuses_with`] the final activation
//! - run the batched backward pass
//! - let the optimizer update parameters

use crate::Activation;

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logarithms.
pub const EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Supported loss functions.
pub enum Loss {
    /// Categorical cross-entropy over probability rows and one-hot targets:
    /// `-sum_i t_i * ln(p_i)` per sample.
    ///
    /// Expects the output layer to produce probabilities (softmax activation).
    CategoricalCrossEntropy,
    /// Mean squared error: `mean_i (p_i - t_i)^2` per sample.
    Mse,
}

impl Loss {
    /// Mean loss over the batch.
    ///
    /// Shape contract: `pred.len() == target.len()`, a multiple of `width`.
    pub fn forward(self, pred: &[f32], target: &[f32], width: usize) -> f32 {
        check_shapes(pred, target, width);
        let batch = pred.len() / width;
        if batch == 0 {
            return 0.0;
        }

        let total: f32 = pred
            .chunks_exact(width)
            .zip(target.chunks_exact(width))
            .map(|(p, t)| self.sample_loss(p, t))
            .sum();
        total / batch as f32
    }

    /// Mean loss over the batch plus its gradient w.r.t. `pred`, written into `d_pred`.
    ///
    /// Shape contract: `pred`, `target` and `d_pred` have equal lengths, a multiple of
    /// `width`.
    pub fn backward(self, pred: &[f32], target: &[f32], width: usize, d_pred: &mut [f32]) -> f32 {
        check_shapes(pred, target, width);
        assert_eq!(
            pred.len(),
            d_pred.len(),
            "pred len {} does not match d_pred len {}",
            pred.len(),
            d_pred.len()
        );
        let batch = pred.len() / width;
        if batch == 0 {
            return 0.0;
        }
        let inv_batch = 1.0 / batch as f32;

        match self {
            Loss::CategoricalCrossEntropy => {
                for ((d, &p), &t) in d_pred.iter_mut().zip(pred).zip(target) {
                    *d = if t == 0.0 {
                        0.0
                    } else {
                        -t / clip(p) * inv_batch
                    };
                }
            }
            Loss::Mse => {
                let scale = 2.0 * inv_batch / width as f32;
                for ((d, &p), &t) in d_pred.iter_mut().zip(pred).zip(target) {
                    *d = (p - t) * scale;
                }
            }
        }

        self.forward(pred, target, width)
    }

    /// Whether this loss after a final `activation` has a closed-form gradient w.r.t. the
    /// pre-activation `z` (see [`Loss::backward_fused`]).
    pub fn fuses_with(self, activation: Activation) -> bool {
        matches!(
            (self, activation),
            (Loss::CategoricalCrossEntropy, Activation::Softmax)
        )
    }

    /// Mean loss over the batch plus its gradient w.r.t. the softmax pre-activation,
    /// written into `d_z`.
    ///
    /// Softmax followed by cross-entropy gives `dL/dz = p * sum(t) - t` per row (`p - t`
    /// for one-hot targets), which stays informative when `p` saturates at 0 or 1.
    ///
    /// Panics unless `self.fuses_with(Activation::Softmax)`.
    pub fn backward_fused(
        self,
        pred: &[f32],
        target: &[f32],
        width: usize,
        d_z: &mut [f32],
    ) -> f32 {
        assert!(
            self.fuses_with(Activation::Softmax),
            "{self:?} has no fused softmax gradient"
        );
        check_shapes(pred, target, width);
        assert_eq!(
            pred.len(),
            d_z.len(),
            "pred len {} does not match d_z len {}",
            pred.len(),
            d_z.len()
        );
        let batch = pred.len() / width;
        if batch == 0 {
            return 0.0;
        }
        let inv_batch = 1.0 / batch as f32;

        for ((d_row, p_row), t_row) in d_z
            .chunks_exact_mut(width)
            .zip(pred.chunks_exact(width))
            .zip(target.chunks_exact(width))
        {
            let mass: f32 = t_row.iter().sum();
            for ((d, &p), &t) in d_row.iter_mut().zip(p_row).zip(t_row) {
                *d = (p * mass - t) * inv_batch;
            }
        }

        self.forward(pred, target, width)
    }

    #[inline]
    fn sample_loss(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::CategoricalCrossEntropy => pred
                .iter()
                .zip(target)
                .filter(|&(_, &t)| t != 0.0)
                .map(|(&p, &t)| -t * clip(p).ln())
                .sum(),
            Loss::Mse => {
                let sum_sq: f32 = pred
                    .iter()
                    .zip(target)
                    .map(|(&p, &t)| (p - t) * (p - t))
                    .sum();
                sum_sq / pred.len() as f32
            }
        }
    }
}

#[inline]
fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

#[inline]
fn check_shapes(pred: &[f32], target: &[f32], width: usize) {
    assert!(width > 0, "loss width must be > 0");
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
    assert_eq!(pred.len() % width, 0, "pred len is not a multiple of width");
}

//! Activation functions.
//!
//! A dense layer computes a pre-activation row `z = W x + b` and then applies its
//! activation to the row: `y = activation(z)`.
//!
//! Activations run in place over a whole batch (row-major, `width` columns). Only the
//! *post-activation* outputs `y` are cached; during backprop `dL/dz` is derived from
//! `dL/dy` and `y`, so no separate pre-activation buffer is needed.
//!
//! `Softmax` is the only row-wise activation: it couples all entries of a row, so its
//! backward pass uses the full Jacobian-vector product instead of an element-wise factor.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Activation applied after a dense layer's affine transform.
pub enum Activation {
    ReLU,
    Softmax,
    Identity,
}

impl Activation {
    /// Apply the activation in place to every row of `z`.
    ///
    /// Shape contract: `z.len()` is a multiple of `width`.
    #[inline]
    pub(crate) fn forward_rows(self, z: &mut [f32], width: usize) {
        debug_assert!(width > 0 && z.len() % width == 0);

        match self {
            Activation::ReLU => {
                for v in z.iter_mut() {
                    *v = v.max(0.0);
                }
            }
            Activation::Softmax => {
                for row in z.chunks_exact_mut(width) {
                    softmax_in_place(row);
                }
            }
            Activation::Identity => {}
        }
    }

    /// Turn `dL/dy` into `dL/dz` in place, using the cached outputs `y`.
    ///
    /// Shape contract: `y.len() == d.len()`, both multiples of `width`.
    #[inline]
    pub(crate) fn backward_rows(self, y: &[f32], d: &mut [f32], width: usize) {
        debug_assert_eq!(y.len(), d.len());
        debug_assert!(width > 0 && y.len() % width == 0);

        match self {
            Activation::ReLU => {
                for (g, &out) in d.iter_mut().zip(y) {
                    if out <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            Activation::Softmax => {
                // dz_i = y_i * (dy_i - sum_j dy_j * y_j)
                for (y_row, d_row) in y.chunks_exact(width).zip(d.chunks_exact_mut(width)) {
                    let mut dot = 0.0_f32;
                    for (&g, &out) in d_row.iter().zip(y_row) {
                        dot = g.mul_add(out, dot);
                    }
                    for (g, &out) in d_row.iter_mut().zip(y_row) {
                        *g = out * (*g - dot);
                    }
                }
            }
            Activation::Identity => {}
        }
    }
}

/// Numerically stable softmax of a single row.
#[inline]
fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0_f32;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let inv_sum = 1.0 / sum;
    for v in row.iter_mut() {
        *v *= inv_sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives_and_masks_gradient() {
        let mut z = [-2.0_f32, 0.0, 3.0];
        Activation::ReLU.forward_rows(&mut z, 3);
        assert_eq!(z, [0.0, 0.0, 3.0]);

        let mut d = [1.0_f32, 1.0, 1.0];
        Activation::ReLU.backward_rows(&z, &mut d, 3);
        assert_eq!(d, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn softmax_rows_are_distributions() {
        let mut z = [1.0_f32, 2.0, 3.0, -1000.0, 0.0, 1000.0];
        Activation::Softmax.forward_rows(&mut z, 3);

        for row in z.chunks_exact(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
        assert!(z[2] > z[1] && z[1] > z[0]);
        assert!((z[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_backward_matches_finite_differences() {
        let z = [0.3_f32, -0.2, 0.9, 0.1];
        // L = sum_i c_i * softmax(z)_i
        let c = [1.0_f32, -2.0, 0.5, 3.0];
        let loss = |z: &[f32]| {
            let mut y = z.to_vec();
            softmax_in_place(&mut y);
            y.iter().zip(&c).map(|(a, b)| a * b).sum::<f32>()
        };

        let mut y = z;
        Activation::Softmax.forward_rows(&mut y, 4);
        let mut d = c;
        Activation::Softmax.backward_rows(&y, &mut d, 4);

        let eps = 1e-3_f32;
        for i in 0..z.len() {
            let mut plus = z;
            plus[i] += eps;
            let mut minus = z;
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - d[i]).abs() < 1e-3,
                "i={i} numeric={numeric} analytic={}",
                d[i]
            );
        }
    }

    #[test]
    fn identity_is_a_no_op() {
        let mut z = [-1.5_f32, 2.5];
        Activation::Identity.forward_rows(&mut z, 2);
        assert_eq!(z, [-1.5, 2.5]);

        let mut d = [0.25_f32, -4.0];
        Activation::Identity.backward_rows(&z, &mut d, 2);
        assert_eq!(d, [0.25, -4.0]);
    }
}

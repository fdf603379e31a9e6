//! Optimizers.
//!
//! An [`Optimizer`] is a plain hyperparameter value; [`OptimizerState`] owns the per-parameter
//! buffers (RMSProp's running mean square) and updates a model's dense layers in place,
//! in the order the layers were added. Dropout layers carry no parameters and are skipped.

use crate::{Error, Gradients, Layer, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// RMSProp hyperparameters.
pub struct RmsPropConfig {
    pub learning_rate: f32,
    /// Decay of the running mean of squared gradients.
    pub rho: f32,
    pub epsilon: f32,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            rho: 0.9,
            epsilon: 1e-7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD: `param -= lr * grad`.
    Sgd { learning_rate: f32 },
    /// RMSProp:
    /// - `ms = rho * ms + (1 - rho) * grad^2`
    /// - `param -= lr * grad / (sqrt(ms) + epsilon)`
    RmsProp(RmsPropConfig),
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::RmsProp(RmsPropConfig::default())
    }
}

impl Optimizer {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        let lr = match self {
            Optimizer::Sgd { learning_rate } => learning_rate,
            Optimizer::RmsProp(cfg) => {
                if !(cfg.rho.is_finite() && (0.0..1.0).contains(&cfg.rho)) {
                    return Err(Error::InvalidConfig(format!(
                        "rmsprop rho must be finite and in [0,1), got {}",
                        cfg.rho
                    )));
                }
                if !(cfg.epsilon.is_finite() && cfg.epsilon > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rmsprop epsilon must be finite and > 0, got {}",
                        cfg.epsilon
                    )));
                }
                cfg.learning_rate
            }
        };
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        Ok(())
    }

    /// Allocate optimizer state for `layers`.
    pub fn state(self, layers: &[Layer]) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd { learning_rate } => Ok(OptimizerState::Sgd { learning_rate }),
            Optimizer::RmsProp(config) => {
                let (ms_weights, ms_biases) = zeros_like_params(layers);
                Ok(OptimizerState::RmsProp {
                    config,
                    ms_weights,
                    ms_biases,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
/// Owned optimizer state, one slot per layer (empty for dropout layers).
pub enum OptimizerState {
    Sgd {
        learning_rate: f32,
    },
    RmsProp {
        config: RmsPropConfig,
        ms_weights: Vec<Vec<f32>>,
        ms_biases: Vec<Vec<f32>>,
    },
}

impl OptimizerState {
    /// Apply one update to every dense weight and bias tensor.
    pub fn step(&mut self, layers: &mut [Layer], grads: &Gradients) {
        match self {
            OptimizerState::Sgd { learning_rate } => {
                for (idx, layer) in layers.iter_mut().enumerate() {
                    let Some(dense) = layer.as_dense_mut() else {
                        continue;
                    };
                    sgd(dense.weights_mut(), grads.d_weights(idx), *learning_rate);
                    sgd(dense.biases_mut(), grads.d_biases(idx), *learning_rate);
                }
            }
            OptimizerState::RmsProp {
                config,
                ms_weights,
                ms_biases,
            } => {
                debug_assert_eq!(ms_weights.len(), layers.len());
                debug_assert_eq!(ms_biases.len(), layers.len());

                for (idx, layer) in layers.iter_mut().enumerate() {
                    let Some(dense) = layer.as_dense_mut() else {
                        continue;
                    };
                    rmsprop(
                        dense.weights_mut(),
                        grads.d_weights(idx),
                        &mut ms_weights[idx],
                        config,
                    );
                    rmsprop(
                        dense.biases_mut(),
                        grads.d_biases(idx),
                        &mut ms_biases[idx],
                        config,
                    );
                }
            }
        }
    }
}

#[inline]
fn sgd(params: &mut [f32], grads: &[f32], lr: f32) {
    debug_assert_eq!(params.len(), grads.len());
    for (p, &g) in params.iter_mut().zip(grads) {
        *p -= lr * g;
    }
}

#[inline]
fn rmsprop(params: &mut [f32], grads: &[f32], mean_sq: &mut [f32], cfg: &RmsPropConfig) {
    debug_assert_eq!(params.len(), grads.len());
    debug_assert_eq!(params.len(), mean_sq.len());

    let one_minus_rho = 1.0 - cfg.rho;
    for ((p, &g), ms) in params.iter_mut().zip(grads).zip(mean_sq.iter_mut()) {
        *ms = cfg.rho * *ms + one_minus_rho * g * g;
        *p -= cfg.learning_rate * g / (ms.sqrt() + cfg.epsilon);
    }
}

fn zeros_like_params(layers: &[Layer]) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    layers
        .iter()
        .map(|layer| match layer.as_dense() {
            Some(dense) => (vec![0.0; dense.weights().len()], vec![0.0; dense.out_dim()]),
            None => (Vec::new(), Vec::new()),
        })
        .unzip()
}

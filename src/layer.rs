//! Layer kinds.
//!
//! A model is an ordered list of [`Layer`]s, a closed set of variants:
//!
//! - [`Dense`]: `y = activation(x W^T + b)`, weights row-major with shape `(out_dim, in_dim)`.
//! - [`Dropout`]: during training zeroes each activation with probability `rate` and
//!   rescales the survivors by `1 / (1 - rate)` (inverted dropout); at inference it is the
//!   identity.
//!
//! All kernels here are batched: inputs and outputs are row-major `(batch, width)` slices
//! of exactly `batch * width` scalars. Shape misuse is a programmer error and panics.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::{matmul, Activation, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Weight initialization scheme for dense layers. Biases always start at zero.
pub enum Init {
    /// Glorot/Xavier uniform: `U(-sqrt(6 / (fan_in + fan_out)), +sqrt(..))`.
    GlorotUniform,
    /// He/Kaiming uniform: `U(-sqrt(6 / fan_in), +sqrt(..))`.
    HeUniform,
}

impl Init {
    #[inline]
    fn limit(self, fan_in: usize, fan_out: usize) -> f32 {
        match self {
            Init::GlorotUniform => (6.0 / (fan_in + fan_out) as f32).sqrt(),
            Init::HeUniform => (6.0 / fan_in as f32).sqrt(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dense {
    in_dim: usize,
    out_dim: usize,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
    activation: Activation,
}

impl Dense {
    /// Create a dense layer with randomly initialized weights.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "dense dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let limit = init.limit(in_dim, out_dim);
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases: vec![0.0; out_dim],
            activation,
        })
    }

    /// Create a dense layer from explicit parameters.
    ///
    /// `weights` is row-major `(out_dim, in_dim)`. All parameters must be finite.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "dense dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "dense parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
            activation,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Batched forward pass: `outputs = activation(inputs * W^T + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == batch * in_dim`
    /// - `outputs.len() == batch * out_dim`
    pub(crate) fn forward_batch(&self, batch: usize, inputs: &[f32], outputs: &mut [f32]) {
        assert_eq!(inputs.len(), batch * self.in_dim, "dense input shape mismatch");
        assert_eq!(outputs.len(), batch * self.out_dim, "dense output shape mismatch");

        matmul::x_wt(
            batch,
            self.in_dim,
            self.out_dim,
            inputs,
            &self.weights,
            outputs,
        );
        for row in outputs.chunks_exact_mut(self.out_dim) {
            for (v, &b) in row.iter_mut().zip(&self.biases) {
                *v += b;
            }
        }
        self.activation.forward_rows(outputs, self.out_dim);
    }

    /// Batched backward pass (overwrite semantics).
    ///
    /// `d_z` holds `dL/dz`, the gradient w.r.t. the pre-activation; the caller converts
    /// `dL/d(outputs)` with the activation first.
    /// `d_inputs` is skipped when `None` (the first layer's input gradient is never used).
    pub(crate) fn backward_batch(
        &self,
        batch: usize,
        inputs: &[f32],
        d_z: &[f32],
        d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        assert_eq!(inputs.len(), batch * self.in_dim, "dense input shape mismatch");
        assert_eq!(d_z.len(), batch * self.out_dim, "dense d_z shape mismatch");
        assert_eq!(d_weights.len(), self.weights.len(), "dense d_weights shape mismatch");
        assert_eq!(d_biases.len(), self.out_dim, "dense d_biases shape mismatch");

        matmul::dyt_x(
            batch,
            self.in_dim,
            self.out_dim,
            d_z,
            inputs,
            d_weights,
        );

        d_biases.fill(0.0);
        for row in d_z.chunks_exact(self.out_dim) {
            for (db, &g) in d_biases.iter_mut().zip(row) {
                *db += g;
            }
        }

        if let Some(d_inputs) = d_inputs {
            assert_eq!(d_inputs.len(), inputs.len(), "dense d_inputs shape mismatch");
            matmul::dy_w(
                batch,
                self.in_dim,
                self.out_dim,
                d_z,
                &self.weights,
                d_inputs,
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    width: usize,
    rate: f32,
}

impl Dropout {
    /// Create a dropout layer over `width` activations.
    ///
    /// `rate` must be finite and in `[0, 1)`.
    pub fn new(width: usize, rate: f32) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig("dropout width must be > 0".to_owned()));
        }
        check_dropout_rate(rate)?;
        Ok(Self { width, rate })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Training-mode forward pass.
    ///
    /// Writes the per-activation scale (`0` or `1 / (1 - rate)`) into `mask` so backward
    /// can reuse it.
    pub(crate) fn forward_train<R: Rng + ?Sized>(
        &self,
        inputs: &[f32],
        outputs: &mut [f32],
        mask: &mut [f32],
        rng: &mut R,
    ) {
        assert_eq!(inputs.len(), outputs.len(), "dropout shape mismatch");
        assert_eq!(inputs.len(), mask.len(), "dropout mask shape mismatch");

        let keep_scale = 1.0 / (1.0 - self.rate);
        for ((out, m), &x) in outputs.iter_mut().zip(mask.iter_mut()).zip(inputs) {
            *m = if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                keep_scale
            };
            *out = x * *m;
        }
    }

    /// Inference-mode forward pass: the identity.
    #[inline]
    pub(crate) fn forward_inference(&self, inputs: &[f32], outputs: &mut [f32]) {
        outputs.copy_from_slice(inputs);
    }

    #[inline]
    pub(crate) fn backward(&self, d_outputs: &[f32], mask: &[f32], d_inputs: &mut [f32]) {
        assert_eq!(d_outputs.len(), mask.len(), "dropout mask shape mismatch");
        assert_eq!(d_outputs.len(), d_inputs.len(), "dropout shape mismatch");

        for ((d_in, &d_out), &m) in d_inputs.iter_mut().zip(d_outputs).zip(mask) {
            *d_in = d_out * m;
        }
    }
}

pub(crate) fn check_dropout_rate(rate: f32) -> Result<()> {
    if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
        return Err(Error::InvalidConfig(format!(
            "dropout rate must be finite and in [0,1), got {rate}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
/// One entry of a model's layer stack.
pub enum Layer {
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    #[inline]
    pub fn in_dim(&self) -> usize {
        match self {
            Layer::Dense(dense) => dense.in_dim(),
            Layer::Dropout(dropout) => dropout.width(),
        }
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        match self {
            Layer::Dense(dense) => dense.out_dim(),
            Layer::Dropout(dropout) => dropout.width(),
        }
    }

    #[inline]
    pub fn as_dense(&self) -> Option<&Dense> {
        match self {
            Layer::Dense(dense) => Some(dense),
            Layer::Dropout(_) => None,
        }
    }

    #[inline]
    pub fn as_dense_mut(&mut self) -> Option<&mut Dense> {
        match self {
            Layer::Dense(dense) => Some(dense),
            Layer::Dropout(_) => None,
        }
    }
}

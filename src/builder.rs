//! Model builder.
//!
//! `ModelBuilder` is the recommended way to define a model. It makes the layer stack
//! explicit (dense widths + activations, dropout rates) and picks a weight initializer
//! for each dense layer from its activation:
//!
//! - `relu`: He uniform
//! - `softmax` / `identity`: Glorot uniform

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::layer::check_dropout_rate;
use crate::{Activation, Dense, Dropout, Error, Init, Layer, Result, Sequential};

#[derive(Debug, Clone, Copy)]
enum LayerSpec {
    Dense { out_dim: usize, activation: Activation },
    Dropout { rate: f32 },
}

#[derive(Debug, Clone)]
/// Builder for a [`Sequential`] model.
///
/// Example:
///
/// ```rust
/// use digit_mlp::{Activation, ModelBuilder};
///
/// # fn main() -> digit_mlp::Result<()> {
/// let model = ModelBuilder::new(784)?
///     .dense(64, Activation::ReLU)?
///     .dropout(0.2)?
///     .dense(10, Activation::Softmax)?
///     .build_with_seed(0)?;
/// assert_eq!(model.output_dim(), 10);
/// # Ok(())
/// # }
/// ```
pub struct ModelBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
}

impl ModelBuilder {
    /// Start building a model that accepts rows of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
        })
    }

    /// Append a dense layer with `out_dim` outputs.
    pub fn dense(mut self, out_dim: usize, activation: Activation) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        self.layers.push(LayerSpec::Dense {
            out_dim,
            activation,
        });
        Ok(self)
    }

    /// Append a dropout layer over the previous layer's output.
    pub fn dropout(mut self, rate: f32) -> Result<Self> {
        check_dropout_rate(rate)?;
        self.layers.push(LayerSpec::Dropout { rate });
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Sequential> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Sequential> {
        if !self
            .layers
            .iter()
            .any(|spec| matches!(spec, LayerSpec::Dense { .. }))
        {
            return Err(Error::InvalidConfig(
                "model must have at least one dense layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut width = self.input_dim;
        for spec in self.layers {
            match spec {
                LayerSpec::Dense {
                    out_dim,
                    activation,
                } => {
                    let init = default_init_for_activation(activation);
                    let dense = Dense::new_with_rng(width, out_dim, init, activation, rng)?;
                    layers.push(Layer::Dense(dense));
                    width = out_dim;
                }
                LayerSpec::Dropout { rate } => {
                    layers.push(Layer::Dropout(Dropout::new(width, rate)?));
                }
            }
        }

        let model = Sequential::from_layers(self.input_dim, layers)?;
        info!(
            layers = model.num_layers(),
            params = model.param_count(),
            input_dim = model.input_dim(),
            output_dim = model.output_dim(),
            "model built"
        );
        Ok(model)
    }
}

#[inline]
fn default_init_for_activation(act: Activation) -> Init {
    match act {
        Activation::ReLU => Init::HeUniform,
        Activation::Softmax | Activation::Identity => Init::GlorotUniform,
    }
}

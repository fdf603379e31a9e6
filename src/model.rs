use rand::rngs::StdRng;
use tracing::info;

use crate::train::TrainingState;
use crate::{Activation, Dense, Error, Layer, Loss, Metric, Optimizer, OptimizerState, Result};

/// Optimizer, loss and metrics bound to a model by [`Sequential::compile`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileConfig {
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub metrics: Vec<Metric>,
}

impl Default for CompileConfig {
    /// RMSProp with default hyperparameters, categorical cross-entropy, accuracy.
    fn default() -> Self {
        Self {
            optimizer: Optimizer::default(),
            loss: Loss::CategoricalCrossEntropy,
            metrics: vec![Metric::Accuracy],
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Compiled {
    pub(crate) config: CompileConfig,
    pub(crate) optimizer: OptimizerState,
}

/// An ordered stack of layers.
///
/// Lifecycle: build (see [`crate::ModelBuilder`]) -> [`Sequential::compile`] -> `fit` ->
/// `evaluate` / `predict`. Training or evaluating an uncompiled model is an
/// [`Error::InvalidState`].
#[derive(Debug, Clone)]
pub struct Sequential {
    input_dim: usize,
    layers: Vec<Layer>,
    pub(crate) compiled: Option<Compiled>,
    pub(crate) state: TrainingState,
}

/// Forward-pass mode.
///
/// Dropout layers draw their masks from the training RNG and act as the identity at
/// inference.
#[derive(Debug)]
pub enum Mode<'r> {
    Train(&'r mut StdRng),
    Inference,
}

/// What the caller wrote into [`Gradients::d_output_mut`] before backprop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputGrad {
    /// `dL/dy`, the gradient w.r.t. the model output.
    Output,
    /// `dL/dz`, the gradient w.r.t. the final dense layer's pre-activation.
    PreActivation,
}

/// Reusable forward buffers for batches of up to `capacity` rows.
///
/// The output of the most recent forward pass lives inside the scratch.
#[derive(Debug, Clone)]
pub struct BatchScratch {
    capacity: usize,
    batch: usize,
    outputs: Vec<Vec<f32>>,
    // Dropout scale masks from the last training-mode pass; empty for dense layers.
    masks: Vec<Vec<f32>>,
}

/// Parameter gradients for a model (overwrite semantics), for batches of up to
/// `capacity` rows.
#[derive(Debug, Clone)]
pub struct Gradients {
    capacity: usize,
    // Empty for dropout layers.
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,
    // Gradient w.r.t. each layer's output, including the final model output.
    d_outputs: Vec<Vec<f32>>,
}

impl Sequential {
    /// Assemble a model from layers whose widths chain: layer `i`'s input width must equal
    /// layer `i - 1`'s output width (or `input_dim` for the first layer).
    pub fn from_layers(input_dim: usize, layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "model must have at least one layer".to_owned(),
            ));
        }

        let mut width = input_dim;
        for (idx, layer) in layers.iter().enumerate() {
            if layer.in_dim() != width {
                return Err(Error::InvalidShape(format!(
                    "layer {idx} in_dim {} does not match previous width {width}",
                    layer.in_dim()
                )));
            }
            width = layer.out_dim();
        }

        Ok(Self {
            input_dim,
            layers,
            compiled: None,
            state: TrainingState::NotStarted,
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(self.input_dim, Layer::out_dim)
    }

    /// Activation of the final layer, when it is dense.
    pub fn output_activation(&self) -> Option<Activation> {
        self.layers.last().and_then(Layer::as_dense).map(Dense::activation)
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    /// Total number of trainable scalars (dense weights and biases).
    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .filter_map(Layer::as_dense)
            .map(|dense| dense.weights().len() + dense.biases().len())
            .sum()
    }

    /// Bind an optimizer, a loss and metrics to the model.
    ///
    /// Allocates fresh optimizer state; recompiling resets it.
    pub fn compile(&mut self, config: CompileConfig) -> Result<()> {
        let optimizer = config.optimizer.state(&self.layers)?;
        info!(
            optimizer = ?config.optimizer,
            loss = ?config.loss,
            metrics = ?config.metrics,
            "model compiled"
        );
        self.compiled = Some(Compiled { config, optimizer });
        Ok(())
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    #[inline]
    pub fn compile_config(&self) -> Option<&CompileConfig> {
        self.compiled.as_ref().map(|c| &c.config)
    }

    /// State of the most recent (or ongoing) training run.
    #[inline]
    pub fn training_state(&self) -> TrainingState {
        self.state
    }

    pub(crate) fn require_compiled(&self, op: &str) -> Result<&CompileConfig> {
        self.compile_config().ok_or_else(|| {
            Error::InvalidState(format!("model must be compiled before {op}"))
        })
    }

    /// One optimizer step with the compiled optimizer. No-op on an uncompiled model.
    pub(crate) fn apply_gradients(&mut self, grads: &Gradients) {
        if let Some(compiled) = self.compiled.as_mut() {
            compiled.optimizer.step(&mut self.layers, grads);
        }
    }

    pub fn scratch(&self, capacity: usize) -> BatchScratch {
        BatchScratch::new(self, capacity)
    }

    pub fn gradients(&self, capacity: usize) -> Gradients {
        Gradients::new(self, capacity)
    }

    /// Batched forward pass.
    ///
    /// Writes every layer's output into `scratch` and returns the final `(batch, output_dim)`
    /// block.
    ///
    /// Shape contract:
    /// - `inputs.len() == batch * self.input_dim()`
    /// - `batch <= scratch.capacity()` and `scratch` was built for this model
    pub fn forward_batch<'a>(
        &self,
        inputs: &[f32],
        batch: usize,
        scratch: &'a mut BatchScratch,
        mut mode: Mode<'_>,
    ) -> &'a [f32] {
        assert_eq!(
            inputs.len(),
            batch * self.input_dim,
            "inputs len {} does not match batch * input_dim ({batch} * {})",
            inputs.len(),
            self.input_dim
        );
        assert!(
            batch <= scratch.capacity,
            "batch {batch} exceeds scratch capacity {}",
            scratch.capacity
        );
        assert_eq!(
            scratch.outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.outputs.len(),
            self.layers.len()
        );

        scratch.batch = batch;
        for (idx, layer) in self.layers.iter().enumerate() {
            // Borrow the previous output immutably and the current output mutably.
            let (done, rest) = scratch.outputs.split_at_mut(idx);
            let layer_in: &[f32] = if idx == 0 {
                inputs
            } else {
                &done[idx - 1][..batch * layer.in_dim()]
            };
            let layer_out = &mut rest[0][..batch * layer.out_dim()];

            match layer {
                Layer::Dense(dense) => dense.forward_batch(batch, layer_in, layer_out),
                Layer::Dropout(dropout) => match &mut mode {
                    Mode::Train(rng) => {
                        let mask = &mut scratch.masks[idx][..batch * dropout.width()];
                        dropout.forward_train(layer_in, layer_out, mask, &mut **rng);
                    }
                    Mode::Inference => dropout.forward_inference(layer_in, layer_out),
                },
            }
        }

        scratch.output()
    }

    /// Batched backward pass.
    ///
    /// Call [`Sequential::forward_batch`] in [`Mode::Train`] first with the same `inputs`
    /// and `scratch`, and write `dL/d(output)` into `grads.d_output_mut(batch)`.
    /// `grads` is overwritten with the gradients of this batch.
    pub fn backward_batch(
        &self,
        inputs: &[f32],
        batch: usize,
        scratch: &BatchScratch,
        grads: &mut Gradients,
    ) {
        self.backward_batch_from(inputs, batch, scratch, grads, OutputGrad::Output);
    }

    /// Batched backward pass starting from the gradient kind named by `from`.
    ///
    /// With [`OutputGrad::PreActivation`] the final layer must be dense and
    /// `grads.d_output_mut(batch)` holds `dL/dz` for it, so its activation is not
    /// differentiated again (see [`Loss::fuses_with`]).
    pub fn backward_batch_from(
        &self,
        inputs: &[f32],
        batch: usize,
        scratch: &BatchScratch,
        grads: &mut Gradients,
        from: OutputGrad,
    ) {
        assert_eq!(
            inputs.len(),
            batch * self.input_dim,
            "inputs len {} does not match batch * input_dim ({batch} * {})",
            inputs.len(),
            self.input_dim
        );
        assert_eq!(
            scratch.batch, batch,
            "scratch holds a forward pass for batch {}, not {batch}",
            scratch.batch
        );
        assert!(
            batch <= grads.capacity,
            "batch {batch} exceeds gradient capacity {}",
            grads.capacity
        );
        assert_eq!(
            grads.d_outputs.len(),
            self.layers.len(),
            "grads has {} layer entries, model has {} layers",
            grads.d_outputs.len(),
            self.layers.len()
        );
        let last = self.layers.len() - 1;
        if from == OutputGrad::PreActivation {
            assert!(
                self.layers[last].as_dense().is_some(),
                "pre-activation output gradient needs a dense final layer"
            );
        }

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let in_len = batch * layer.in_dim();
            let out_len = batch * layer.out_dim();

            let layer_in: &[f32] = if idx == 0 {
                inputs
            } else {
                &scratch.outputs[idx - 1][..in_len]
            };
            let layer_out = &scratch.outputs[idx][..out_len];

            // The current layer's d_outputs (read, or converted in place) and the previous
            // layer's d_outputs (this layer's d_inputs).
            let (prev, rest) = grads.d_outputs.split_at_mut(idx);
            let d_out = &mut rest[0][..out_len];
            let d_in = prev.last_mut().map(|d| &mut d[..in_len]);

            match layer {
                Layer::Dense(dense) => {
                    if idx != last || from == OutputGrad::Output {
                        dense
                            .activation()
                            .backward_rows(layer_out, d_out, dense.out_dim());
                    }
                    dense.backward_batch(
                        batch,
                        layer_in,
                        d_out,
                        d_in,
                        &mut grads.d_weights[idx],
                        &mut grads.d_biases[idx],
                    );
                }
                Layer::Dropout(dropout) => {
                    if let Some(d_in) = d_in {
                        dropout.backward(d_out, &scratch.masks[idx][..out_len], d_in);
                    }
                }
            }
        }
    }
}

impl BatchScratch {
    pub fn new(model: &Sequential, capacity: usize) -> Self {
        let mut outputs = Vec::with_capacity(model.layers.len());
        let mut masks = Vec::with_capacity(model.layers.len());
        for layer in &model.layers {
            outputs.push(vec![0.0; capacity * layer.out_dim()]);
            masks.push(match layer {
                Layer::Dense(_) => Vec::new(),
                Layer::Dropout(dropout) => vec![1.0; capacity * dropout.width()],
            });
        }
        Self {
            capacity,
            batch: 0,
            outputs,
            masks,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Final-layer output of the most recent forward pass, `(batch, output_dim)`.
    #[inline]
    pub fn output(&self) -> &[f32] {
        let last = self
            .outputs
            .last()
            .expect("scratch must have at least one layer output");
        let width = last.len() / self.capacity.max(1);
        &last[..self.batch * width]
    }
}

impl Gradients {
    pub fn new(model: &Sequential, capacity: usize) -> Self {
        let mut d_weights = Vec::with_capacity(model.layers.len());
        let mut d_biases = Vec::with_capacity(model.layers.len());
        let mut d_outputs = Vec::with_capacity(model.layers.len());

        for layer in &model.layers {
            match layer.as_dense() {
                Some(dense) => {
                    d_weights.push(vec![0.0; dense.weights().len()]);
                    d_biases.push(vec![0.0; dense.out_dim()]);
                }
                None => {
                    d_weights.push(Vec::new());
                    d_biases.push(Vec::new());
                }
            }
            d_outputs.push(vec![0.0; capacity * layer.out_dim()]);
        }

        Self {
            capacity,
            d_weights,
            d_biases,
            d_outputs,
        }
    }

    /// Mutable view of the upstream gradient for the final model output, `(batch, output_dim)`.
    ///
    /// Typical training flow:
    /// - `model.forward_batch(inputs, batch, &mut scratch, Mode::Train(&mut rng))`
    /// - the loss writes `dL/d(output)` into `grads.d_output_mut(batch)`
    /// - `model.backward_batch(inputs, batch, &scratch, &mut grads)`
    #[inline]
    pub fn d_output_mut(&mut self, batch: usize) -> &mut [f32] {
        assert!(batch <= self.capacity, "batch {batch} exceeds gradient capacity");
        let last = self
            .d_outputs
            .last_mut()
            .expect("model must have at least one layer");
        let width = last.len() / self.capacity.max(1);
        &mut last[..batch * width]
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}

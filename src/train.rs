//! Training and evaluation loops.
//!
//! `fit` walks a small state machine per run:
//!
//! ```text
//! NotStarted -> EpochInProgress(1) -> EpochComplete(1) -> ... -> EpochComplete(n) -> Finished
//! ```
//!
//! All per-step buffers (batch gather buffers, forward scratch, gradients, shuffle order)
//! are allocated once per `fit` call and reused for every step.

use std::fmt;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::metrics::{argmax, correct_count};
use crate::{BatchScratch, Dataset, Error, Inputs, Loss, Mode, OutputGrad, Result, Sequential};

/// Batch size used by `evaluate` and `predict`. Results do not depend on it.
pub const INFERENCE_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of rows, taken from the end of the dataset, held out for validation.
    pub validation_split: f32,
    /// Reshuffle the training rows at the start of every epoch.
    pub shuffle: bool,
    /// Seeds both the shuffle order and the dropout masks.
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 256,
            validation_split: 0.2,
            shuffle: true,
            seed: 0,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.validation_split.is_finite() && (0.0..1.0).contains(&self.validation_split)) {
            return Err(Error::InvalidConfig(format!(
                "validation_split must be finite and in [0,1), got {}",
                self.validation_split
            )));
        }
        Ok(())
    }
}

/// Where a model is in its most recent training run. Epochs are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    NotStarted,
    EpochInProgress(usize),
    EpochComplete(usize),
    Finished,
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingState::NotStarted => write!(f, "not-started"),
            TrainingState::EpochInProgress(e) => write!(f, "epoch-{e}-in-progress"),
            TrainingState::EpochComplete(e) => write!(f, "epoch-{e}-complete"),
            TrainingState::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpochReport {
    /// 1-based epoch index.
    pub epoch: usize,
    /// Mean training loss, measured with dropout active.
    pub loss: f32,
    pub accuracy: f32,
    /// `None` when `validation_split` holds out no rows.
    pub validation: Option<EvalReport>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
}

impl FitReport {
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvalReport {
    pub loss: f32,
    pub accuracy: f32,
}

impl Sequential {
    /// Train on `data` with the compiled optimizer and loss.
    ///
    /// The first `floor(len * (1 - validation_split))` rows are trained on and the rest are
    /// held out (before shuffling) and evaluated after every epoch. Training rows are visited
    /// in mini-batches of `batch_size` (the last batch may be smaller). `epochs == 0` leaves the weights untouched.
    pub fn fit(&mut self, data: &Dataset, cfg: &FitConfig) -> Result<FitReport> {
        let loss = self.require_compiled("fit")?.loss;
        cfg.validate()?;
        self.check_dataset(data)?;

        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }
        let split_at = data.validation_split_index(cfg.validation_split)?;
        if split_at == 0 {
            return Err(Error::InvalidData(format!(
                "validation_split {} leaves none of the {} rows for training",
                cfg.validation_split,
                data.len()
            )));
        }

        self.state = TrainingState::NotStarted;
        let mut report = FitReport {
            epochs: Vec::with_capacity(cfg.epochs),
        };
        if cfg.epochs == 0 {
            self.transition(TrainingState::Finished);
            return Ok(report);
        }

        let in_dim = self.input_dim();
        let out_dim = self.output_dim();
        let capacity = cfg.batch_size.min(split_at);

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut order: Vec<usize> = (0..split_at).collect();
        let mut batch_inputs = vec![0.0_f32; capacity * in_dim];
        let mut batch_targets = vec![0.0_f32; capacity * out_dim];
        let mut scratch = self.scratch(capacity);
        let mut grads = self.gradients(capacity);
        let validation = split_at..data.len();
        let from = match self.output_activation() {
            Some(act) if loss.fuses_with(act) => OutputGrad::PreActivation,
            _ => OutputGrad::Output,
        };

        info!(
            train_rows = split_at,
            validation_rows = validation.len(),
            epochs = cfg.epochs,
            batch_size = cfg.batch_size,
            "fit started"
        );

        for epoch in 1..=cfg.epochs {
            self.transition(TrainingState::EpochInProgress(epoch));

            if cfg.shuffle {
                order.shuffle(&mut rng);
            }

            let mut loss_sum = 0.0_f64;
            let mut correct = 0_usize;
            for chunk in order.chunks(cfg.batch_size) {
                let batch = chunk.len();
                let x = &mut batch_inputs[..batch * in_dim];
                let t = &mut batch_targets[..batch * out_dim];
                data.gather(chunk, x, t);

                let pred = self.forward_batch(x, batch, &mut scratch, Mode::Train(&mut rng));
                correct += correct_count(pred, t, out_dim);
                let d_output = grads.d_output_mut(batch);
                let batch_loss = match from {
                    OutputGrad::PreActivation => loss.backward_fused(pred, t, out_dim, d_output),
                    OutputGrad::Output => loss.backward(pred, t, out_dim, d_output),
                };
                loss_sum += f64::from(batch_loss) * batch as f64;

                self.backward_batch_from(x, batch, &scratch, &mut grads, from);
                self.apply_gradients(&grads);
            }

            let validation_report = if validation.is_empty() {
                None
            } else {
                Some(self.evaluate_rows(data, validation.clone(), loss, &mut scratch))
            };

            let epoch_report = EpochReport {
                epoch,
                loss: (loss_sum / split_at as f64) as f32,
                accuracy: correct as f32 / split_at as f32,
                validation: validation_report,
            };
            info!(
                epoch,
                epochs = cfg.epochs,
                loss = epoch_report.loss,
                accuracy = epoch_report.accuracy,
                val_loss = validation_report.map(|v| v.loss),
                val_accuracy = validation_report.map(|v| v.accuracy),
                "epoch complete"
            );
            report.epochs.push(epoch_report);
            self.transition(TrainingState::EpochComplete(epoch));
        }

        self.transition(TrainingState::Finished);
        Ok(report)
    }

    /// Mean loss and accuracy over `data`, with dropout disabled.
    pub fn evaluate(&self, data: &Dataset) -> Result<EvalReport> {
        let loss = self.require_compiled("evaluate")?.loss;
        self.check_dataset(data)?;
        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }

        let mut scratch = self.scratch(INFERENCE_BATCH_SIZE.min(data.len()));
        let report = self.evaluate_rows(data, 0..data.len(), loss, &mut scratch);
        info!(
            rows = data.len(),
            loss = report.loss,
            accuracy = report.accuracy,
            "evaluation complete"
        );
        Ok(report)
    }

    /// Class probabilities for every row of `inputs`, flat `(len, output_dim)`.
    pub fn predict(&self, inputs: &Inputs) -> Result<Vec<f32>> {
        if inputs.input_dim() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "inputs input_dim {} does not match model input_dim {}",
                inputs.input_dim(),
                self.input_dim()
            )));
        }

        let out_dim = self.output_dim();
        let mut preds = Vec::with_capacity(inputs.len() * out_dim);
        let mut scratch = self.scratch(INFERENCE_BATCH_SIZE.min(inputs.len()));
        for start in (0..inputs.len()).step_by(INFERENCE_BATCH_SIZE) {
            let end = (start + INFERENCE_BATCH_SIZE).min(inputs.len());
            let out = self.forward_batch(
                inputs.rows(start..end),
                end - start,
                &mut scratch,
                Mode::Inference,
            );
            preds.extend_from_slice(out);
        }
        Ok(preds)
    }

    /// Predicted class index (argmax of the probabilities) for every row of `inputs`.
    pub fn predict_classes(&self, inputs: &Inputs) -> Result<Vec<usize>> {
        let out_dim = self.output_dim();
        let probs = self.predict(inputs)?;
        Ok(probs.chunks_exact(out_dim).map(argmax).collect())
    }

    fn evaluate_rows(
        &self,
        data: &Dataset,
        rows: Range<usize>,
        loss: Loss,
        scratch: &mut BatchScratch,
    ) -> EvalReport {
        let out_dim = self.output_dim();
        let step = scratch.capacity().max(1);
        let total = rows.len();

        let mut loss_sum = 0.0_f64;
        let mut correct = 0_usize;
        for start in rows.clone().step_by(step) {
            let end = (start + step).min(rows.end);
            let batch = end - start;
            let inputs = data.inputs().rows(start..end);
            let pred = self.forward_batch(inputs, batch, scratch, Mode::Inference);
            let targets = data.target_rows(start..end);
            loss_sum += f64::from(loss.forward(pred, targets, out_dim)) * batch as f64;
            correct += correct_count(pred, targets, out_dim);
        }

        EvalReport {
            loss: (loss_sum / total as f64) as f32,
            accuracy: correct as f32 / total as f32,
        }
    }

    fn check_dataset(&self, data: &Dataset) -> Result<()> {
        if data.input_dim() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "dataset input_dim {} does not match model input_dim {}",
                data.input_dim(),
                self.input_dim()
            )));
        }
        if data.target_dim() != self.output_dim() {
            return Err(Error::InvalidShape(format!(
                "dataset target_dim {} does not match model output_dim {}",
                data.target_dim(),
                self.output_dim()
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: TrainingState) {
        debug!(from = %self.state, to = %next, "training state");
        self.state = next;
    }
}

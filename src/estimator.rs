//! The capability a trainable classifier exposes to the pipeline.

use crate::{Dataset, EvalReport, FitConfig, FitReport, Inputs, Result, Sequential};

/// Something that can be trained, scored and queried.
///
/// The pipeline only talks to models through this trait.
pub trait Estimator {
    fn fit(&mut self, data: &Dataset, cfg: &FitConfig) -> Result<FitReport>;

    /// Scores `data` without changing the model.
    fn evaluate(&self, data: &Dataset) -> Result<EvalReport>;

    /// Output rows, flat `(len, output_dim)`.
    fn predict(&self, inputs: &Inputs) -> Result<Vec<f32>>;
}

impl Estimator for Sequential {
    fn fit(&mut self, data: &Dataset, cfg: &FitConfig) -> Result<FitReport> {
        Sequential::fit(self, data, cfg)
    }

    fn evaluate(&self, data: &Dataset) -> Result<EvalReport> {
        Sequential::evaluate(self, data)
    }

    fn predict(&self, inputs: &Inputs) -> Result<Vec<f32>> {
        Sequential::predict(self, inputs)
    }
}

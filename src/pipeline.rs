//! The end-to-end digit classification run: data, model, training, evaluation.
//!
//! Training and scoring go through [`train_and_evaluate`], which reports each [`Stage`]
//! so the binary can narrate progress. Tests call [`run_with_data`] on synthetic data.

use tracing::info;

use crate::mnist::{Mnist, NUM_CLASSES};
use crate::preprocess::to_dataset;
use crate::{
    Activation, CompileConfig, Dataset, Estimator, EvalReport, FitConfig, FitReport, Loss,
    Metric, ModelBuilder, Optimizer, PipelineConfig, Result, RmsPropConfig, Sequential,
};

/// Flattened 28x28 image width.
pub const INPUT_DIM: usize = 28 * 28;

/// The classifier:
///
/// ```text
/// Dense(784 -> 1024, relu) -> Dropout(0.4)
/// Dense(1024 -> 256, relu) -> Dropout(0.3)
/// Dense(256 -> 64, relu)   -> Dropout(0.2)
/// Dense(64 -> 10, softmax)
/// ```
pub fn digit_classifier(seed: u64) -> Result<Sequential> {
    ModelBuilder::new(INPUT_DIM)?
        .dense(1024, Activation::ReLU)?
        .dropout(0.4)?
        .dense(256, Activation::ReLU)?
        .dropout(0.3)?
        .dense(64, Activation::ReLU)?
        .dropout(0.2)?
        .dense(NUM_CLASSES, Activation::Softmax)?
        .build_with_seed(seed)
}

/// RMSProp, categorical cross-entropy, accuracy.
pub fn compile_config(optimizer: RmsPropConfig) -> CompileConfig {
    CompileConfig {
        optimizer: Optimizer::RmsProp(optimizer),
        loss: Loss::CategoricalCrossEntropy,
        metrics: vec![Metric::Accuracy],
    }
}

/// Train and test splits as model-ready datasets (flattened, scaled, one-hot).
pub fn prepare(mnist: &Mnist) -> Result<(Dataset, Dataset)> {
    let train = to_dataset(&mnist.train_images, &mnist.train_labels, NUM_CLASSES)?;
    let test = to_dataset(&mnist.test_images, &mnist.test_labels, NUM_CLASSES)?;
    info!(train = train.len(), test = test.len(), "data preprocessed");
    Ok((train, test))
}

/// Progress of [`train_and_evaluate`], reported before and after each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage<'a> {
    Fitting,
    Fitted(&'a FitReport),
    Evaluating,
}

/// Fit on `train`, then score on `test`, calling `on_stage` as each step starts or ends.
pub fn train_and_evaluate<E, F>(
    model: &mut E,
    train: &Dataset,
    test: &Dataset,
    cfg: &FitConfig,
    mut on_stage: F,
) -> Result<(FitReport, EvalReport)>
where
    E: Estimator,
    F: FnMut(Stage<'_>),
{
    on_stage(Stage::Fitting);
    let history = model.fit(train, cfg)?;
    on_stage(Stage::Fitted(&history));
    on_stage(Stage::Evaluating);
    let score = model.evaluate(test)?;
    Ok((history, score))
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub model: Sequential,
    pub history: FitReport,
    pub test: EvalReport,
}

/// Build, compile, train and evaluate the classifier on already-loaded data.
pub fn run_with_data(cfg: &PipelineConfig, mnist: &Mnist) -> Result<PipelineReport> {
    cfg.validate()?;
    let (train, test) = prepare(mnist)?;

    let mut model = digit_classifier(cfg.seed)?;
    model.compile(compile_config(cfg.optimizer))?;

    let (history, score) =
        train_and_evaluate(&mut model, &train, &test, &cfg.fit_config(), |_| {})?;
    info!(test_loss = score.loss, test_acc = score.accuracy, "run complete");
    Ok(PipelineReport {
        model,
        history,
        test: score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_has_the_documented_stack() {
        let model = digit_classifier(42).unwrap();
        let shapes: Vec<(usize, usize)> = model
            .layers()
            .iter()
            .map(|l| (l.in_dim(), l.out_dim()))
            .collect();
        assert_eq!(
            shapes,
            vec![
                (784, 1024),
                (1024, 1024),
                (1024, 256),
                (256, 256),
                (256, 64),
                (64, 64),
                (64, 10),
            ]
        );

        let rates: Vec<f32> = model
            .layers()
            .iter()
            .filter_map(|l| match l {
                crate::Layer::Dropout(d) => Some(d.rate()),
                crate::Layer::Dense(_) => None,
            })
            .collect();
        assert_eq!(rates, vec![0.4, 0.3, 0.2]);

        let last = model.layer(6).unwrap().as_dense().unwrap();
        assert_eq!(last.activation(), Activation::Softmax);
        assert_eq!(
            model.param_count(),
            784 * 1024 + 1024 + 1024 * 256 + 256 + 256 * 64 + 64 + 64 * 10 + 10
        );
    }

    #[test]
    fn compile_config_is_rmsprop_crossentropy_accuracy() {
        let cfg = compile_config(RmsPropConfig::default());
        assert_eq!(cfg, CompileConfig::default());
    }
}

use std::path::Path;

use digit_mlp::mnist::{IMAGE_COLS, IMAGE_ROWS, NUM_CLASSES};
use digit_mlp::pipeline::{
    compile_config, digit_classifier, run_with_data, train_and_evaluate, Stage,
};
use digit_mlp::preprocess::to_dataset;
use digit_mlp::{
    Activation, CompileConfig, Dataset, Error, Estimator, FitConfig, ImageSet, Inputs, Mnist,
    ModelBuilder, Mode, PipelineConfig, RmsPropConfig, Sequential, TrainingState,
};

const PIXELS: usize = IMAGE_ROWS * IMAGE_COLS;

/// Synthetic "digits": class `c` lights up a distinct horizontal band of rows.
fn banded_images(count: usize) -> (ImageSet, Vec<u8>) {
    let mut pixels = vec![0_u8; count * PIXELS];
    let mut labels = Vec::with_capacity(count);
    for (idx, image) in pixels.chunks_exact_mut(PIXELS).enumerate() {
        let class = idx % NUM_CLASSES;
        let top = class * 2 + 4;
        for row in top..top + 2 {
            for col in 4..24 {
                image[row * IMAGE_COLS + col] = 200 + (idx % 50) as u8;
            }
        }
        labels.push(class as u8);
    }
    let images = ImageSet::new(count, IMAGE_ROWS, IMAGE_COLS, pixels).unwrap();
    (images, labels)
}

fn banded_mnist(train: usize, test: usize) -> Mnist {
    let (train_images, train_labels) = banded_images(train);
    let (test_images, test_labels) = banded_images(test);
    Mnist {
        train_images,
        train_labels,
        test_images,
        test_labels,
    }
}

fn dense_weights(model: &Sequential) -> Vec<Vec<f32>> {
    model
        .layers()
        .iter()
        .filter_map(|l| l.as_dense())
        .map(|d| d.weights().to_vec())
        .collect()
}

#[test]
fn zero_epochs_leaves_weights_unchanged() {
    let mut model = digit_classifier(42).unwrap();
    model.compile(CompileConfig::default()).unwrap();
    let before = dense_weights(&model);

    let (images, labels) = banded_images(20);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();
    let cfg = FitConfig {
        epochs: 0,
        ..FitConfig::default()
    };
    let report = model.fit(&data, &cfg).unwrap();

    assert!(report.epochs.is_empty());
    assert_eq!(model.training_state(), TrainingState::Finished);
    assert_eq!(dense_weights(&model), before);
}

#[test]
fn fit_and_evaluate_require_compile() {
    let mut model = digit_classifier(42).unwrap();
    let (images, labels) = banded_images(10);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();

    assert!(matches!(
        model.fit(&data, &FitConfig::default()),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(model.evaluate(&data), Err(Error::InvalidState(_))));
    assert_eq!(model.training_state(), TrainingState::NotStarted);
}

#[test]
fn blank_image_gives_a_probability_vector() {
    let model = digit_classifier(42).unwrap();
    let blank = Inputs::from_flat(vec![0.0; PIXELS], PIXELS).unwrap();

    let probs = model.predict(&blank).unwrap();
    assert_eq!(probs.len(), NUM_CLASSES);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5, "sum={sum}");
}

#[test]
fn batch_outputs_are_rows_of_probabilities() {
    let model = digit_classifier(7).unwrap();
    let (images, labels) = banded_images(13);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();

    let mut scratch = model.scratch(data.len());
    let out = model.forward_batch(
        data.inputs().as_flat(),
        data.len(),
        &mut scratch,
        Mode::Inference,
    );
    assert_eq!(out.len(), 13 * NUM_CLASSES);
    for row in out.chunks_exact(NUM_CLASSES) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn inference_is_deterministic_despite_dropout() {
    let model = ModelBuilder::new(4)
        .unwrap()
        .dropout(0.5)
        .unwrap()
        .dense(3, Activation::Softmax)
        .unwrap()
        .build_with_seed(1)
        .unwrap();
    let inputs = Inputs::from_flat(vec![0.5, -1.0, 2.0, 0.25, 1.0, 1.0, 0.0, -0.5], 4).unwrap();

    let first = model.predict(&inputs).unwrap();
    let second = model.predict(&inputs).unwrap();
    assert_eq!(first, second);
}

#[test]
fn classifier_learns_synthetic_digits() {
    let mnist = banded_mnist(400, 100);
    let cfg = PipelineConfig {
        epochs: 5,
        batch_size: 32,
        ..PipelineConfig::default()
    };

    let report = run_with_data(&cfg, &mnist).unwrap();
    assert_eq!(report.history.epochs.len(), 5);
    assert_eq!(report.model.training_state(), TrainingState::Finished);
    for epoch in &report.history.epochs {
        let val = epoch.validation.expect("validation split is 0.2");
        assert!(val.loss.is_finite());
    }
    assert!(
        report.test.accuracy > 0.8,
        "test accuracy {}",
        report.test.accuracy
    );
}

#[test]
fn estimator_seam_drives_any_model() {
    fn score<E: Estimator>(model: &mut E, train: &Dataset, test: &Dataset) -> f32 {
        let cfg = FitConfig {
            epochs: 2,
            batch_size: 16,
            ..FitConfig::default()
        };
        let (history, eval) = train_and_evaluate(model, train, test, &cfg, |_| {}).unwrap();
        assert_eq!(history.epochs.len(), 2);
        eval.accuracy
    }

    let (images, labels) = banded_images(80);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();
    let mut model = digit_classifier(3).unwrap();
    model
        .compile(compile_config(RmsPropConfig::default()))
        .unwrap();

    let acc = score(&mut model, &data, &data);
    assert!((0.0..=1.0).contains(&acc));
}

#[test]
fn stages_are_reported_in_order() {
    let (images, labels) = banded_images(40);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();
    let mut model = digit_classifier(5).unwrap();
    model
        .compile(compile_config(RmsPropConfig::default()))
        .unwrap();
    let cfg = FitConfig {
        epochs: 2,
        batch_size: 16,
        ..FitConfig::default()
    };

    let mut seen = Vec::new();
    let (history, _) = train_and_evaluate(&mut model, &data, &data, &cfg, |stage| {
        seen.push(match stage {
            Stage::Fitting => "fitting".to_owned(),
            Stage::Fitted(report) => format!("fitted {}", report.epochs.len()),
            Stage::Evaluating => "evaluating".to_owned(),
        })
    })
    .unwrap();

    assert_eq!(history.epochs.len(), 2);
    assert_eq!(seen, ["fitting", "fitted 2", "evaluating"]);
}

#[test]
fn failed_fit_stops_before_evaluation() {
    let (images, labels) = banded_images(10);
    let data = to_dataset(&images, &labels, NUM_CLASSES).unwrap();
    let mut model = digit_classifier(5).unwrap();

    let mut stages = 0;
    let result = train_and_evaluate(&mut model, &data, &data, &FitConfig::default(), |stage| {
        assert_eq!(stage, Stage::Fitting);
        stages += 1;
    });
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(stages, 1);
}

/// Full run on the real dataset. Place the four IDX files (optionally `.gz`) in
/// `data/mnist/` and run with `cargo test --release -- --ignored`.
#[test]
#[ignore = "needs the MNIST files on disk"]
fn reference_run_reaches_ninety_percent() {
    let cfg = PipelineConfig {
        data_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("data/mnist"),
        ..PipelineConfig::default()
    };
    let mnist = Mnist::load(&cfg.data_dir).unwrap();
    let report = run_with_data(&cfg, &mnist).unwrap();

    assert_eq!(report.history.epochs.len(), 10);
    assert!(
        report.test.accuracy > 0.90,
        "test accuracy {}",
        report.test.accuracy
    );
}

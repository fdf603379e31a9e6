#![cfg(feature = "serde")]

use digit_mlp::{CompileConfig, FitConfig, PipelineConfig};

#[test]
fn pipeline_config_round_trips_through_json() {
    let cfg = PipelineConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    let back: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn configs_read_from_handwritten_json() {
    let fit: FitConfig = serde_json::from_str(
        r#"{"epochs": 3, "batch_size": 64, "validation_split": 0.1, "shuffle": false, "seed": 9}"#,
    )
    .unwrap();
    assert_eq!(fit.epochs, 3);
    assert!(!fit.shuffle);
    assert!(fit.validate().is_ok());

    let compile: CompileConfig = serde_json::from_str(
        r#"{
            "optimizer": {"RmsProp": {"learning_rate": 0.001, "rho": 0.9, "epsilon": 1e-7}},
            "loss": "CategoricalCrossEntropy",
            "metrics": ["Accuracy"]
        }"#,
    )
    .unwrap();
    assert_eq!(compile, CompileConfig::default());
}

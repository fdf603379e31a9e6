//! Pipeline configuration.

use std::path::PathBuf;

use crate::{Error, FitConfig, Result, RmsPropConfig};

/// Compute device. Only the CPU is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device {
    #[default]
    Cpu,
}

/// Everything the end-to-end run needs, passed explicitly instead of living in globals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Seeds weight init, shuffling and dropout.
    pub seed: u64,
    pub device: Device,
    /// Directory holding the four MNIST IDX files (optionally `.gz`).
    pub data_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub optimizer: RmsPropConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            device: Device::Cpu,
            data_dir: PathBuf::from("data/mnist"),
            epochs: 10,
            batch_size: 256,
            validation_split: 0.2,
            optimizer: RmsPropConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_split: self.validation_split,
            shuffle: true,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("data_dir must not be empty".to_owned()));
        }
        crate::Optimizer::RmsProp(self.optimizer).validate()?;
        self.fit_config().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_run() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.device, Device::Cpu);
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.batch_size, 256);
        assert_eq!(cfg.validation_split, 0.2);
        assert!(cfg.validate().is_ok());

        let fit = cfg.fit_config();
        assert_eq!(fit.seed, 42);
        assert!(fit.shuffle);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cfg = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = PipelineConfig {
            data_dir: PathBuf::new(),
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

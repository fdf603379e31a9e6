//! A dense feed-forward digit classifier for MNIST.
//!
//! `digit-mlp` is a from-scratch implementation of a Keras-style `Sequential` model: dense
//! layers with ReLU/softmax activations, inverted dropout, RMSProp, categorical
//! cross-entropy and an accuracy metric, plus an IDX loader for the MNIST files.
//!
//! # Lifecycle
//!
//! build ([`ModelBuilder`]) -> [`Sequential::compile`] -> [`Sequential::fit`] ->
//! [`Sequential::evaluate`] / [`Sequential::predict`]. Calling `fit` or `evaluate` on an
//! uncompiled model returns [`Error::InvalidState`].
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse): [`Sequential::forward_batch`],
//!   [`Sequential::backward_batch`]. Shape mismatches are programmer error and trip an
//!   `assert!`.
//! - Everything else validates its inputs and returns [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - [`Dataset`] and [`Inputs`] store samples contiguously in row-major layout.
//! - Dense weights are row-major with shape `(out_dim, in_dim)`.
//! - Batches are flat row-major buffers of `batch * width` scalars.
//!
//! # Quick start
//!
//! ```rust
//! use digit_mlp::{Activation, CompileConfig, Dataset, FitConfig, ModelBuilder};
//!
//! # fn main() -> digit_mlp::Result<()> {
//! // Two classes: the sign of the first feature.
//! let inputs = vec![1.0, 0.5, 0.8, -0.2, -1.0, 0.3, -0.7, -0.4];
//! let targets = vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0];
//! let train = Dataset::from_flat(inputs, targets, 2, 2)?;
//!
//! let mut model = ModelBuilder::new(2)?
//!     .dense(8, Activation::ReLU)?
//!     .dropout(0.1)?
//!     .dense(2, Activation::Softmax)?
//!     .build_with_seed(0)?;
//! model.compile(CompileConfig::default())?;
//!
//! let history = model.fit(
//!     &train,
//!     &FitConfig {
//!         epochs: 5,
//!         batch_size: 2,
//!         validation_split: 0.0,
//!         ..FitConfig::default()
//!     },
//! )?;
//! assert_eq!(history.epochs.len(), 5);
//!
//! let score = model.evaluate(&train)?;
//! assert!((0.0..=1.0).contains(&score.accuracy));
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod env;
pub mod error;
pub mod estimator;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod metrics;
pub mod mnist;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod preprocess;
pub mod train;

pub use activation::Activation;
pub use builder::ModelBuilder;
pub use config::{Device, PipelineConfig};
pub use data::{Dataset, Inputs};
pub use env::Environment;
pub use error::{Error, Result};
pub use estimator::Estimator;
pub use layer::{Dense, Dropout, Init, Layer};
pub use loss::Loss;
pub use metrics::Metric;
pub use mnist::{ImageSet, Mnist};
pub use model::{BatchScratch, CompileConfig, Gradients, Mode, OutputGrad, Sequential};
pub use optim::{Optimizer, OptimizerState, RmsPropConfig};
pub use pipeline::PipelineReport;
pub use train::{EpochReport, EvalReport, FitConfig, FitReport, TrainingState};

use anyhow::{Context, Result};
use tracing::Level;

use digit_mlp::mnist::Mnist;
use digit_mlp::pipeline::{compile_config, digit_classifier, prepare, train_and_evaluate, Stage};
use digit_mlp::{EpochReport, Environment, PipelineConfig};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn epoch_line(epoch: &EpochReport, epochs: usize) -> String {
    let mut line = format!(
        "Epoch {}/{} - loss: {:.4} - accuracy: {:.4}",
        epoch.epoch, epochs, epoch.loss, epoch.accuracy
    );
    if let Some(val) = epoch.validation {
        line.push_str(&format!(
            " - val_loss: {:.4} - val_accuracy: {:.4}",
            val.loss, val.accuracy
        ));
    }
    line
}

fn main() -> Result<()> {
    init_logging();

    let cfg = PipelineConfig::default();
    cfg.validate().context("invalid pipeline config")?;

    let env = Environment::probe();
    println!("Running mnist character recognition");
    println!("using digit-mlp version {}", env.version);
    println!("Num GPUs Available:  {}", env.accelerators.len());
    println!("{:?}", env.accelerators);
    tracing::info!(
        device = ?cfg.device,
        gemm = env.gemm_backend,
        cpus = env.cpu_parallelism,
        "environment"
    );

    println!("getting the data");
    let mnist = Mnist::load(&cfg.data_dir)
        .with_context(|| format!("loading MNIST from {}", cfg.data_dir.display()))?;

    println!("train_images.shape");
    let (count, rows, cols) = mnist.train_images.shape();
    println!("({count}, {rows}, {cols})");

    println!("defining the model");
    println!("adding layers");
    let mut model = digit_classifier(cfg.seed).context("building the model")?;

    println!("compiling the model");
    model
        .compile(compile_config(cfg.optimizer))
        .context("compiling the model")?;

    let (train, test) = prepare(&mnist).context("preprocessing the data")?;

    let fit_cfg = cfg.fit_config();
    let (_, score) = train_and_evaluate(&mut model, &train, &test, &fit_cfg, |stage| match stage {
        Stage::Fitting => println!("fitting the model"),
        Stage::Fitted(history) => {
            for epoch in &history.epochs {
                println!("{}", epoch_line(epoch, fit_cfg.epochs));
            }
        }
        Stage::Evaluating => println!("evaluating the model"),
    })
    .context("training and evaluating the model")?;
    println!("test_acc: {}", score.accuracy);
    Ok(())
}

// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`     — array-fed training with callbacks
//   2. `train-raw` — folder-fed training with fixed step counts
//   3. `evaluate`  — score a saved checkpoint on a folder
//
// The backend is picked here: training needs an autodiff
// backend, evaluation the plain one.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use clap::Parser;
use commands::{BackendKind, Commands, EvaluateArgs, TrainArgs, TrainRawArgs};

use crate::application::{
    evaluate_use_case::EvaluateUseCase,
    train_raw_use_case::{TrainRawConfig, TrainRawUseCase},
    train_use_case::{TrainConfig, TrainUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "vision-trainer",
    version,
    about = "Train and evaluate ResNet image classifiers on class-per-directory image folders."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::TrainRaw(args) => run_train_raw(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let backend = args.backend;
    let cfg = match &args.config {
        Some(path) => {
            tracing::info!("Loading run configuration from '{}'", path.display());
            TrainConfig::from_json_file(path)?
        }
        None => args.into(),
    };
    tracing::info!("Starting training on images in: {}", cfg.train_dir);

    let use_case = TrainUseCase::new(cfg);
    match backend {
        BackendKind::Wgpu    => train_on::<Autodiff<Wgpu>>(&use_case, &WgpuDevice::default()),
        BackendKind::Ndarray => train_on::<Autodiff<NdArray>>(&use_case, &NdArrayDevice::default()),
    }
}

fn train_on<B: AutodiffBackend>(use_case: &TrainUseCase, device: &B::Device) -> Result<()> {
    tracing::info!("Using device: {:?}", device);
    let report = use_case.execute::<B>(device)?;
    println!("Training complete after {} epochs. Checkpoint saved.", report.history.len());
    let best = report
        .history
        .series("val_acc")
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))));
    if let Some(best) = best {
        println!("Best val_acc: {:.2}%", best * 100.0);
    }
    Ok(())
}

fn run_train_raw(args: TrainRawArgs) -> Result<()> {
    let backend  = args.backend;
    let cfg: TrainRawConfig = args.into();
    let use_case = TrainRawUseCase::new(cfg);

    let history = match backend {
        BackendKind::Wgpu    => use_case.execute::<Autodiff<Wgpu>>(&WgpuDevice::default())?,
        BackendKind::Ndarray => use_case.execute::<Autodiff<NdArray>>(&NdArrayDevice::default())?,
    };
    if let Some(last) = history.last() {
        println!("Final epoch: {}", last.summary());
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let use_case = EvaluateUseCase::new(args.checkpoint_dir, args.test_dir)
        .with_batch_size(args.batch_size);

    let eval = match args.backend {
        BackendKind::Wgpu    => use_case.execute::<Wgpu>(&WgpuDevice::default())?,
        BackendKind::Ndarray => use_case.execute::<NdArray>(&NdArrayDevice::default())?,
    };
    println!(
        "Evaluated {} images | loss={:.4} | accuracy={:.2}%",
        eval.samples,
        eval.loss,
        eval.accuracy * 100.0
    );
    Ok(())
}

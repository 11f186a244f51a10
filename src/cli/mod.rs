// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   - operator-run k-fold training of the ensemble
//   2. `predict` - classify one image, print JSON for the relay
//   3. `submit`  - validate and store a new labelled image
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::fs;

use anyhow::{Context, Result};
use burn::prelude::Backend;
use clap::Parser;
use commands::{Commands, PredictArgs, SubmitArgs, TrainArgs};

use crate::application::{
    predict_use_case::PredictUseCase,
    submit_use_case::{SubmitReceipt, SubmitUseCase},
    train_use_case::TrainUseCase,
};
use crate::domain::error::PipelineError;
use crate::infra::sample_store::SampleStore;
use crate::ml::{
    backend::{self, BackendKind, CpuBackend, GpuBackend},
    ensemble::Ensemble,
};

#[derive(Parser, Debug)]
#[command(
    name = "cricket-ball-classifier",
    version,
    about = "Train a k-fold ResNet ensemble on cricket ball photos, then classify new ones."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Submit(args) => run_submit(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = args.to_config()?;
    let backend = BackendKind::resolve(args.backend);
    tracing::info!(
        "Starting training on '{}' → '{}'",
        config.dataset_dir.display(),
        config.models_dir.display()
    );

    let report = TrainUseCase::new(config, backend).execute()?;

    if let Some(summary) = &report.summary {
        println!(
            "Training complete. {} models saved to '{}' (CV accuracy {:.2}% ± {:.2}%).",
            report.folds.len(),
            report.models_dir.display(),
            summary.mean * 100.0,
            summary.std_dev * 100.0
        );
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    match BackendKind::resolve(args.backend) {
        BackendKind::Wgpu => predict_on::<GpuBackend>(&args, backend::gpu_device()),
        BackendKind::Cpu => predict_on::<CpuBackend>(&args, backend::cpu_device()),
    }
}

fn predict_on<B: Backend>(args: &PredictArgs, device: B::Device) -> Result<()> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("Cannot read image '{}'", args.image.display()))?;

    let ensemble = Ensemble::<B>::load(&args.models_dir, device)?;
    let mut use_case = PredictUseCase::new(ensemble);
    if let Some(threshold) = args.indeterminate_below {
        use_case = use_case.with_indeterminate_below(threshold)?;
    }

    let response = use_case.predict(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_submit(args: SubmitArgs) -> Result<()> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("Cannot read image '{}'", args.image.display()))?;

    let use_case =
        SubmitUseCase::new(SampleStore::new(&args.dataset_dir)).with_min_resolution(args.min_resolution);

    match use_case.submit(&bytes, &args.label) {
        Ok(receipt) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Err(err @ PipelineError::Validation(_)) => {
            println!("{}", serde_json::to_string_pretty(&SubmitReceipt::rejected(&err))?);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict` and `submit`
// and all their configurable flags.
//
// `train` flags are all optional: values come from --config (if
// given), then from these flags, then from TrainConfig::default().
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::{submit_use_case::DEFAULT_MIN_RESOLUTION, train_use_case::TrainConfig};
use crate::infra::config::load_train_config;
use crate::ml::{
    backend::BackendKind,
    model::{BackboneKind, FreezePolicy},
};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a k-fold ensemble on the labelled image directories
    Train(TrainArgs),

    /// Classify one image with the trained ensemble (JSON on stdout)
    Predict(PredictArgs),

    /// Add a labelled image to the dataset (JSON receipt on stdout)
    Submit(SubmitArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with any subset of the training configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset root with match_ready/ and not_match_ready/ directories
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    /// Where the ensemble checkpoints are written
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Number of cross-validation folds (= models in the ensemble)
    #[arg(long)]
    pub k_folds: Option<usize>,

    /// Maximum number of full passes through each training subset
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Epochs without validation improvement before a fold stops
    #[arg(long)]
    pub patience: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Initial AdamW learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum)]
    pub backbone: Option<BackboneKind>,

    /// Which parameters are fine-tuned
    #[arg(long, value_enum)]
    pub freeze: Option<FreezePolicy>,

    /// torchvision ResNet-18 weights (.pth) for the backbone
    #[arg(long)]
    pub pretrained: Option<PathBuf>,

    /// Train folds on parallel threads (not bit-for-bit reproducible)
    #[arg(long)]
    pub parallel_folds: bool,

    /// Compute backend; defaults to $CRICKET_BACKEND, then wgpu
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

impl TrainArgs {
    /// Merge config file, flags and defaults into one TrainConfig.
    pub fn to_config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_train_config(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = &self.dataset_dir {
            cfg.dataset_dir = v.clone();
        }
        if let Some(v) = &self.models_dir {
            cfg.models_dir = v.clone();
        }
        if let Some(v) = self.k_folds {
            cfg.k_folds = v;
        }
        if let Some(v) = self.epochs {
            cfg.max_epochs = v;
        }
        if let Some(v) = self.patience {
            cfg.patience = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.backbone {
            cfg.backbone = v;
        }
        if let Some(v) = self.freeze {
            cfg.freeze = v;
        }
        if let Some(v) = &self.pretrained {
            cfg.pretrained_weights = Some(v.clone());
        }
        if self.parallel_folds {
            cfg.parallel_folds = true;
        }
        Ok(cfg)
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    pub image: PathBuf,

    /// Directory holding ensemble.json and the fold checkpoints
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Report "indeterminate" below this confidence (0.5 to 1.0)
    #[arg(long)]
    pub indeterminate_below: Option<f64>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

/// All arguments for the `submit` command
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Image file to add
    pub image: PathBuf,

    /// match_ready or not_match_ready
    #[arg(long)]
    pub label: String,

    #[arg(long, default_value = "dataset")]
    pub dataset_dir: PathBuf,

    /// Smallest accepted width and height in pixels
    #[arg(long, default_value_t = DEFAULT_MIN_RESOLUTION)]
    pub min_resolution: u32,
}

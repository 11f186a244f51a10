// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates a full cross-validation training run:
//
//   Step 1: Validate the configuration
//   Step 2: Snapshot the Sample Store            (Layer 4 - data)
//   Step 3: Stratified k-fold split              (Layer 4 - data)
//   Step 4: Open a fresh staging directory       (Layer 6 - infra)
//   Step 5: Train one model per fold             (Layer 5 - ml)
//   Step 6: Cross-validation summary + manifest  (Layer 6 - infra)
//   Step 7: Promote staging over the old ensemble
//
// Any error before step 7 leaves the previous ensemble in place.
//
// Reference: Burn Book §5 (Training)

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::data::{
    augment::AugmentConfig, loader::SampleLoader, splitter::stratified_k_fold,
};
use crate::domain::{error::PipelineError, sample::Sample, traits::SampleSource};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta, EnsembleManifest},
    metrics::CrossValidationSummary,
};
use crate::ml::{
    backend::{self, BackendKind, CpuTrainBackend, GpuTrainBackend},
    model::{BackboneKind, FreezePolicy},
    trainer::{train_fold, TrainingRunContext},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Snapshotted into every
// checkpoint so inference can rebuild the same architecture.
// Missing fields in a JSON config file take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub dataset_dir: PathBuf,
    pub models_dir: PathBuf,
    pub k_folds: usize,
    pub max_epochs: usize,

    /// Epochs without improvement before a fold stops
    pub patience: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,

    /// Plateau scheduler: multiply the LR by this factor ...
    pub plateau_factor: f64,
    /// ... after this many epochs without improvement
    pub plateau_patience: usize,

    pub seed: u64,

    /// Network input side length
    pub image_size: u32,
    pub augment: AugmentConfig,
    pub backbone: BackboneKind,
    pub dropout: f64,
    pub freeze: FreezePolicy,

    /// torchvision ResNet-18 `.pth` file; random init when absent
    pub pretrained_weights: Option<PathBuf>,

    /// Train folds on parallel threads. Results are only bit-for-bit
    /// reproducible when folds run sequentially.
    pub parallel_folds: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            models_dir: PathBuf::from("models"),
            k_folds: 3,
            max_epochs: 15,
            patience: 5,
            batch_size: 16,
            learning_rate: 1e-3,
            weight_decay: 0.01,
            plateau_factor: 0.5,
            plateau_patience: 3,
            seed: 42,
            image_size: 224,
            augment: AugmentConfig::default(),
            backbone: BackboneKind::Resnet18,
            dropout: 0.5,
            freeze: FreezePolicy::LastBlock,
            pretrained_weights: None,
            parallel_folds: false,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.k_folds < 2 {
            return invalid(format!("k_folds must be at least 2, got {}", self.k_folds));
        }
        if self.max_epochs == 0 {
            return invalid("max_epochs must be at least 1".to_string());
        }
        if self.patience == 0 {
            return invalid("patience must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.weight_decay < 0.0 {
            return invalid("weight_decay must not be negative".to_string());
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor <= 1.0) {
            return invalid("plateau_factor must be in (0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)".to_string());
        }
        if self.image_size < 32 {
            return invalid(format!("image_size must be at least 32, got {}", self.image_size));
        }
        if self.augment.resize_to < self.image_size {
            return invalid(format!(
                "augment.resize_to ({}) must not be smaller than image_size ({})",
                self.augment.resize_to, self.image_size
            ));
        }
        if self.pretrained_weights.is_some() && self.backbone != BackboneKind::Resnet18 {
            return invalid("pretrained weights are only available for the resnet18 backbone".to_string());
        }
        Ok(())
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRunReport {
    pub run_id: String,
    pub models_dir: PathBuf,
    pub folds: Vec<CheckpointMeta>,
    pub summary: Option<CrossValidationSummary>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    backend: BackendKind,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig, backend: BackendKind) -> Self {
        Self { config, backend }
    }

    /// Execute the full training pipeline end to end on the chosen backend.
    pub fn execute(&self) -> Result<TrainingRunReport> {
        match self.backend {
            BackendKind::Wgpu => {
                let device = backend::gpu_device();
                tracing::info!("Using WGPU device: {:?}", device);
                self.execute_on::<GpuTrainBackend>(device)
            }
            BackendKind::Cpu => {
                tracing::info!("Using CPU (ndarray) backend");
                self.execute_on::<CpuTrainBackend>(backend::cpu_device())
            }
        }
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingRunReport> {
        let cfg = &self.config;

        // ── Step 1: Validate configuration ────────────────────────────────────
        cfg.validate()?;
        let run_id = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        tracing::info!("Training run {} ({}-fold, seed {})", run_id, cfg.k_folds, cfg.seed);

        // ── Step 2: Snapshot the Sample Store ─────────────────────────────────
        let loader = SampleLoader::new(&cfg.dataset_dir);
        let samples: Vec<Sample> = loader
            .snapshot()
            .with_context(|| format!("Cannot read dataset '{}'", cfg.dataset_dir.display()))?;
        tracing::info!("Snapshot holds {} samples", samples.len());

        // ── Step 3: Stratified folds ──────────────────────────────────────────
        let folds = stratified_k_fold(&samples, cfg.k_folds, cfg.seed)?;

        // ── Step 4: Staging directory ─────────────────────────────────────────
        std::fs::create_dir_all(&cfg.models_dir)
            .map_err(|e| PipelineError::storage(&cfg.models_dir, e))?;
        let staging = CheckpointManager::staging(&cfg.models_dir)?;

        // ── Step 5: One model per fold ────────────────────────────────────────
        let ctx = TrainingRunContext::<B>::new(cfg, run_id.clone(), device, &staging);
        let metas: Vec<CheckpointMeta> = if cfg.parallel_folds {
            std::thread::scope(|s| {
                let handles: Vec<_> = folds
                    .iter()
                    .map(|split| {
                        let ctx = &ctx;
                        s.spawn(move || train_fold(ctx, split))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Err(anyhow::anyhow!("fold training thread panicked")))
                    })
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            folds
                .iter()
                .map(|split| train_fold(&ctx, split))
                .collect::<Result<Vec<_>>>()?
        };

        // ── Step 6: Summary + manifest ────────────────────────────────────────
        let summary = CrossValidationSummary::from_accuracies(
            metas.iter().map(|m| m.best_validation_accuracy).collect(),
        );
        if let Some(summary) = &summary {
            summary.log();
        }
        let warnings = metas.iter().filter(|m| m.convergence_warning.is_some()).count();
        if warnings > 0 {
            tracing::warn!("{} of {} folds raised a convergence warning", warnings, metas.len());
        }

        staging.save_manifest(&EnsembleManifest {
            run_id: run_id.clone(),
            created_at: Utc::now().to_rfc3339(),
            folds: metas.iter().map(|m| m.fold_index).collect(),
            config: cfg.clone(),
            summary: summary.clone(),
        })?;

        // ── Step 7: Promote ───────────────────────────────────────────────────
        drop(ctx);
        staging.promote_into(&cfg.models_dir)?;
        tracing::info!("Training complete!");

        Ok(TrainingRunReport {
            run_id,
            models_dir: cfg.models_dir.clone(),
            folds: metas,
            summary,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{label::Label, traits::ImageClassifier};
    use crate::ml::{backend::CpuBackend, ensemble::Ensemble, seed_lock};
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes(colour: Rgb<u8>) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(48, 48, colour)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn write_dataset(root: &std::path::Path, per_class: usize) {
        for label in Label::ALL {
            let dir = root.join(label.dir_name());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = (i * 9 % 50) as u8;
                let colour = match label {
                    Label::MatchReady => Rgb([190 + shade, 40, 40]),
                    Label::NotMatchReady => Rgb([40, 40, 190 + shade]),
                };
                std::fs::write(dir.join(format!("{i}.png")), png_bytes(colour)).unwrap();
            }
        }
    }

    fn tiny_config(root: &TempDir) -> TrainConfig {
        TrainConfig {
            dataset_dir: root.path().join("dataset"),
            models_dir: root.path().join("models"),
            max_epochs: 2,
            batch_size: 4,
            image_size: 32,
            augment: AugmentConfig {
                resize_to: 40,
                ..AugmentConfig::default()
            },
            backbone: BackboneKind::Tiny,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_reference_recipe() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.k_folds, 3);
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.max_epochs, 15);
        assert_eq!(cfg.patience, 5);
        assert_eq!(cfg.image_size, 224);
        assert_eq!(cfg.augment.resize_to, 256);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            TrainConfig { k_folds: 1, ..TrainConfig::default() },
            TrainConfig { batch_size: 0, ..TrainConfig::default() },
            TrainConfig { learning_rate: 0.0, ..TrainConfig::default() },
            TrainConfig { image_size: 512, ..TrainConfig::default() },
            TrainConfig { dropout: 1.0, ..TrainConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"k_folds": 5, "seed": 7}"#).unwrap();
        assert_eq!(cfg.k_folds, 5);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.batch_size, 16);
    }

    #[test]
    fn test_too_few_samples_leaves_previous_ensemble() {
        let root = TempDir::new().unwrap();
        let cfg = tiny_config(&root);
        write_dataset(&cfg.dataset_dir, 2);
        std::fs::create_dir_all(&cfg.models_dir).unwrap();
        std::fs::write(cfg.models_dir.join("ensemble.json"), "previous").unwrap();

        let err = TrainUseCase::new(cfg.clone(), BackendKind::Cpu)
            .execute()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InsufficientData { .. })
        ));
        let manifest = std::fs::read_to_string(cfg.models_dir.join("ensemble.json")).unwrap();
        assert_eq!(manifest, "previous");
    }

    #[test]
    fn test_train_then_predict_end_to_end() {
        let _lock = seed_lock();
        let root = TempDir::new().unwrap();
        let cfg = tiny_config(&root);
        write_dataset(&cfg.dataset_dir, 6);

        let report = TrainUseCase::new(cfg.clone(), BackendKind::Cpu)
            .execute()
            .unwrap();
        assert_eq!(report.folds.len(), 3);
        assert!(report.summary.is_some());
        for fold in 0..3 {
            assert!(cfg.models_dir.join(format!("fold_{fold}.mpk")).is_file());
            assert!(cfg.models_dir.join(format!("fold_{fold}_metrics.csv")).is_file());
        }
        assert!(!cfg.models_dir.join(".staging").exists());

        let ensemble = Ensemble::<CpuBackend>::load(&cfg.models_dir, Default::default()).unwrap();
        assert_eq!(ensemble.fold_indices(), vec![0, 1, 2]);

        let result = ensemble.classify(&png_bytes(Rgb([210, 40, 40]))).unwrap();
        assert_eq!(result.per_model_probabilities.len(), 3);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn test_parallel_folds_produce_a_loadable_ensemble() {
        let _lock = seed_lock();
        let root = TempDir::new().unwrap();
        let cfg = TrainConfig {
            parallel_folds: true,
            ..tiny_config(&root)
        };
        write_dataset(&cfg.dataset_dir, 6);

        let report = TrainUseCase::new(cfg.clone(), BackendKind::Cpu)
            .execute()
            .unwrap();
        let mut folds: Vec<usize> = report.folds.iter().map(|m| m.fold_index).collect();
        folds.sort();
        assert_eq!(folds, vec![0, 1, 2]);

        let ensemble = Ensemble::<CpuBackend>::load(&cfg.models_dir, Default::default()).unwrap();
        assert_eq!(ensemble.fold_indices(), vec![0, 1, 2]);
    }
}

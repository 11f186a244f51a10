// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores fold checkpoints using Burn's CompactRecorder.
//
// What gets saved per fold:
//   1. fold_<i>.mpk          - best-epoch weights of that fold
//                              (half precision MessagePack)
//   2. fold_<i>.json         - CheckpointMeta (accuracy, epoch at
//                              best, trajectory, config snapshot)
//   3. fold_<i>_metrics.csv  - written by MetricsLogger
// and once per run:
//   4. ensemble.json         - EnsembleManifest (fold list, config,
//                              cross-validation summary)
//
// Why save the config with every checkpoint?
//   Inference has to rebuild the exact architecture (backbone,
//   input size) before the weights can be loaded into it.
//
// Staging and promotion:
//   A training run writes everything into <models_dir>/.staging/.
//   Only after every fold has succeeded is the staging directory
//   promoted: the previous ensemble's files are moved aside into
//   <models_dir>/.previous/, the staged files renamed into place,
//   and only then is the old copy deleted. If any rename fails the
//   previous ensemble is moved back, so a failed run or a failed
//   promotion leaves the previous ensemble untouched.
//
// Writes go through one Mutex so concurrently trained folds never
// interleave on disk.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::domain::error::{ConvergenceWarning, PipelineError, PipelineResult};
use crate::infra::metrics::CrossValidationSummary;
use crate::ml::model::{BallClassifier, BallClassifierRecord};

pub const MANIFEST_FILE: &str = "ensemble.json";
pub const STAGING_DIR: &str = ".staging";
pub const PREVIOUS_DIR: &str = ".previous";

// CompactRecorder is a NamedMpkFileRecorder: plain MessagePack, no gzip
const WEIGHTS_EXTENSION: &str = "mpk";

/// Everything known about one fold's emitted checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub fold_index: usize,
    pub best_validation_accuracy: f64,

    /// 1-based epoch whose weights were kept
    pub epoch_at_best: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,

    /// Validation accuracy after every epoch that ran
    pub validation_trajectory: Vec<f64>,

    pub convergence_warning: Option<ConvergenceWarning>,
    pub run_id: String,
    pub config: TrainConfig,
}

/// Written last by a training run; its presence marks a complete ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleManifest {
    pub run_id: String,
    pub created_at: String,
    pub folds: Vec<usize>,
    pub config: TrainConfig,
    pub summary: Option<CrossValidationSummary>,
}

/// Manages the checkpoint files of one directory.
pub struct CheckpointManager {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CheckpointManager {
    /// Open `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::storage(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing ensemble directory for reading only.
    pub fn open(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(PipelineError::model_load(&dir, "models directory does not exist"));
        }
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Fresh, empty staging directory below `models_dir`.
    /// Leftovers from an interrupted run are discarded.
    pub fn staging(models_dir: &Path) -> PipelineResult<Self> {
        let dir = models_dir.join(STAGING_DIR);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| PipelineError::storage(&dir, e))?;
        }
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("fold_{fold}.{WEIGHTS_EXTENSION}"))
    }

    pub fn meta_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("fold_{fold}.json"))
    }

    pub fn metrics_path(&self, fold: usize) -> PathBuf {
        self.dir.join(format!("fold_{fold}_metrics.csv"))
    }

    /// Save one fold's weights and metadata.
    pub fn save_fold<B: Backend>(
        &self,
        model: &BallClassifier<B>,
        meta: &CheckpointMeta,
    ) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let fold = meta.fold_index;

        // CompactRecorder appends the extension itself
        let stem = self.dir.join(format!("fold_{fold}"));
        CompactRecorder::new()
            .record(model.clone().into_record(), stem)
            .map_err(|e| {
                PipelineError::storage(
                    self.weights_path(fold),
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                )
            })?;

        write_json(&self.meta_path(fold), meta)?;
        tracing::debug!("Saved checkpoint for fold {}", fold);
        Ok(())
    }

    pub fn load_meta(&self, fold: usize) -> PipelineResult<CheckpointMeta> {
        let path = self.meta_path(fold);
        let meta: CheckpointMeta = read_json(&path)?;
        if meta.fold_index != fold {
            return Err(PipelineError::model_load(
                &path,
                format!("metadata belongs to fold {}", meta.fold_index),
            ));
        }
        Ok(meta)
    }

    /// Load one fold's weights into `model`, which must have the
    /// architecture recorded in the fold's metadata.
    pub fn load_fold<B: Backend>(
        &self,
        fold: usize,
        model: BallClassifier<B>,
        device: &B::Device,
    ) -> PipelineResult<BallClassifier<B>> {
        let path = self.weights_path(fold);
        if !path.is_file() {
            return Err(PipelineError::model_load(&path, "checkpoint file is missing"));
        }

        let record: BallClassifierRecord<B> = CompactRecorder::new()
            .load(self.dir.join(format!("fold_{fold}")), device)
            .map_err(|e| PipelineError::model_load(&path, e))?;

        Ok(model.load_record(record))
    }

    pub fn save_manifest(&self, manifest: &EnsembleManifest) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        write_json(&self.dir.join(MANIFEST_FILE), manifest)
    }

    pub fn load_manifest(&self) -> PipelineResult<EnsembleManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PipelineError::model_load(
                &path,
                "no ensemble manifest; has a training run completed?",
            ));
        }
        read_json(&path)
    }

    /// Replace the ensemble in `target` with everything staged here.
    pub fn promote_into(self, target: &Path) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        let previous_dir = target.join(PREVIOUS_DIR);
        if previous_dir.exists() {
            fs::remove_dir_all(&previous_dir).map_err(|e| PipelineError::storage(&previous_dir, e))?;
        }
        fs::create_dir_all(&previous_dir).map_err(|e| PipelineError::storage(&previous_dir, e))?;

        let previous = list_files(target)?
            .into_iter()
            .filter(|p| is_ensemble_file(p))
            .collect::<Vec<_>>();
        if let Err(e) = move_files(&previous, &previous_dir) {
            restore_previous(&previous_dir, target);
            return Err(e);
        }

        let mut staged = list_files(&self.dir)?;
        // manifest last: an ensemble without one is never loaded
        staged.sort_by_key(|p| p.file_name().map_or(false, |n| n == MANIFEST_FILE));

        if let Err(e) = move_files(&staged, target) {
            tracing::warn!("Promotion failed, restoring the previous ensemble: {}", e);
            for partial in list_files(target).unwrap_or_default() {
                if is_ensemble_file(&partial) {
                    let _ = fs::remove_file(&partial);
                }
            }
            restore_previous(&previous_dir, target);
            return Err(e);
        }

        fs::remove_dir_all(&previous_dir).map_err(|e| PipelineError::storage(&previous_dir, e))?;
        fs::remove_dir_all(&self.dir).map_err(|e| PipelineError::storage(&self.dir, e))?;
        tracing::info!("Promoted new ensemble into '{}'", target.display());
        Ok(())
    }
}

fn is_ensemble_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n == MANIFEST_FILE || n.starts_with("fold_"))
}

/// Regular files directly inside `dir`.
fn list_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PipelineError::storage(dir, e))? {
        let path = entry.map_err(|e| PipelineError::storage(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn move_files(files: &[PathBuf], into: &Path) -> PipelineResult<()> {
    for from in files {
        if let Some(name) = from.file_name() {
            let to = into.join(name);
            fs::rename(from, &to).map_err(|e| PipelineError::storage(&to, e))?;
        }
    }
    Ok(())
}

fn restore_previous(previous_dir: &Path, target: &Path) {
    let files = list_files(previous_dir).unwrap_or_default();
    match move_files(&files, target) {
        Ok(()) => {
            let _ = fs::remove_dir_all(previous_dir);
        }
        Err(e) => tracing::error!(
            "Could not restore previous ensemble from '{}': {}",
            previous_dir.display(),
            e
        ),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        PipelineError::storage(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    fs::write(path, json).map_err(|e| PipelineError::storage(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    let json = fs::read_to_string(path).map_err(|e| PipelineError::model_load(path, e))?;
    serde_json::from_str(&json).map_err(|e| PipelineError::model_load(path, e))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        model::{BackboneKind, BallClassifierConfig},
        seed_lock,
    };
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn meta(fold: usize) -> CheckpointMeta {
        CheckpointMeta {
            fold_index: fold,
            best_validation_accuracy: 0.75,
            epoch_at_best: 2,
            epochs_run: 4,
            stopped_early: false,
            validation_trajectory: vec![0.5, 0.75, 0.75, 0.7],
            convergence_warning: None,
            run_id: "test".to_string(),
            config: TrainConfig::default(),
        }
    }

    #[test]
    fn test_fold_round_trip() {
        let _lock = seed_lock();
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let model = BallClassifierConfig::new(BackboneKind::Tiny).init::<TestBackend>(&device);

        manager.save_fold(&model, &meta(1)).unwrap();
        assert!(manager.weights_path(1).is_file());

        let mut on_disk: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, vec!["fold_1.json", "fold_1.mpk"]);
        assert_eq!(manager.load_meta(1).unwrap(), meta(1));

        let fresh = BallClassifierConfig::new(BackboneKind::Tiny).init::<TestBackend>(&device);
        assert!(manager.load_fold(1, fresh, &device).is_ok());
    }

    #[test]
    fn test_missing_fold_is_model_load_error() {
        let _lock = seed_lock();
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let model = BallClassifierConfig::new(BackboneKind::Tiny).init::<TestBackend>(&device);

        let err = manager.load_fold(0, model, &device).unwrap_err();
        assert!(matches!(err, PipelineError::ModelLoad { .. }));
        assert!(matches!(manager.load_manifest(), Err(PipelineError::ModelLoad { .. })));
    }

    #[test]
    fn test_promote_replaces_previous_ensemble() {
        let models = TempDir::new().unwrap();
        fs::write(models.path().join("fold_7.json"), "{}").unwrap();
        fs::write(models.path().join("notes.txt"), "keep me").unwrap();

        let staging = CheckpointManager::staging(models.path()).unwrap();
        fs::write(staging.meta_path(0), "{}").unwrap();
        fs::write(staging.dir().join(MANIFEST_FILE), "{}").unwrap();
        staging.promote_into(models.path()).unwrap();

        assert!(!models.path().join("fold_7.json").exists());
        assert!(models.path().join("fold_0.json").exists());
        assert!(models.path().join(MANIFEST_FILE).exists());
        assert!(models.path().join("notes.txt").exists());
        assert!(!models.path().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_failed_promotion_restores_previous_ensemble() {
        let models = TempDir::new().unwrap();
        fs::write(models.path().join("fold_7.json"), "old fold").unwrap();
        fs::write(models.path().join(MANIFEST_FILE), "old manifest").unwrap();
        // A directory in the way makes renaming the staged fold_0.json fail
        fs::create_dir(models.path().join("fold_0.json")).unwrap();

        let staging = CheckpointManager::staging(models.path()).unwrap();
        fs::write(staging.meta_path(0), "{}").unwrap();
        fs::write(staging.dir().join(MANIFEST_FILE), "new manifest").unwrap();

        let err = staging.promote_into(models.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }));

        let manifest = fs::read_to_string(models.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, "old manifest");
        assert_eq!(fs::read_to_string(models.path().join("fold_7.json")).unwrap(), "old fold");
        assert!(!models.path().join(PREVIOUS_DIR).exists());
    }
}

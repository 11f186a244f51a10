// ============================================================
// Layer 5 - Ensemble Aggregator
// ============================================================
// Loads every fold checkpoint of a training run and combines
// their softmax outputs into one decision:
//
//   image bytes
//     │  decode + resize + normalise (same as validation)
//     ▼
//   [1, 3, S, S] ──► fold 0 ─┐
//                ──► fold 1 ─┼──► uniform average ──► label, confidence
//                ──► fold 2 ─┘
//
// Rules:
//   - every checkpoint named by the manifest must load, or the
//     ensemble is not built at all (no partial ensembles)
//   - the averaged class with the higher probability wins; an
//     exact tie resolves to not_match_ready and is flagged
//     low-confidence
//   - per-class sums are taken over values sorted ascending, so
//     the result does not depend on the order of the models
//
// The ensemble is immutable once built. `predict_image` takes
// &self, so one Ensemble can serve concurrent requests.

use std::{path::Path, thread};

use burn::{prelude::*, tensor::TensorData};
use image::RgbImage;

use crate::data::preprocessor::Preprocessor;
use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
    prediction::{ClassProbabilities, ModelVote, PredictionResult},
    traits::ImageClassifier,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{BallClassifier, BallClassifierConfig};

/// One ensemble member and the fold it was trained on.
#[derive(Debug, Clone)]
pub struct Voter<B: Backend> {
    pub fold_index: usize,
    pub model: BallClassifier<B>,
}

#[derive(Debug)]
pub struct Ensemble<B: Backend> {
    voters: Vec<Voter<B>>,
    preprocessor: Preprocessor,
    device: B::Device,
}

impl<B: Backend> Ensemble<B> {
    /// Load the ensemble described by `<models_dir>/ensemble.json`.
    pub fn load(models_dir: &Path, device: B::Device) -> PipelineResult<Self> {
        let manager = CheckpointManager::open(models_dir)?;
        let manifest = manager.load_manifest()?;
        if manifest.folds.is_empty() {
            return Err(PipelineError::model_load(models_dir, "manifest lists no folds"));
        }

        let arch = &manifest.config;
        let model_cfg = BallClassifierConfig::new(arch.backbone).with_dropout(arch.dropout);

        let mut voters = Vec::with_capacity(manifest.folds.len());
        for &fold in &manifest.folds {
            let meta = manager.load_meta(fold)?;
            if meta.config.backbone != arch.backbone || meta.config.image_size != arch.image_size {
                return Err(PipelineError::model_load(
                    manager.meta_path(fold),
                    "architecture differs from the rest of the ensemble",
                ));
            }
            let model = manager.load_fold(fold, model_cfg.init::<B>(&device), &device)?;
            voters.push(Voter {
                fold_index: fold,
                model,
            });
        }

        tracing::info!(
            "Loaded {}-model ensemble (run {}) from '{}'",
            voters.len(),
            manifest.run_id,
            models_dir.display()
        );
        Self::from_voters(voters, Preprocessor::new(arch.image_size), device)
    }

    pub fn from_voters(
        voters: Vec<Voter<B>>,
        preprocessor: Preprocessor,
        device: B::Device,
    ) -> PipelineResult<Self> {
        if voters.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "an ensemble needs at least one model".to_string(),
            ));
        }
        Ok(Self {
            voters,
            preprocessor,
            device,
        })
    }

    pub fn fold_indices(&self) -> Vec<usize> {
        self.voters.iter().map(|v| v.fold_index).collect()
    }

    /// Run every member on one decoded image and aggregate.
    /// The forward passes run in parallel, one scoped thread each.
    pub fn predict_image(&self, image: &RgbImage) -> PipelineResult<PredictionResult> {
        let size = self.preprocessor.image_size as usize;
        let pixels = self.preprocessor.prepare(image);
        let pixels = &pixels;

        let votes: Vec<PipelineResult<ModelVote>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .voters
                .iter()
                .map(|voter| {
                    let voter = voter.clone();
                    let device = self.device.clone();
                    s.spawn(move || -> PipelineResult<ModelVote> {
                        let input = Tensor::<B, 4>::from_data(
                            TensorData::new(pixels.clone(), [1, 3, size, size]),
                            &device,
                        );
                        let row: Vec<f32> = voter
                            .model
                            .forward_probabilities(input)
                            .into_data()
                            .to_vec()
                            .map_err(|e| PipelineError::Inference(format!("{e:?}")))?;
                        let probabilities = ClassProbabilities::from_softmax(&row).ok_or_else(|| {
                            PipelineError::Inference(format!(
                                "fold {} produced an invalid distribution {row:?}",
                                voter.fold_index
                            ))
                        })?;
                        Ok(ModelVote::new(voter.fold_index, probabilities))
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(PipelineError::Inference("model thread panicked".to_string()))
                    })
                })
                .collect()
        });

        let votes = votes.into_iter().collect::<PipelineResult<Vec<_>>>()?;
        for vote in &votes {
            tracing::debug!(
                "Fold {}: match_ready={:.4} not_match_ready={:.4}",
                vote.fold_index,
                vote.probabilities.match_ready,
                vote.probabilities.not_match_ready
            );
        }
        aggregate(votes)
    }
}

impl<B: Backend> ImageClassifier for Ensemble<B> {
    fn classify(&self, image_bytes: &[u8]) -> PipelineResult<PredictionResult> {
        let image = Preprocessor::decode(image_bytes)?.to_rgb8();
        self.predict_image(&image)
    }
}

/// Uniform average of the votes. Votes stay in the result in the
/// order given.
pub fn aggregate(votes: Vec<ModelVote>) -> PipelineResult<PredictionResult> {
    if votes.is_empty() {
        return Err(PipelineError::Inference("no model votes to aggregate".to_string()));
    }

    let n = votes.len() as f64;
    let mean_of = |label: Label| {
        let mut column: Vec<f64> = votes.iter().map(|v| v.probabilities.get(label)).collect();
        column.sort_by(f64::total_cmp);
        column.iter().sum::<f64>() / n
    };

    let probabilities = ClassProbabilities::new(mean_of(Label::MatchReady), mean_of(Label::NotMatchReady))
        .normalised()
        .ok_or_else(|| PipelineError::Inference("averaged probabilities are degenerate".to_string()))?;

    let label = probabilities.argmax();
    let low_confidence = probabilities.is_tie();
    if low_confidence {
        tracing::warn!("Ensemble tie; reporting '{}' with low confidence", label);
    }

    Ok(PredictionResult {
        label,
        confidence: probabilities.get(label).clamp(0.0, 1.0),
        probabilities,
        per_model_probabilities: votes,
        low_confidence,
    })
}

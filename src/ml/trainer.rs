// ============================================================
// Layer 5 - Fold Trainer
// ============================================================
// Trains one classifier for one fold: "all folds except i" for
// training, fold i for validation.
//
// Per epoch:
//   1. shuffle the training indices (seeded by fold + epoch)
//   2. augment each image with its own (seed, fold, epoch, index)
//      RNG and batch it by hand
//   3. forward → cross-entropy → backward → AdamW step
//   4. evaluate the unaugmented validation subset through a Burn
//      DataLoader on the inner backend
//   5. early stopping keeps a copy of the best-epoch weights;
//      the plateau scheduler picks the next learning rate
//
// Key Burn insights:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend with
//     dropout disabled, so the validation batcher uses it too
//   - argmax(1) returns [batch, 1] so we flatten before .equal()
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::seq::SliceRandom;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    augment::{transform_rng, Augmenter},
    batcher::ImageBatcher,
    dataset::{ImageDataset, ImageItem},
    preprocessor::Preprocessor,
    splitter::FoldSplit,
};
use crate::domain::{
    error::{ConvergenceWarning, PipelineError},
    label::Label,
    sample::Sample,
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    early_stopping::{best_epoch, EarlyStopping, EpochVerdict, PlateauScheduler},
    model::{load_pretrained_backbone, BallClassifier, BallClassifierConfig},
};

/// Everything one training invocation shares across its folds.
/// Read-only, so folds may borrow it from several threads.
pub struct TrainingRunContext<'a, B: AutodiffBackend> {
    pub config: &'a TrainConfig,
    pub run_id: String,
    pub device: B::Device,
    pub checkpoints: &'a CheckpointManager,
    pub preprocessor: Preprocessor,
    pub augmenter: Augmenter,
}

impl<'a, B: AutodiffBackend> TrainingRunContext<'a, B> {
    pub fn new(
        config: &'a TrainConfig,
        run_id: impl Into<String>,
        device: B::Device,
        checkpoints: &'a CheckpointManager,
    ) -> Self {
        let preprocessor = Preprocessor::new(config.image_size);
        Self {
            config,
            run_id: run_id.into(),
            device,
            checkpoints,
            preprocessor,
            augmenter: Augmenter::new(config.augment, preprocessor),
        }
    }
}

/// Index passed to `transform_rng` for the per-epoch shuffle, so it
/// never collides with a sample's own stream.
const SHUFFLE_STREAM: usize = usize::MAX;

/// Train one fold and write its best checkpoint. Returns the metadata
/// that was written.
pub fn train_fold<B: AutodiffBackend>(
    ctx: &TrainingRunContext<'_, B>,
    split: &FoldSplit<&Sample>,
) -> Result<CheckpointMeta> {
    let cfg = ctx.config;
    let fold = split.fold_index;
    check_subsets(split)?;

    tracing::info!(
        "Fold {}: {} training / {} validation samples",
        fold,
        split.train.len(),
        split.validation.len()
    );

    // ── Build model ───────────────────────────────────────────────────────────
    B::seed(cfg.seed.wrapping_add(fold as u64));
    let model_cfg = BallClassifierConfig::new(cfg.backbone).with_dropout(cfg.dropout);
    let mut model: BallClassifier<B> = model_cfg.init(&ctx.device);
    if let Some(weights) = &cfg.pretrained_weights {
        model = load_pretrained_backbone(model, weights, &ctx.device)?;
    }
    let mut model = model.freeze(cfg.freeze);

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();

    // ── Validation loader (InnerBackend, no autodiff overhead) ────────────────
    let val_dataset = ImageDataset::preprocessed(&split.validation, &ctx.preprocessor);
    let baseline = val_dataset.majority_fraction();
    let image_size = cfg.image_size as usize;
    let val_loader = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(
        ctx.device.clone(),
        image_size,
    ))
    .batch_size(cfg.batch_size)
    .build(val_dataset);

    let train_batcher = ImageBatcher::<B>::new(ctx.device.clone(), image_size);
    let metrics = MetricsLogger::create(ctx.checkpoints.metrics_path(fold))?;

    let mut early = EarlyStopping::new(cfg.patience);
    let mut scheduler = PlateauScheduler::new(cfg.learning_rate, cfg.plateau_factor, cfg.plateau_patience);
    let mut best_model: Option<BallClassifier<B::InnerBackend>> = None;
    let mut trajectory = Vec::with_capacity(cfg.max_epochs);
    let mut stopped_early = false;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.max_epochs {
        let lr = scheduler.lr();

        // ── Training phase ────────────────────────────────────────────────────
        let mut order: Vec<usize> = (0..split.train.len()).collect();
        order.shuffle(&mut transform_rng(cfg.seed, fold, epoch, SHUFFLE_STREAM));

        let mut train_loss_sum = 0.0f64;
        let mut train_batches = 0usize;
        let mut train_correct = 0usize;

        for chunk in order.chunks(cfg.batch_size) {
            let items: Vec<ImageItem> = chunk
                .iter()
                .map(|&i| {
                    let sample = split.train[i];
                    let mut rng = transform_rng(cfg.seed, fold, epoch, i);
                    ImageItem::new(
                        ctx.augmenter.augment_tensor(&sample.image, &mut rng),
                        sample.label.class_index(),
                    )
                })
                .collect();
            let batch = train_batcher.batch(items);

            let (loss, logits) = model.forward_loss(batch.images, batch.targets.clone());
            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches += 1;
            train_correct += count_correct(logits, batch.targets);

            // Backward pass + AdamW update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }

        let train_loss = mean_or_nan(train_loss_sum, train_batches);
        let train_acc = train_correct as f64 / split.train.len() as f64;

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let ce = burn::nn::loss::CrossEntropyLossConfig::new().init(&ctx.device);

        let mut val_loss_sum = 0.0f64;
        let mut val_batches = 0usize;
        let mut val_correct = 0usize;
        let mut val_total = 0usize;

        for batch in val_loader.iter() {
            let logits = model_valid.forward(batch.images);
            val_loss_sum += ce
                .forward(logits.clone(), batch.targets.clone())
                .into_scalar()
                .elem::<f64>();
            val_batches += 1;
            val_total += batch.targets.dims()[0];
            val_correct += count_correct(logits, batch.targets);
        }

        let val_loss = mean_or_nan(val_loss_sum, val_batches);
        let val_acc = if val_total > 0 {
            val_correct as f64 / val_total as f64
        } else {
            0.0
        };
        trajectory.push(val_acc);

        metrics.log(&EpochMetrics {
            epoch,
            train_loss,
            train_acc,
            val_loss,
            val_acc,
            learning_rate: lr,
        })?;

        tracing::info!(
            "Fold {} epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}% | lr={:.2e}",
            fold,
            epoch,
            cfg.max_epochs,
            train_loss,
            train_acc * 100.0,
            val_loss,
            val_acc * 100.0,
            lr,
        );

        let verdict = early.observe(epoch, val_acc);
        if verdict == EpochVerdict::Improved {
            best_model = Some(model_valid);
        }
        scheduler.step(val_acc);

        if verdict == EpochVerdict::Stop {
            tracing::info!(
                "Fold {}: early stopping after epoch {} (no improvement for {} epochs)",
                fold,
                epoch,
                cfg.patience
            );
            stopped_early = true;
            break;
        }
    }

    // The snapshot was taken on the tracker's verdicts; the reported
    // best comes from the whole trajectory, and the two must agree.
    let best = best_epoch(&trajectory);
    debug_assert_eq!(best, early.best());
    let (best, best_model) = match (best, best_model) {
        (Some(best), Some(model)) => (best, model),
        _ => {
            return Err(PipelineError::TrainingData {
                fold,
                reason: "no epoch completed".to_string(),
            }
            .into())
        }
    };

    let convergence_warning = (best.accuracy <= baseline).then(|| ConvergenceWarning {
        fold,
        best_accuracy: best.accuracy,
        baseline_accuracy: baseline,
    });
    if let Some(warning) = &convergence_warning {
        tracing::warn!("Convergence warning: {}", warning);
    }

    let meta = CheckpointMeta {
        fold_index: fold,
        best_validation_accuracy: best.accuracy,
        epoch_at_best: best.epoch,
        epochs_run: trajectory.len(),
        stopped_early,
        validation_trajectory: trajectory,
        convergence_warning,
        run_id: ctx.run_id.clone(),
        config: cfg.clone(),
    };
    ctx.checkpoints
        .save_fold(&best_model, &meta)
        .with_context(|| format!("Failed to save checkpoint for fold {fold}"))?;

    tracing::info!(
        "Fold {} done: best val_acc={:.1}% at epoch {}",
        fold,
        best.accuracy * 100.0,
        best.epoch
    );
    Ok(meta)
}

/// Both subsets of the fold must contain both classes.
fn check_subsets(split: &FoldSplit<&Sample>) -> Result<(), PipelineError> {
    for label in Label::ALL {
        if split.train_count(label) == 0 {
            return Err(PipelineError::TrainingData {
                fold: split.fold_index,
                reason: format!("training subset has no '{label}' samples"),
            });
        }
        if split.validation_count(label) == 0 {
            return Err(PipelineError::TrainingData {
                fold: split.fold_index,
                reason: format!("validation subset has no '{label}' samples"),
            });
        }
    }
    Ok(())
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

fn mean_or_nan(sum: f64, n: usize) -> f64 {
    if n > 0 {
        sum / n as f64
    } else {
        f64::NAN
    }
}

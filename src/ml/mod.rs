// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn-specific training and inference
// code. The data layer only implements Burn's Dataset/Batcher
// traits; everything that builds, trains or runs a network
// lives here.
//
// What's in this layer:
//
//   model.rs          - ResNet backbone + dropout + 2-class head
//                       • torchvision-compatible field names
//                       • freeze policies for partial fine-tuning
//                       • pretrained weight import
//
//   backend.rs        - WGPU (GPU) / NdArray (CPU) selection
//
//   early_stopping.rs - patience-based stopping with first-best
//                       tie-break, and the plateau LR scheduler
//
//   trainer.rs        - one fold: augmented mini-batches,
//                       AdamW, validation, best checkpoint
//
//   ensemble.rs       - loads every fold checkpoint and averages
//                       their softmax outputs
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            He et al. (2016) Deep Residual Learning

/// ResNet classifier architecture
pub mod model;

/// Backend aliases and device selection
pub mod backend;

/// Early stopping and learning-rate schedule
pub mod early_stopping;

/// Per-fold training loop with validation and checkpointing
pub mod trainer;

/// Inference engine - averages the fold models
pub mod ensemble;

/// The NdArray backend keeps one global RNG. Tests that initialise
/// models take this lock so seeded runs stay reproducible.
#[cfg(test)]
pub(crate) fn seed_lock() -> std::sync::MutexGuard<'static, ()> {
    static SEED_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    SEED_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

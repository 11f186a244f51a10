// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Handles the filesystem side of the pipeline:
//
//   checkpoint.rs   - Saving and loading fold checkpoints
//                     Uses Burn's CompactRecorder for weights
//                     and JSON for metadata and the ensemble
//                     manifest. Stages a run, then promotes it.
//
//   metrics.rs      - Training metrics logging
//                     Per-fold, per-epoch CSV plus the
//                     cross-validation summary.
//
//   sample_store.rs - Sample Store writes
//                     Collision-free, never-overwriting appends
//                     of newly collected images.
//
//   config.rs       - TrainConfig from a JSON file
//
// Reference: Rust Book §9 (Error Handling)
//            Burn Book §5 (Checkpointing)

/// Fold checkpoint saving, loading and promotion
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Append-only writer for the labelled image directories
pub mod sample_store;

/// JSON training configuration
pub mod config;

// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between image files on disk and tensor batches:
//
//   Sample Store directories
//       │
//       ▼
//   SampleLoader      → decodes images, labels from directory
//       │
//       ▼
//   stratified_k_fold → k (train, validation) splits
//       │
//       ├──────────────────────────┐
//       ▼                          ▼
//   Augmenter (train only)     Preprocessor (validation, inference)
//       │                          │
//       └────────────┬─────────────┘
//                    ▼
//   ImageBatcher      → [N, 3, S, S] tensors for the model
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads a labelled snapshot of the Sample Store
pub mod loader;

/// Deterministic decode / resize / normalise
pub mod preprocessor;

/// Seeded stochastic training transforms
pub mod augment;

/// Stratified k-fold cross-validation splits
pub mod splitter;

/// Implements Burn's Dataset trait for prepared images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// operation each:
//
//   train_use_case   - run_training: cross-validated ensemble
//   predict_use_case - predict: image bytes → verdict + confidence
//   submit_use_case  - submit_training_sample: grow the dataset
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// The inference workflow
pub mod predict_use_case;

// The training-data collection workflow
pub mod submit_use_case;

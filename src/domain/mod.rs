// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Pure Rust types that describe the problem: a labelled ball
// photo, the two classes, a prediction, and the ways things
// can go wrong.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits
//
// The `image` crate's RgbImage is allowed because it is the
// decoded pixel buffer itself, not a framework abstraction.

// The two target classes and their on-disk names
pub mod label;

// A decoded, labelled image from the Sample Store
pub mod sample;

// Per-model and aggregated class probabilities
pub mod prediction;

// Error taxonomy shared by every layer
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;

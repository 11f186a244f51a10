// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The application layer talks to its collaborators only through
// these traits, so a use case never knows whether samples come
// from a directory tree or predictions from a burn ensemble.
//
//   SampleSource    - SampleLoader reads a snapshot of the store
//   SampleSink      - SampleStore appends a new sample
//   ImageClassifier - Ensemble turns image bytes into a prediction
//   Labeled         - anything the fold splitter can stratify

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::{
    error::PipelineResult, label::Label, prediction::PredictionResult, sample::Sample,
};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can produce a point-in-time snapshot of labelled samples.
pub trait SampleSource {
    /// Samples appended after the call returns are not observed.
    fn snapshot(&self) -> Result<Vec<Sample>>;
}

// ─── SampleSink ───────────────────────────────────────────────────────────────
/// Append-only destination for newly collected samples.
pub trait SampleSink {
    /// Store already-validated image bytes under `label`, returning the new path.
    /// Never overwrites an existing file.
    fn append(&self, label: Label, bytes: &[u8], extension: &str) -> PipelineResult<PathBuf>;
}

// ─── ImageClassifier ──────────────────────────────────────────────────────────
pub trait ImageClassifier {
    fn classify(&self, image_bytes: &[u8]) -> PipelineResult<PredictionResult>;
}

// ─── Labeled ──────────────────────────────────────────────────────────────────
pub trait Labeled {
    fn label(&self) -> Label;
}

impl Labeled for Sample {
    fn label(&self) -> Label {
        self.label
    }
}

impl<T: Labeled + ?Sized> Labeled for &T {
    fn label(&self) -> Label {
        (**self).label()
    }
}

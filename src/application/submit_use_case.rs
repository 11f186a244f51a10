// ============================================================
// Layer 2 - SubmitUseCase (Training-Data Collector)
// ============================================================
// Validates a field-collected (image, label) pair and appends
// it to the Sample Store:
//
//   1. label string must name one of the two classes
//   2. bytes must be a format the Sample Store holds, and decode
//   3. both sides must reach the minimum resolution
//   4. SampleSink::append writes it under the label's directory
//
// Steps 1-3 run before anything touches the disk, so a rejected
// submission leaves the store exactly as it was. Submitting
// never starts a training run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::{loader::is_supported_format, preprocessor::Preprocessor};
use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
    traits::SampleSink,
};

pub const DEFAULT_MIN_RESOLUTION: u32 = 64;

/// Acknowledgement returned to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub accepted: bool,
    pub label: Option<Label>,
    pub stored_at: Option<PathBuf>,
    pub reason: Option<String>,
}

impl SubmitReceipt {
    pub fn accepted(label: Label, stored_at: PathBuf) -> Self {
        Self {
            accepted: true,
            label: Some(label),
            stored_at: Some(stored_at),
            reason: None,
        }
    }

    pub fn rejected(err: &PipelineError) -> Self {
        Self {
            accepted: false,
            label: None,
            stored_at: None,
            reason: Some(err.to_string()),
        }
    }
}

pub struct SubmitUseCase<S: SampleSink> {
    sink: S,
    min_resolution: u32,
}

impl<S: SampleSink> SubmitUseCase<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            min_resolution: DEFAULT_MIN_RESOLUTION,
        }
    }

    pub fn with_min_resolution(mut self, min_resolution: u32) -> Self {
        self.min_resolution = min_resolution;
        self
    }

    pub fn submit(&self, image_bytes: &[u8], label: &str) -> PipelineResult<SubmitReceipt> {
        let label: Label = label.parse()?;

        let format = image::guess_format(image_bytes)
            .map_err(|e| PipelineError::Validation(format!("unrecognised image format: {e}")))?;
        if !is_supported_format(format) {
            return Err(PipelineError::Validation(format!(
                "{format:?} images are not accepted for training"
            )));
        }
        let image = Preprocessor::decode(image_bytes).map_err(|e| match e {
            PipelineError::InvalidImage(reason) => PipelineError::Validation(reason),
            other => other,
        })?;

        let (w, h) = (image.width(), image.height());
        if w < self.min_resolution || h < self.min_resolution {
            return Err(PipelineError::Validation(format!(
                "image is {w}x{h}, minimum is {min}x{min}",
                min = self.min_resolution
            )));
        }

        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let stored_at = self.sink.append(label, image_bytes, extension)?;
        tracing::info!("Accepted '{}' sample ({}x{}) → '{}'", label, w, h, stored_at.display());
        Ok(SubmitReceipt::accepted(label, stored_at))
    }
}

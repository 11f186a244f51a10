// ============================================================
// Layer 3 - Error Taxonomy
// ============================================================
// Every failure the pipeline can report to its collaborators.
// The relay maps client errors (bad image, rejected sample) to
// 4xx responses and everything else to 5xx.
//
// ConvergenceWarning is not an error. It travels with the
// fold's checkpoint metadata and is logged; training continues.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::label::Label;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "insufficient data: class '{label}' has {found} samples, \
         at least {required} are needed for {required}-fold splitting"
    )]
    InsufficientData {
        label: Label,
        found: usize,
        required: usize,
    },

    #[error("training data error in fold {fold}: {reason}")]
    TrainingData { fold: usize, reason: String },

    #[error("cannot load model checkpoint '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("sample rejected: {0}")]
    Validation(String),

    #[error("storage failure at '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// True when the caller sent bad input rather than the pipeline failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidImage(_) | PipelineError::Validation(_)
        )
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PipelineError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Raised when a fold's best validation accuracy never beat the
/// majority-class baseline of its validation subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    pub fold: usize,
    pub best_accuracy: f64,
    pub baseline_accuracy: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fold {} never beat the majority-class baseline (best {:.4} <= baseline {:.4})",
            self.fold, self.best_accuracy, self.baseline_accuracy
        )
    }
}

// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records per-epoch training metrics to one CSV file per fold,
// plus the cross-validation summary computed once every fold
// has finished.
//
// Output file: <models_dir>/fold_<i>_metrics.csv
//
// Example CSV output:
//   epoch,train_loss,train_acc,val_loss,val_acc,learning_rate
//   1,0.693100,0.512500,0.688400,0.550000,0.00100000
//   2,0.641800,0.625000,0.652100,0.650000,0.00100000
//   ...
//
// How to read the metrics:
//   - val_acc should climb and then flatten; early stopping ends
//     the fold once it has been flat for `patience` epochs
//   - train_acc far above val_acc → overfitting, raise dropout or
//     freeze more of the backbone
//   - learning_rate halves each time the plateau scheduler fires
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const CSV_HEADER: &str = "epoch,train_loss,train_acc,val_loss,val_acc,learning_rate";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average cross-entropy loss over the augmented training batches
    pub train_loss: f64,

    /// Fraction of augmented training images classified correctly
    pub train_acc: f64,

    /// Average cross-entropy loss on the unaugmented validation subset
    pub val_loss: f64,

    /// Fraction of validation images classified correctly, range [0.0, 1.0]
    pub val_acc: f64,

    /// Learning rate used during this epoch
    pub learning_rate: f64,
}

/// Appends epoch metrics for one fold to its CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create (or truncate) the CSV and write the header row.
    /// A fold is trained once per run, so its log always starts fresh.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = path.into();
        if let Some(dir) = csv_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create metrics CSV '{}'", csv_path.display()))?;
        writeln!(f, "{CSV_HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.8}",
            m.epoch, m.train_loss, m.train_acc, m.val_loss, m.val_acc, m.learning_rate,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_acc={:.4}",
            m.epoch,
            m.train_loss,
            m.val_acc,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Cross-validation summary ─────────────────────────────────────────────────

/// Spread of best validation accuracy across folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub fold_accuracies: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub best: f64,
    pub worst: f64,
}

impl CrossValidationSummary {
    pub fn from_accuracies(fold_accuracies: Vec<f64>) -> Option<Self> {
        if fold_accuracies.is_empty() {
            return None;
        }
        let n = fold_accuracies.len() as f64;
        let mean = fold_accuracies.iter().sum::<f64>() / n;
        let variance = fold_accuracies
            .iter()
            .map(|a| (a - mean).powi(2))
            .sum::<f64>()
            / n;
        let best = fold_accuracies.iter().cloned().fold(f64::MIN, f64::max);
        let worst = fold_accuracies.iter().cloned().fold(f64::MAX, f64::min);

        Some(Self {
            fold_accuracies,
            mean,
            std_dev: variance.sqrt(),
            best,
            worst,
        })
    }

    pub fn log(&self) {
        for (fold, acc) in self.fold_accuracies.iter().enumerate() {
            tracing::info!("  fold {}: {:.2}%", fold, acc * 100.0);
        }
        tracing::info!(
            "Cross-validation accuracy: {:.2}% ± {:.2}% (best {:.2}%, worst {:.2}%)",
            self.mean * 100.0,
            self.std_dev * 100.0,
            self.best * 100.0,
            self.worst * 100.0,
        );
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logger_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let logger = MetricsLogger::create(dir.path().join("fold_0_metrics.csv")).unwrap();
        logger
            .log(&EpochMetrics {
                epoch: 1,
                train_loss: 0.7,
                train_acc: 0.5,
                val_loss: 0.69,
                val_acc: 0.55,
                learning_rate: 1e-3,
            })
            .unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("1,0.700000,0.500000,"));
    }

    #[test]
    fn test_summary_statistics() {
        let summary = CrossValidationSummary::from_accuracies(vec![0.8, 0.9, 1.0]).unwrap();
        assert!((summary.mean - 0.9).abs() < 1e-12);
        assert!((summary.std_dev - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(summary.best, 1.0);
        assert_eq!(summary.worst, 0.8);
        assert!(CrossValidationSummary::from_accuracies(Vec::new()).is_none());
    }
}

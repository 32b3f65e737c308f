// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch, and
// keeps the same rows in memory as the run's History.
//
// Metrics recorded per epoch:
//   - epoch:    the epoch number (1, 2, 3, ...)
//   - loss:     mean training loss over the epoch's steps
//   - acc:      training accuracy over the epoch's samples
//   - val_loss: mean validation loss (empty without validation)
//   - val_acc:  validation accuracy (empty without validation)
//   - lr:       learning rate used during the epoch
//
// Output file: checkpoints/metrics.csv
//
// Example CSV output:
//   epoch,loss,acc,val_loss,val_acc,lr
//   1,1.873200,0.312000,1.702100,0.381000,1.000000e-3
//   2,1.512900,0.447000,1.498800,0.462000,1.000000e-3
//   ...
//
// How to read the metrics:
//   - If val_loss increases while loss decreases → overfitting
//   - A drop in lr marks a schedule milestone or a plateau
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Mean loss over the training steps of the epoch
    pub loss: f64,

    /// Fraction of training samples classified correctly
    pub acc: f64,

    /// Mean validation loss; None when no validation data was given
    pub val_loss: Option<f64>,

    /// Fraction of validation samples classified correctly
    pub val_acc: Option<f64>,

    /// Learning rate in effect during the epoch
    pub lr: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:    usize,
        loss:     f64,
        acc:      f64,
        val_loss: Option<f64>,
        val_acc:  Option<f64>,
        lr:       f64,
    ) -> Self {
        Self { epoch, loss, acc, val_loss, val_acc, lr }
    }

    /// One CSV row; missing validation values are left empty.
    fn csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map(|v| format!("{v:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{},{},{:.6e}",
            self.epoch,
            self.loss,
            self.acc,
            opt(self.val_loss),
            opt(self.val_acc),
            self.lr,
        )
    }

    /// Keras-style summary line for the console.
    pub fn summary(&self) -> String {
        let mut line = format!("loss: {:.4} - acc: {:.4}", self.loss, self.acc);
        if let (Some(vl), Some(va)) = (self.val_loss, self.val_acc) {
            line.push_str(&format!(" - val_loss: {vl:.4} - val_acc: {va:.4}"));
        }
        line.push_str(&format!(" - lr: {:.2e}", self.lr));
        line
    }
}

/// All epochs of one training run, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, m: EpochMetrics) {
        self.epochs.push(m);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Per-epoch values of one metric, like Keras' `history.history[key]`.
    pub fn series(&self, key: &str) -> Option<Vec<f64>> {
        let pick: fn(&EpochMetrics) -> Option<f64> = match key {
            "loss"     => |m: &EpochMetrics| Some(m.loss),
            "acc"      => |m: &EpochMetrics| Some(m.acc),
            "val_loss" => |m: &EpochMetrics| m.val_loss,
            "val_acc"  => |m: &EpochMetrics| m.val_acc,
            "lr"       => |m: &EpochMetrics| Some(m.lr),
            _ => return None,
        };
        self.epochs.iter().map(pick).collect()
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh `metrics.csv` in `dir`, replacing any previous run's log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "epoch,loss,acc,val_loss,val_acc,lr")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!("Logged epoch {} metrics: {}", m.epoch, m.summary());
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 2.5, 0.25, Some(2.0), Some(0.5), 1e-3)).unwrap();
        logger.log(&EpochMetrics::new(2, 2.0, 0.5, None, None, 1e-4)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,loss,acc,val_loss,val_acc,lr");
        assert!(lines[1].starts_with("1,2.500000,0.250000,2.000000,0.500000,"));
        // no validation → empty columns
        assert!(lines[2].starts_with("2,2.000000,0.500000,,,"));
    }

    #[test]
    fn test_new_logger_truncates_old_log() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path())
            .unwrap()
            .log(&EpochMetrics::new(1, 1.0, 0.0, None, None, 0.1))
            .unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(logger.csv_path()).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_history_series() {
        let mut h = History::default();
        h.push(EpochMetrics::new(1, 1.0, 0.5, Some(0.9), Some(0.6), 0.01));
        h.push(EpochMetrics::new(2, 0.8, 0.7, Some(0.7), Some(0.8), 0.01));

        assert_eq!(h.series("val_acc"), Some(vec![0.6, 0.8]));
        assert_eq!(h.series("loss"), Some(vec![1.0, 0.8]));
        assert_eq!(h.series("f1"), None);
        assert_eq!(h.last().unwrap().epoch, 2);
    }

    #[test]
    fn test_summary_without_validation() {
        let m = EpochMetrics::new(3, 0.5, 0.75, None, None, 0.01);
        assert!(!m.summary().contains("val_loss"));
    }
}

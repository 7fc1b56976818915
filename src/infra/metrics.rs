// ============================================================
// Layer 6 — Epoch Reporters
// ============================================================
// Two sinks for per-epoch metrics, both passed to the trainer
// as EpochReporters:
//
//   TracingReporter — one INFO line per epoch, one per new best
//   MetricsLogger   — appends a row to <checkpoint_dir>/metrics.csv
//
// Example CSV output:
//   epoch,train_loss,train_acc,val_loss,val_acc,lr,loss_scale,skipped_steps,secs
//   1,2.104500,0.231000,1.989200,0.284000,0.00000100,65536,0,41.20
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{
    metrics::{CheckpointMeta, EpochMetrics},
    traits::EpochReporter,
};

const CSV_HEADER: &str =
    "epoch,train_loss,train_acc,val_loss,val_acc,lr,loss_scale,skipped_steps,secs";

// ─── TracingReporter ──────────────────────────────────────────────────────────
/// Logs every epoch through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    total_epochs: usize,
}

impl TracingReporter {
    pub fn new(total_epochs: usize) -> Self {
        Self { total_epochs }
    }
}

impl EpochReporter for TracingReporter {
    fn report(&mut self, m: &EpochMetrics) -> Result<()> {
        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.2}% | val_loss={:.4} | val_acc={:.2}% | lr={:.2e} | {:.1}s",
            m.epoch, self.total_epochs,
            m.train_loss, m.train_accuracy * 100.0,
            m.val_loss, m.val_accuracy * 100.0,
            m.lr, m.duration_secs,
        );
        if m.skipped_steps > 0 {
            tracing::warn!(
                "Epoch {}: {} steps skipped on non-finite gradients (loss scale now {})",
                m.epoch, m.skipped_steps, m.loss_scale,
            );
        }
        Ok(())
    }

    fn new_best(&mut self, meta: &CheckpointMeta) -> Result<()> {
        tracing::info!(
            "New best accuracy: {:.4}, model saved as 'best_model' (epoch {})",
            meta.val_accuracy, meta.epoch,
        );
        Ok(())
    }
}

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the logger, writing the header if the file is new so
    /// that repeated runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.8},{},{},{:.2}",
            m.epoch,
            m.train_loss,
            m.train_accuracy,
            m.val_loss,
            m.val_accuracy,
            m.lr,
            m.loss_scale,
            m.skipped_steps,
            m.duration_secs,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl EpochReporter for MetricsLogger {
    fn report(&mut self, metrics: &EpochMetrics) -> Result<()> {
        self.log(metrics)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss:     2.5,
            train_accuracy: 0.25,
            val_loss:       2.25,
            val_accuracy:   0.3,
            lr:             1e-3,
            loss_scale:     65536.0,
            skipped_steps:  0,
            duration_secs:  1.5,
        }
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.report(&metrics(1)).unwrap();
        logger.report(&metrics(2)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,2.500000,0.250000,2.250000,0.300000,"));
    }

    #[test]
    fn test_reopening_appends_without_second_header() {
        let tmp = tempfile::tempdir().unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&metrics(1)).unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&metrics(2)).unwrap();

        let text = fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        assert_eq!(text.matches("epoch,").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_reporters_fan_out() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sinks: Vec<Box<dyn EpochReporter>> = vec![
            Box::new(TracingReporter::new(1)),
            Box::new(MetricsLogger::new(tmp.path()).unwrap()),
        ];
        sinks.report(&metrics(1)).unwrap();
        let text = fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

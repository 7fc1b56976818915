// ============================================================
// Layer 3 — Training Metrics
// ============================================================
// Plain records that flow out of the training loop:
//
//   BatchStats         — loss / correct / total for one batch
//   StepReport         — BatchStats + whether the update landed
//   MetricsAccumulator — running sums over one phase of an epoch
//   EpochMetrics       — the summary line for one epoch
//   CheckpointMeta     — what is written next to a best checkpoint
//   TrainingHistory    — every EpochMetrics of a run
//
// Averages follow the usual convention: loss is the mean of
// per-batch losses, accuracy is correct / examples seen.

use serde::{Deserialize, Serialize};

/// Result of running one batch through the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Mean loss over the batch (unscaled)
    pub loss: f64,
    /// Number of arg-max predictions equal to the label
    pub correct: usize,
    /// Number of examples in the batch
    pub total: usize,
}

/// Outcome of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub stats: BatchStats,
    /// False when the step was skipped because gradients overflowed
    pub applied: bool,
}

/// Running totals for one phase (train or validation) of an epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsAccumulator {
    total_loss:  f64,
    correct:     usize,
    total:       usize,
    num_batches: usize,
    skipped:     usize,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, stats: BatchStats) {
        self.total_loss  += stats.loss;
        self.correct     += stats.correct;
        self.total       += stats.total;
        self.num_batches += 1;
    }

    /// Record a training step whose parameter update was skipped.
    pub fn mark_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn avg_loss(&self) -> f64 {
        if self.num_batches == 0 { return 0.0; }
        self.total_loss / self.num_batches as f64
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 { return 0.0; }
        self.correct as f64 / self.total as f64
    }

    pub fn num_batches(&self) -> usize { self.num_batches }

    pub fn total(&self) -> usize { self.total }

    pub fn skipped(&self) -> usize { self.skipped }
}

/// One row of metrics for a finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch:          usize,
    pub train_loss:     f64,
    pub train_accuracy: f64,
    pub val_loss:       f64,
    pub val_accuracy:   f64,
    /// Learning rate used for every step of this epoch
    pub lr:             f64,
    /// Loss scale at the end of the epoch
    pub loss_scale:     f64,
    /// Training steps skipped because of non-finite gradients
    pub skipped_steps:  usize,
    pub duration_secs:  f64,
}

impl EpochMetrics {
    /// Strictly better validation accuracy than `best_accuracy`.
    pub fn is_improvement(&self, best_accuracy: f64) -> bool {
        self.val_accuracy > best_accuracy
    }
}

/// Position of the learning-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Number of completed scheduler steps (0-based epoch index)
    pub step: usize,
    /// Learning rate at `step`
    pub lr:   f64,
}

/// Metadata stored with the best checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch:        usize,
    pub val_accuracy: f64,
    pub val_loss:     f64,
    pub schedule:     ScheduleState,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn best_val_accuracy(&self) -> f64 {
        self.epochs.iter().map(|m| m.val_accuracy).fold(0.0, f64::max)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn stats(loss: f64, correct: usize, total: usize) -> BatchStats {
        BatchStats { loss, correct, total }
    }

    #[test]
    fn test_average_loss_is_mean_of_batch_losses() {
        let mut acc = MetricsAccumulator::new();
        acc.update(stats(1.0, 3, 4));
        acc.update(stats(2.0, 1, 4));
        acc.update(stats(4.5, 0, 1));
        assert_eq!(acc.avg_loss(), (1.0 + 2.0 + 4.5) / 3.0);
        assert_eq!(acc.num_batches(), 3);
    }

    #[test]
    fn test_accuracy_counts_examples_not_batches() {
        let mut acc = MetricsAccumulator::new();
        acc.update(stats(0.0, 4, 4));
        acc.update(stats(0.0, 0, 1));
        // 4 correct out of 5 examples, not 1 of 2 batches
        assert_eq!(acc.accuracy(), 0.8);
        assert_eq!(acc.total(), 5);
    }

    #[test]
    fn test_empty_accumulator_reports_zero() {
        let acc = MetricsAccumulator::new();
        assert_eq!(acc.avg_loss(), 0.0);
        assert_eq!(acc.accuracy(), 0.0);
    }

    #[test]
    fn test_is_improvement_is_strict() {
        let m = EpochMetrics {
            epoch: 1, train_loss: 1.0, train_accuracy: 0.5,
            val_loss: 1.0, val_accuracy: 0.6,
            lr: 1e-3, loss_scale: 1.0, skipped_steps: 0, duration_secs: 0.0,
        };
        assert!(m.is_improvement(0.5));
        assert!(!m.is_improvement(0.6));
        assert!(!m.is_improvement(0.7));
    }
}

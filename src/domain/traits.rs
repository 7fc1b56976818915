// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams of the training loop:
//
//   StepExecutor  — runs one batch on the model (train or eval)
//                   and persists the best checkpoint. The Burn
//                   implementation lives in ml::executor; tests
//                   inject a fake that returns scripted numbers.
//   BatchSource   — anything that can hand out one epoch of
//                   batches (an EpochLoader, a Vec in tests).
//   EpochReporter — where per-epoch metrics go (log, CSV, ...).
//                   Passed to the trainer explicitly.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::metrics::{BatchStats, CheckpointMeta, EpochMetrics, StepReport};

// ─── StepExecutor ─────────────────────────────────────────────────────────────
/// Executes single training / validation steps against a model.
pub trait StepExecutor {
    /// Batch type consumed by training steps
    type TrainBatch;
    /// Batch type consumed by validation steps
    type ValidBatch;

    /// Forward, backward and (unless gradients overflowed) one
    /// optimizer update at learning rate `lr`.
    fn train_step(&mut self, batch: Self::TrainBatch, lr: f64) -> Result<StepReport>;

    /// Forward pass and loss only. Must not change parameters.
    fn valid_step(&mut self, batch: Self::ValidBatch) -> Result<BatchStats>;

    /// Current loss-scaling factor (1.0 when scaling is off).
    fn loss_scale(&self) -> f64;

    /// Persist model, optimizer and `meta` as the best checkpoint.
    fn save_checkpoint(&self, meta: &CheckpointMeta) -> Result<()>;
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// Produces the batches of one epoch each time `batches` is called.
pub trait BatchSource<T> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_>;
}

impl<T: Clone> BatchSource<T> for Vec<T> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter().cloned())
    }
}

// ─── EpochReporter ────────────────────────────────────────────────────────────
/// Receives the metrics of every finished epoch.
pub trait EpochReporter {
    fn report(&mut self, metrics: &EpochMetrics) -> Result<()>;

    /// Called after a new best checkpoint has been written.
    fn new_best(&mut self, _meta: &CheckpointMeta) -> Result<()> {
        Ok(())
    }
}

impl EpochReporter for Vec<Box<dyn EpochReporter>> {
    fn report(&mut self, metrics: &EpochMetrics) -> Result<()> {
        for reporter in self.iter_mut() {
            reporter.report(metrics)?;
        }
        Ok(())
    }

    fn new_best(&mut self, meta: &CheckpointMeta) -> Result<()> {
        for reporter in self.iter_mut() {
            reporter.new_best(meta)?;
        }
        Ok(())
    }
}

// ============================================================
// Layer 2 — Eval Use Case
// ============================================================
// Reloads a finished run from its checkpoint directory:
//
//   1. train_config.json → rebuild the exact architecture
//   2. best_model.mpk    → load the best weights
//   3. CIFAR test split  → one validation pass
//
// The data directory defaults to the one the run trained on.

use anyhow::Result;
use std::path::PathBuf;

use crate::data::cifar::{CifarLoader, Split};
use crate::domain::metrics::CheckpointMeta;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::runner::{run_evaluation, EvalSummary};

pub struct EvalUseCase {
    checkpoint_dir: PathBuf,
    data_dir:       Option<PathBuf>,
}

impl EvalUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), data_dir }
    }

    /// Evaluate the best checkpoint; returns its saved metadata and the
    /// fresh validation result.
    pub fn execute(&self) -> Result<(CheckpointMeta, EvalSummary)> {
        let ckpt = CheckpointManager::open(&self.checkpoint_dir);
        let cfg  = ckpt.load_config()?;
        let meta = ckpt.load_state()?;
        tracing::info!(
            "Best checkpoint: epoch {} (val_acc={:.4})",
            meta.epoch, meta.val_accuracy,
        );

        let dir   = self.data_dir.clone().unwrap_or_else(|| cfg.dir.clone());
        let items = CifarLoader::new(dir, cfg.dataset).load(Split::Test)?;

        let summary = run_evaluation(&cfg, cfg.dataset_info(), &ckpt, items)?;
        Ok((meta, summary))
    }
}

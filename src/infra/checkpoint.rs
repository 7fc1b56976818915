// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the best model using Burn's CompactRecorder
// (named MessagePack, half precision).
//
// Files written to the checkpoint directory:
//   best_model.mpk         — model parameters
//   best_optimizer.mpk     — optimizer state (moments, momentum)
//   best_state.json        — epoch, val accuracy/loss, schedule position
//   train_config.json      — the run's TrainConfig, written before
//                            the first epoch so `eval` can rebuild
//                            the exact architecture
//
// The three best_* files are replaced together, and only when
// validation accuracy strictly improves. `train --resume` reads
// all of them back.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::metrics::CheckpointMeta;
use crate::ml::model::VisionTransformer;

const MODEL_FILE:     &str = "best_model";
const OPTIMIZER_FILE: &str = "best_optimizer";
const STATE_FILE:     &str = "best_state.json";
const CONFIG_FILE:    &str = "train_config.json";

/// Manages the files of one checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the directory (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Manager for an existing directory (no directory creation).
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist model, optimizer record and metadata as the new best.
    pub fn save_best<B, O>(
        &self,
        model: &VisionTransformer<B>,
        optim: &O,
        meta:  &CheckpointMeta,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<VisionTransformer<B>, B>,
    {
        let model_path = self.dir.join(MODEL_FILE);
        <CompactRecorder as Recorder<B>>::record(
            &CompactRecorder::new(),
            model.clone().into_record(),
            model_path.clone(),
        )
        .with_context(|| format!("Failed to save model to '{}'", model_path.display()))?;

        let optim_path = self.dir.join(OPTIMIZER_FILE);
        <CompactRecorder as Recorder<B>>::record(
            &CompactRecorder::new(),
            optim.to_record(),
            optim_path.clone(),
        )
        .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        let state_path = self.dir.join(STATE_FILE);
        fs::write(&state_path, serde_json::to_string_pretty(meta)?)
            .with_context(|| format!("Cannot write '{}'", state_path.display()))?;

        tracing::debug!("Saved best checkpoint: epoch {}", meta.epoch);
        Ok(())
    }

    /// Load the best model parameters into `model`.
    ///
    /// `model` must have the architecture the checkpoint was saved
    /// with; rebuild it from `load_config` first.
    pub fn load_model<B: Backend>(
        &self,
        model:  VisionTransformer<B>,
        device: &B::Device,
    ) -> Result<VisionTransformer<B>> {
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has a training run saved one?",
                    path.display())
            })?;
        Ok(model.load_record(record))
    }

    /// Load the optimizer state saved with the best model into `optim`.
    pub fn load_optimizer<B, O>(&self, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<VisionTransformer<B>, B>,
    {
        let path = self.dir.join(OPTIMIZER_FILE);
        let record = <CompactRecorder as Recorder<B>>::load::<O::Record>(
            &CompactRecorder::new(),
            path.clone(),
            device,
        )
        .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    /// Where a resumed run picks up, checked against the saved config.
    /// None when the directory holds no best checkpoint yet.
    pub fn resume_point(&self, cfg: &TrainConfig) -> Result<Option<CheckpointMeta>> {
        if !self.has_best() {
            tracing::warn!(
                "No checkpoint in '{}' to resume from; starting from scratch",
                self.dir.display(),
            );
            return Ok(None);
        }

        let saved = self.load_config()?;
        if !saved.same_architecture(cfg) {
            bail!(
                "Checkpoint in '{}' was trained with a different model or optimizer",
                self.dir.display(),
            );
        }

        let meta = self.load_state()?;
        tracing::info!(
            "Resuming after epoch {} (best val_acc={:.4})",
            meta.epoch, meta.val_accuracy,
        );
        Ok(Some(meta))
    }

    /// Metadata of the best checkpoint.
    pub fn load_state(&self) -> Result<CheckpointMeta> {
        let path = self.dir.join(STATE_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed checkpoint state in '{}'", path.display()))
    }

    /// True once a best checkpoint has been written.
    pub fn has_best(&self) -> bool {
        self.dir.join(STATE_FILE).exists()
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'eval'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::ScheduleState;
    use crate::ml::model::VisionTransformerConfig;
    use crate::ml::optim::{adamw, LarsConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;

    type B = Autodiff<NdArray<f32>>;

    fn meta() -> CheckpointMeta {
        CheckpointMeta {
            epoch:        3,
            val_accuracy: 0.5,
            val_loss:     1.25,
            schedule:     ScheduleState { step: 3, lr: 1e-4 },
        }
    }

    #[test]
    fn test_config_round_trips_through_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(tmp.path().join("nested/ckpt")).unwrap();
        let cfg = TrainConfig::default();
        mgr.save_config(&cfg).unwrap();
        assert_eq!(mgr.load_config().unwrap(), cfg);
    }

    #[test]
    fn test_missing_files_are_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::open(tmp.path());
        assert!(!mgr.has_best());
        assert!(mgr.load_state().is_err());
        let err = mgr.load_config().unwrap_err().to_string();
        assert!(err.contains("train_config.json"));
    }

    #[test]
    fn test_save_best_writes_all_files_and_reloads() {
        let tmp    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();
        let config = VisionTransformerConfig::new(4, 8, 4, 3, 8, 1, 2);
        let model  = config.init::<B>(&device);
        let optim  = adamw::<B, VisionTransformer<B>>(0.1);

        mgr.save_best(&model, &optim, &meta()).unwrap();
        assert!(mgr.has_best());
        assert!(tmp.path().join("best_model.mpk").exists());
        assert!(tmp.path().join("best_optimizer.mpk").exists());
        assert_eq!(mgr.load_state().unwrap(), meta());

        let fresh    = config.init::<NdArray<f32>>(&device);
        let restored = mgr.load_model(fresh, &device).unwrap();
        // CompactRecorder stores half precision
        let saved  = model.head.weight.val().inner().into_data().to_vec::<f32>().unwrap();
        let loaded = restored.head.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(saved.len(), loaded.len());
        for (a, b) in saved.iter().zip(&loaded) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_optimizer_state_round_trips() {
        let tmp    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();
        let config = VisionTransformerConfig::new(4, 8, 4, 3, 8, 1, 2);
        let model  = config.init::<B>(&device);
        let mut optim = LarsConfig::new().init::<B, VisionTransformer<B>>();

        // one real step so every parameter has a velocity
        let images = Tensor::<B, 4>::ones([2, 3, 8, 8], &device);
        let grads  = model.forward(images).sum().backward();
        let grads  = GradientsParams::from_grads(grads, &model);
        let model  = optim.step(1e-3, model, grads);
        mgr.save_best(&model, &optim, &meta()).unwrap();

        let fresh    = LarsConfig::new().init::<B, VisionTransformer<B>>();
        assert!(fresh.to_record().is_empty());
        let restored = mgr.load_optimizer::<B, _>(fresh, &device).unwrap();
        assert!(!optim.to_record().is_empty());
        assert_eq!(restored.to_record().len(), optim.to_record().len());
    }

    #[test]
    fn test_resume_point_checks_the_saved_run() {
        let tmp    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(tmp.path()).unwrap();
        let cfg    = TrainConfig::default();
        assert_eq!(mgr.resume_point(&cfg).unwrap(), None);

        mgr.save_config(&cfg).unwrap();
        fs::write(tmp.path().join(STATE_FILE), serde_json::to_string(&meta()).unwrap()).unwrap();
        assert_eq!(mgr.resume_point(&cfg).unwrap(), Some(meta()));

        // training knobs may change, the architecture may not
        let longer = TrainConfig { epochs: 200, lr: 5e-4, ..cfg.clone() };
        assert!(mgr.resume_point(&longer).is_ok());
        let wider = TrainConfig { embed_dim: 384, ..cfg };
        assert!(mgr.resume_point(&wider).is_err());
    }
}

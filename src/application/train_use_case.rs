// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration   (before any I/O)
//   Step 2: Load the CIFAR train/test    (Layer 4 - data)
//   Step 3: Find the resume point and
//           save config for `eval`       (Layer 6 - infra)
//   Step 4: Build the epoch reporters    (Layer 6 - infra)
//   Step 5: Run the training loop        (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    cifar::{CifarLoader, Split},
    source::LoaderSettings,
};
use crate::domain::{
    image::{DatasetInfo, DatasetKind, ImageItem},
    metrics::TrainingHistory,
    traits::EpochReporter,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, TracingReporter},
};
use crate::ml::{
    model::VisionTransformerConfig,
    optim::OptimizerKind,
    runner::{run_training, BackendKind},
    scheduler::WarmupCosineSchedule,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved next to the
// checkpoint so `eval` can rebuild the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dir:             PathBuf,
    pub checkpoint_dir:  PathBuf,
    pub dataset:         DatasetKind,
    pub num_classes:     usize,
    pub image_size:      usize,
    pub patch_size:      usize,
    pub in_channels:     usize,
    pub embed_dim:       usize,
    pub num_layers:      usize,
    pub num_heads:       usize,
    pub vit_mlp_ratio:   f64,
    pub qkv_bias:        bool,
    pub drop_rate:       f64,
    pub drop_path_rate:  f64,
    pub weight_decay:    f64,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub warmup_epochs:   usize,
    pub warmup_lr:       f64,
    pub min_lr:          f64,
    pub gamma:           f64,
    pub optimizer:       OptimizerKind,
    pub label_smoothing: f64,
    pub clip_grad:       f64,
    pub amp:             bool,
    pub augment:         bool,
    pub seed:            u64,
    pub num_workers:     usize,
    pub backend:         BackendKind,
    #[serde(default)]
    pub resume:          bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dir:             PathBuf::from("./data"),
            checkpoint_dir:  PathBuf::from("."),
            dataset:         DatasetKind::Cifar10,
            num_classes:     10,
            image_size:      32,
            patch_size:      2,
            in_channels:     3,
            embed_dim:       192,
            num_layers:      9,
            num_heads:       12,
            vit_mlp_ratio:   2.0,
            qkv_bias:        true,
            drop_rate:       0.0,
            drop_path_rate:  0.1,
            weight_decay:    0.1,
            batch_size:      128,
            epochs:          100,
            lr:              1e-3,
            warmup_epochs:   10,
            warmup_lr:       1e-6,
            min_lr:          1e-6,
            gamma:           1.0,
            optimizer:       OptimizerKind::AdamW,
            label_smoothing: 0.1,
            clip_grad:       0.0,
            amp:             true,
            augment:         true,
            seed:            42,
            num_workers:     8,
            backend:         BackendKind::Wgpu,
            resume:          false,
        }
    }
}

impl TrainConfig {
    /// Cross-field checks that clap cannot express.
    pub fn validate(&self) -> Result<()> {
        let info = self.dataset.info();

        if self.num_classes != info.num_classes {
            bail!(
                "--num-classes {} does not match {} ({} classes)",
                self.num_classes, self.dataset.name(), info.num_classes,
            );
        }
        if self.image_size != info.image_size {
            bail!(
                "--image-size {} does not match {} images ({}x{})",
                self.image_size, self.dataset.name(), info.image_size, info.image_size,
            );
        }
        if self.in_channels != info.channels {
            bail!("--in-channels must be {} for {}", info.channels, self.dataset.name());
        }
        if self.patch_size == 0 || self.image_size % self.patch_size != 0 {
            bail!("--patch-size {} must divide --image-size {}", self.patch_size, self.image_size);
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            bail!("--embed-dim {} must be divisible by --num-heads {}", self.embed_dim, self.num_heads);
        }
        if self.num_layers == 0 || self.vit_mlp_ratio <= 0.0 {
            bail!("--num-layers and --vit-mlp-ratio must be positive");
        }
        if self.batch_size == 0 || self.epochs == 0 {
            bail!("--batch-size and --epochs must be positive");
        }
        for (name, rate) in [
            ("--drop-rate", self.drop_rate),
            ("--drop-path-rate", self.drop_path_rate),
            ("--label-smoothing", self.label_smoothing),
        ] {
            if !(0.0..1.0).contains(&rate) {
                bail!("{name} must be in [0, 1), got {rate}");
            }
        }
        if self.lr <= 0.0 || self.min_lr < 0.0 || self.warmup_lr < 0.0 {
            bail!("learning rates must be non-negative and --lr positive");
        }
        if self.min_lr > self.lr {
            bail!("--min-lr {} exceeds --lr {}", self.min_lr, self.lr);
        }
        if self.gamma <= 0.0 {
            bail!("--gamma must be positive, got {}", self.gamma);
        }
        if self.clip_grad < 0.0 {
            bail!("--clip-grad must be >= 0 (0 disables clipping), got {}", self.clip_grad);
        }
        Ok(())
    }

    /// True when a checkpoint of `other` can be loaded into a model
    /// and optimizer built from `self`.
    pub fn same_architecture(&self, other: &TrainConfig) -> bool {
        self.dataset == other.dataset
            && self.num_classes   == other.num_classes
            && self.image_size    == other.image_size
            && self.patch_size    == other.patch_size
            && self.in_channels   == other.in_channels
            && self.embed_dim     == other.embed_dim
            && self.num_layers    == other.num_layers
            && self.num_heads     == other.num_heads
            && self.vit_mlp_ratio == other.vit_mlp_ratio
            && self.qkv_bias      == other.qkv_bias
            && self.optimizer     == other.optimizer
    }

    pub fn dataset_info(&self) -> DatasetInfo {
        self.dataset.info()
    }

    pub fn model_config(&self) -> VisionTransformerConfig {
        VisionTransformerConfig::new(
            self.num_classes,
            self.image_size,
            self.patch_size,
            self.in_channels,
            self.embed_dim,
            self.num_layers,
            self.num_heads,
        )
        .with_mlp_ratio(self.vit_mlp_ratio)
        .with_qkv_bias(self.qkv_bias)
        .with_drop_rate(self.drop_rate)
        .with_drop_path_rate(self.drop_path_rate)
    }

    pub fn schedule(&self) -> WarmupCosineSchedule {
        WarmupCosineSchedule::new(
            self.warmup_lr,
            self.lr,
            self.min_lr,
            self.warmup_epochs,
            self.epochs,
            self.gamma,
        )
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            batch_size:  self.batch_size,
            num_workers: self.num_workers,
            seed:        self.seed,
            augment:     self.augment,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Load CIFAR from `dir` and train on it.
    pub fn execute(&self) -> Result<TrainingHistory> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Load the dataset ──────────────────────────────────────────
        tracing::info!("Loading {} from '{}'", cfg.dataset.name(), cfg.dir.display());
        let loader = CifarLoader::new(&cfg.dir, cfg.dataset);
        let train  = loader.load(Split::Train)?;
        let valid  = loader.load(Split::Test)?;

        self.train_on_items(cfg.dataset_info(), train, valid)
    }

    /// Train on already loaded images; `info` supplies the
    /// normalisation statistics.
    pub fn train_on_items(
        &self,
        info:  DatasetInfo,
        train: Vec<ImageItem>,
        valid: Vec<ImageItem>,
    ) -> Result<TrainingHistory> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 3: Resume point, then save config for eval ───────────────────
        let ckpt   = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let resume = if cfg.resume { ckpt.resume_point(cfg)? } else { None };
        ckpt.save_config(cfg)?;

        // ── Step 4: Reporters ─────────────────────────────────────────────────
        let reporters: Vec<Box<dyn EpochReporter>> = vec![
            Box::new(TracingReporter::new(cfg.epochs)),
            Box::new(MetricsLogger::new(&cfg.checkpoint_dir)?),
        ];

        // ── Step 5: Train ─────────────────────────────────────────────────────
        run_training(cfg, info, train, valid, reporters, resume)
    }
}

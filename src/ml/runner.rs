// ============================================================
// Layer 5 — Training / Evaluation Runner
// ============================================================
// Picks the Burn backend, builds model, loaders and optimizer
// from a TrainConfig and hands them to the Trainer.
//
//   wgpu    → Autodiff<Wgpu>     (GPU, default)
//   ndarray → Autodiff<NdArray>  (CPU)
//
// Training runs on the autodiff backend; validation and the
// `eval` path run on its inner backend.
//
// Reference: Burn Book §5 (Backends)

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    optim::Optimizer,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::ImageBatch,
    source::{train_loader, valid_loader},
};
use crate::domain::{
    image::{DatasetInfo, ImageItem},
    metrics::{CheckpointMeta, MetricsAccumulator, TrainingHistory},
    traits::{BatchSource, EpochReporter},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    executor::{validate_batch, BurnExecutor},
    loss::LabelSmoothingCrossEntropy,
    model::VisionTransformer,
    optim::{adamw, sgd, LarsConfig, OptimizerKind},
    scaler::LossScaler,
    trainer::Trainer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Wgpu,
    NdArray,
}

/// Loss and accuracy of one pass over a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    pub loss:     f64,
    pub accuracy: f64,
    pub examples: usize,
}

// ─── Training ─────────────────────────────────────────────────────────────────
pub fn run_training<R: EpochReporter>(
    cfg:         &TrainConfig,
    info:        DatasetInfo,
    train_items: Vec<ImageItem>,
    valid_items: Vec<ImageItem>,
    reporter:    R,
    resume:      Option<CheckpointMeta>,
) -> Result<TrainingHistory> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_on::<Autodiff<Wgpu>, R>(cfg, info, train_items, valid_items, reporter, resume, device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            train_on::<Autodiff<NdArray>, R>(cfg, info, train_items, valid_items, reporter, resume, device)
        }
    }
}

/// Full training run on backend `B`; with `resume` the model and
/// optimizer start from the best checkpoint.
pub fn train_on<B: AutodiffBackend, R: EpochReporter>(
    cfg:         &TrainConfig,
    info:        DatasetInfo,
    train_items: Vec<ImageItem>,
    valid_items: Vec<ImageItem>,
    reporter:    R,
    resume:      Option<CheckpointMeta>,
    device:      B::Device,
) -> Result<TrainingHistory> {
    B::seed(cfg.seed);
    let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;

    // ── Build model ───────────────────────────────────────────────────────────
    let model: VisionTransformer<B> = cfg.model_config().init(&device);
    let model = match resume {
        Some(_) => checkpoints.load_model(model, &device)?,
        None    => model,
    };
    tracing::info!(
        "Model ready: {} layers, embed_dim={}, {} parameters",
        cfg.num_layers, cfg.embed_dim, model.num_params(),
    );

    // ── Data loaders ──────────────────────────────────────────────────────────
    let loss     = LabelSmoothingCrossEntropy::new(cfg.num_classes, cfg.label_smoothing);
    let settings = cfg.loader_settings();
    tracing::info!(
        "Data: {} train / {} validation images, batch size {}",
        train_items.len(), valid_items.len(), settings.batch_size,
    );
    let train = train_loader::<B>(train_items, info, loss, settings, device.clone())?;
    let valid = valid_loader::<B::InnerBackend>(valid_items, info, loss, settings, device.clone())?;

    // ── Optimizer ─────────────────────────────────────────────────────────────
    let parts = RunParts {
        cfg,
        model,
        loss,
        scaler:      if cfg.amp { LossScaler::default() } else { LossScaler::disabled() },
        checkpoints,
        reporter,
        resume,
        device,
    };
    tracing::info!("Optimizer: {}", cfg.optimizer.name());

    match cfg.optimizer {
        OptimizerKind::AdamW => {
            parts.fit(adamw::<B, VisionTransformer<B>>(cfg.weight_decay), &train, &valid)
        }
        OptimizerKind::Sgd => {
            parts.fit(sgd::<B, VisionTransformer<B>>(cfg.weight_decay), &train, &valid)
        }
        OptimizerKind::Lars => {
            let lars = LarsConfig::new().with_weight_decay(cfg.weight_decay);
            parts.fit(lars.init::<B, VisionTransformer<B>>(), &train, &valid)
        }
    }
}

/// Everything a run needs except the optimizer, whose concrete
/// type depends on the configured kind.
struct RunParts<'a, B: AutodiffBackend, R> {
    cfg:         &'a TrainConfig,
    model:       VisionTransformer<B>,
    loss:        LabelSmoothingCrossEntropy,
    scaler:      LossScaler,
    checkpoints: CheckpointManager,
    reporter:    R,
    resume:      Option<CheckpointMeta>,
    device:      B::Device,
}

impl<B: AutodiffBackend, R: EpochReporter> RunParts<'_, B, R> {
    fn fit<O, T, V>(self, optim: O, train: &T, valid: &V) -> Result<TrainingHistory>
    where
        O: Optimizer<VisionTransformer<B>, B>,
        T: BatchSource<ImageBatch<B>> + ?Sized,
        V: BatchSource<ImageBatch<B::InnerBackend>> + ?Sized,
    {
        let optim = match self.resume {
            Some(_) => self.checkpoints.load_optimizer::<B, O>(optim, &self.device)?,
            None    => optim,
        };
        let executor = BurnExecutor::new(
            self.model,
            optim,
            self.loss,
            self.scaler,
            self.cfg.clip_grad,
            self.checkpoints,
        );
        let mut trainer = Trainer::new(executor, self.reporter, self.cfg.schedule(), self.cfg.epochs);
        if let Some(meta) = &self.resume {
            trainer.resume_from(meta);
        }
        let history = trainer.fit(train, valid)?;

        tracing::info!(
            "Training complete. Best validation accuracy: {:.4}",
            trainer.best_accuracy(),
        );
        Ok(history)
    }
}

// ─── Evaluation ───────────────────────────────────────────────────────────────
/// Reload the best checkpoint and run one validation pass.
pub fn run_evaluation(
    cfg:   &TrainConfig,
    info:  DatasetInfo,
    ckpt:  &CheckpointManager,
    items: Vec<ImageItem>,
) -> Result<EvalSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            evaluate_on::<Wgpu>(cfg, info, ckpt, items, device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            evaluate_on::<NdArray>(cfg, info, ckpt, items, device)
        }
    }
}

pub fn evaluate_on<B: Backend>(
    cfg:    &TrainConfig,
    info:   DatasetInfo,
    ckpt:   &CheckpointManager,
    items:  Vec<ImageItem>,
    device: B::Device,
) -> Result<EvalSummary> {
    let model = cfg.model_config().init::<B>(&device);
    let model = ckpt.load_model(model, &device)?;

    let loss   = LabelSmoothingCrossEntropy::new(cfg.num_classes, cfg.label_smoothing);
    let loader = valid_loader::<B>(items, info, loss, cfg.loader_settings(), device)?;

    let mut acc = MetricsAccumulator::new();
    for batch in loader.batches() {
        acc.update(validate_batch(&model, &loss, batch));
    }

    Ok(EvalSummary { loss: acc.avg_loss(), accuracy: acc.accuracy(), examples: acc.total() })
}

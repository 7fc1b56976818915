// ============================================================
// Layer 5 — Burn Step Executor
// ============================================================
// The only place that touches device tensors during training.
//
// Training step:
//   1. forward + label-smoothed loss
//   2. backward on loss * scale
//   3. unscale every gradient by 1 / scale
//   4. global L2 norm over all gradients (also the overflow check)
//   5. non-finite norm → skip the update, scaler backs off
//      otherwise        → clip to clip_grad (if > 0), optimizer step
//
// Validation runs on model.valid(), i.e. the inner backend:
// no autograd graph, dropout and drop-path are identities.
//
// Reference: Micikevicius et al. (2018) Mixed Precision Training
//            Pascanu et al. (2013) On the difficulty of training RNNs

use std::marker::PhantomData;

use anyhow::Result;
use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use crate::data::batcher::ImageBatch;
use crate::domain::{
    metrics::{BatchStats, CheckpointMeta, StepReport},
    traits::StepExecutor,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{loss::LabelSmoothingCrossEntropy, model::VisionTransformer, scaler::LossScaler};

// ─── Gradient visitors ────────────────────────────────────────────────────────
struct SquaredNorm<'a, B: AutodiffBackend> {
    grads:  &'a GradientsParams,
    sum_sq: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct ScaleGrads<'a, B: AutodiffBackend> {
    grads:  &'a mut GradientsParams,
    factor: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over the gradients of every parameter of `module`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, sum_sq: 0.0, _b: PhantomData };
    module.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Multiply every gradient of `module` by `factor`.
pub fn scale_gradients<B, M>(module: &M, grads: &mut GradientsParams, factor: f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = ScaleGrads::<B> { grads, factor, _b: PhantomData };
    module.visit(&mut visitor);
}

/// Factor that brings a gradient of norm `norm` down to `max_norm`.
/// None when clipping is off (`max_norm` 0) or not needed.
pub fn clip_coefficient(norm: f64, max_norm: f64) -> Option<f64> {
    if max_norm <= 0.0 || norm <= max_norm {
        return None;
    }
    Some(max_norm / (norm + 1e-6))
}

/// Clip gradients to a global norm of `max_norm`; returns the norm
/// before clipping.
pub fn clip_global_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, grads);
    if let Some(coef) = clip_coefficient(norm, max_norm) {
        scale_gradients::<B, M>(module, grads, coef);
    }
    norm
}

// ─── Batch evaluation ─────────────────────────────────────────────────────────
/// Number of rows whose arg-max logit equals the label.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1]; flatten before comparing with [batch]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted.equal(labels).int().sum().into_scalar().elem::<i64>() as usize
}

/// Forward pass and loss on one batch; no parameter changes.
pub fn validate_batch<B: Backend>(
    model: &VisionTransformer<B>,
    loss:  &LabelSmoothingCrossEntropy,
    batch: ImageBatch<B>,
) -> BatchStats {
    let total  = batch.labels.dims()[0];
    let logits = model.forward(batch.images);
    let value  = loss.forward(logits.clone(), batch.targets).into_scalar().elem::<f64>();
    let correct = count_correct(logits, batch.labels);
    BatchStats { loss: value, correct, total }
}

// ─── BurnExecutor ─────────────────────────────────────────────────────────────
pub struct BurnExecutor<B: AutodiffBackend, O> {
    model:       VisionTransformer<B>,
    optim:       O,
    loss:        LabelSmoothingCrossEntropy,
    scaler:      LossScaler,
    clip_grad:   f64,
    checkpoints: CheckpointManager,
    /// Inference copy of `model`, dropped after every update
    valid_model: Option<VisionTransformer<B::InnerBackend>>,
}

impl<B, O> BurnExecutor<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VisionTransformer<B>, B>,
{
    pub fn new(
        model:       VisionTransformer<B>,
        optim:       O,
        loss:        LabelSmoothingCrossEntropy,
        scaler:      LossScaler,
        clip_grad:   f64,
        checkpoints: CheckpointManager,
    ) -> Self {
        Self { model, optim, loss, scaler, clip_grad, checkpoints, valid_model: None }
    }
}

impl<B, O> StepExecutor for BurnExecutor<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VisionTransformer<B>, B>,
{
    type TrainBatch = ImageBatch<B>;
    type ValidBatch = ImageBatch<B::InnerBackend>;

    fn train_step(&mut self, batch: ImageBatch<B>, lr: f64) -> Result<StepReport> {
        let total  = batch.labels.dims()[0];
        let logits = self.model.forward(batch.images);
        let loss   = self.loss.forward(logits.clone(), batch.targets);

        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
        let correct = count_correct(logits, batch.labels);

        // ── Scaled backward, then unscale ────────────────────────────────────
        let scale = self.scaler.scale();
        let grads = loss.mul_scalar(scale).backward();
        let mut grads = GradientsParams::from_grads(grads, &self.model);
        if scale != 1.0 {
            scale_gradients::<B, _>(&self.model, &mut grads, 1.0 / scale);
        }

        // ── Overflow check + clipping ────────────────────────────────────────
        let norm    = clip_global_norm::<B, _>(&self.model, &mut grads, self.clip_grad);
        let applied = norm.is_finite();

        if applied {
            self.model = self.optim.step(lr, self.model.clone(), grads);
            self.valid_model = None;
        } else {
            tracing::warn!(
                "Non-finite gradients at loss scale {}; skipping update",
                scale,
            );
        }
        self.scaler.update(applied);

        Ok(StepReport {
            stats: BatchStats { loss: loss_value, correct, total },
            applied,
        })
    }

    fn valid_step(&mut self, batch: ImageBatch<B::InnerBackend>) -> Result<BatchStats> {
        let model = self.valid_model.get_or_insert_with(|| self.model.valid());
        Ok(validate_batch(model, &self.loss, batch))
    }

    fn loss_scale(&self) -> f64 {
        self.scaler.scale()
    }

    fn save_checkpoint(&self, meta: &CheckpointMeta) -> Result<()> {
        self.checkpoints.save_best(&self.model, &self.optim, meta)
    }
}

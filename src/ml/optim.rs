// ============================================================
// Layer 5 — Optimizers
// ============================================================
// adamw : Burn's AdamW, decoupled weight decay
// sgd   : Burn's SGD, momentum 0.9 without dampening, L2 decay
// lars  : layer-wise adaptive rate scaling, below
//
// LARS update for one parameter tensor w with gradient g:
//
//   trust = eta * |w| / (|g| + wd * |w| + eps)   (1 if either norm is 0)
//   v     = mu * v + lr * trust * (g + wd * w)
//   w     = w - v
//
// Norms are read back to the host once per tensor per step.
//
// Reference: You et al. (2017) Large Batch Training of
//            Convolutional Networks

use burn::{
    module::AutodiffModule,
    optim::{
        adaptor::OptimizerAdaptor,
        decay::WeightDecayConfig,
        momentum::MomentumConfig,
        AdamWConfig, Optimizer, SgdConfig, SimpleOptimizer,
    },
    prelude::*,
    record::Record,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};

// ─── OptimizerKind ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    AdamW,
    Sgd,
    Lars,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd   => "sgd",
            OptimizerKind::Lars  => "lars",
        }
    }
}

pub fn adamw<B, M>(weight_decay: f64) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .with_weight_decay(weight_decay as f32)
        .init()
}

pub fn sgd<B, M>(weight_decay: f64) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new().with_momentum(0.9).with_dampening(0.0),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(weight_decay as f32)))
        .init()
}

// ─── LARS ─────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct LarsConfig {
    #[config(default = 0.9)]
    pub momentum:          f64,
    #[config(default = 0.001)]
    pub trust_coefficient: f64,
    #[config(default = 0.0)]
    pub weight_decay:      f64,
    #[config(default = 1e-9)]
    pub epsilon:           f64,
}

impl LarsConfig {
    pub fn init<B, M>(&self) -> OptimizerAdaptor<Lars, M, B>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        OptimizerAdaptor::from(Lars {
            momentum:          self.momentum,
            trust_coefficient: self.trust_coefficient,
            weight_decay:      self.weight_decay,
            epsilon:           self.epsilon,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Lars {
    momentum:          f64,
    trust_coefficient: f64,
    weight_decay:      f64,
    epsilon:           f64,
}

/// Momentum buffer of one parameter tensor.
#[derive(Record, Clone)]
pub struct LarsState<B: Backend, const D: usize> {
    pub velocity: Tensor<B, D>,
}

impl Lars {
    /// Per-tensor learning-rate multiplier.
    pub fn trust_ratio(&self, weight_norm: f64, grad_norm: f64) -> f64 {
        if weight_norm <= 0.0 || grad_norm <= 0.0 {
            return 1.0;
        }
        self.trust_coefficient * weight_norm
            / (grad_norm + self.weight_decay * weight_norm + self.epsilon)
    }
}

fn l2_norm<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f64 {
    tensor
        .clone()
        .powf_scalar(2.0)
        .sum()
        .into_scalar()
        .elem::<f64>()
        .sqrt()
}

impl<B: Backend> SimpleOptimizer<B> for Lars {
    type State<const D: usize> = LarsState<B, D>;

    fn step<const D: usize>(
        &self,
        lr:     f64,
        tensor: Tensor<B, D>,
        grad:   Tensor<B, D>,
        state:  Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        let trust = self.trust_ratio(l2_norm(&tensor), l2_norm(&grad));

        let grad = if self.weight_decay > 0.0 {
            grad + tensor.clone().mul_scalar(self.weight_decay)
        } else {
            grad
        };
        let update = grad.mul_scalar(lr * trust);

        let velocity = match state {
            Some(state) => state.velocity.mul_scalar(self.momentum) + update,
            None        => update,
        };

        (tensor - velocity.clone(), Some(LarsState { velocity }))
    }

    fn to_device<const D: usize>(mut state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        state.velocity = state.velocity.to_device(device);
        state
    }
}

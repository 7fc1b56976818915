// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `eval`, and all
// their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing or malformed args
//   - type conversion (string → usize, f64, enums, ...)
//
// Boolean hyper-parameters take an explicit value
// (`--qkv-bias false`) so their `true` defaults can be turned off.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgAction, Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::domain::image::DatasetKind;
use crate::ml::{optim::OptimizerKind, runner::BackendKind};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a Vision Transformer on CIFAR-10 / CIFAR-100
    Train(TrainArgs),

    /// Evaluate the best checkpoint of a finished run
    Eval(EvalArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetArg {
    #[value(name = "CIFAR10")]
    Cifar10,
    #[value(name = "CIFAR100")]
    Cifar100,
}

impl From<DatasetArg> for DatasetKind {
    fn from(d: DatasetArg) -> Self {
        match d {
            DatasetArg::Cifar10  => DatasetKind::Cifar10,
            DatasetArg::Cifar100 => DatasetKind::Cifar100,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerArg {
    #[value(name = "adamw")]
    AdamW,
    Sgd,
    Lars,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(o: OptimizerArg) -> Self {
        match o {
            OptimizerArg::AdamW => OptimizerKind::AdamW,
            OptimizerArg::Sgd   => OptimizerKind::Sgd,
            OptimizerArg::Lars  => OptimizerKind::Lars,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Wgpu,
    #[value(name = "ndarray")]
    NdArray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::NdArray => BackendKind::NdArray,
        }
    }
}

fn parse_num_classes(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n @ (10 | 100 | 1000)) => Ok(n),
        Ok(n)  => Err(format!("{n} is not one of 10, 100, 1000")),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_non_negative(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("{s} must be a finite value >= 0"))
    }
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding the extracted CIFAR binary files
    #[arg(long, default_value = "./data")]
    pub dir: PathBuf,

    /// Number of output classes; must match the dataset
    #[arg(long, default_value_t = 10, value_parser = parse_num_classes)]
    pub num_classes: usize,

    /// Side length of the square patches
    #[arg(long, default_value_t = 2)]
    pub patch_size: usize,

    /// Input resolution (CIFAR images are 32x32)
    #[arg(long, default_value_t = 32)]
    pub image_size: usize,

    #[arg(long, default_value_t = 3)]
    pub in_channels: usize,

    /// Token width of the transformer
    #[arg(long, default_value_t = 192)]
    pub embed_dim: usize,

    /// Number of transformer blocks
    #[arg(long, default_value_t = 9)]
    pub num_layers: usize,

    /// Attention heads per block; must divide embed-dim
    #[arg(long, default_value_t = 12)]
    pub num_heads: usize,

    /// MLP hidden width as a multiple of embed-dim
    #[arg(long, default_value_t = 2.0)]
    pub vit_mlp_ratio: f64,

    /// Add a bias to the query/key/value projection
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub qkv_bias: bool,

    /// Dropout probability
    #[arg(long, default_value_t = 0.0)]
    pub drop_rate: f64,

    #[arg(long, default_value_t = 0.1)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Peak learning rate, reached at the end of warmup
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 10)]
    pub warmup_epochs: usize,

    /// Learning rate of the first warmup epoch
    #[arg(long, default_value_t = 1e-6)]
    pub warmup_lr: f64,

    /// Learning rate at the end of the cosine decay
    #[arg(long, default_value_t = 1e-6)]
    pub min_lr: f64,

    #[arg(long, value_enum, default_value_t = OptimizerArg::AdamW)]
    pub optimizer: OptimizerArg,

    /// Maximum stochastic-depth rate (last block)
    #[arg(long, default_value_t = 0.1)]
    pub drop_path_rate: f64,

    #[arg(long, default_value_t = 0.1)]
    pub label_smoothing: f64,

    /// Shape exponent of the cosine decay
    #[arg(long, default_value_t = 1.0)]
    pub gamma: f64,

    #[arg(long, value_enum, default_value_t = DatasetArg::Cifar10)]
    pub dataset: DatasetArg,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Data-loading worker threads; batch order is only
    /// reproducible with 1
    #[arg(long, default_value_t = 8)]
    pub num_workers: usize,

    /// Where checkpoints, config and metrics.csv are written
    #[arg(long, default_value = ".")]
    pub checkpoint_dir: PathBuf,

    /// Global gradient-norm threshold; 0 disables clipping
    #[arg(long, default_value_t = 0.0, value_parser = parse_non_negative)]
    pub clip_grad: f64,

    /// Dynamic loss scaling
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub amp: bool,

    /// Random crop and horizontal flip on training images
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub augment: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Continue from the best checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dir:             a.dir,
            checkpoint_dir:  a.checkpoint_dir,
            dataset:         a.dataset.into(),
            num_classes:     a.num_classes,
            image_size:      a.image_size,
            patch_size:      a.patch_size,
            in_channels:     a.in_channels,
            embed_dim:       a.embed_dim,
            num_layers:      a.num_layers,
            num_heads:       a.num_heads,
            vit_mlp_ratio:   a.vit_mlp_ratio,
            qkv_bias:        a.qkv_bias,
            drop_rate:       a.drop_rate,
            drop_path_rate:  a.drop_path_rate,
            weight_decay:    a.weight_decay,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            lr:              a.lr,
            warmup_epochs:   a.warmup_epochs,
            warmup_lr:       a.warmup_lr,
            min_lr:          a.min_lr,
            gamma:           a.gamma,
            optimizer:       a.optimizer.into(),
            label_smoothing: a.label_smoothing,
            clip_grad:       a.clip_grad,
            amp:             a.amp,
            augment:         a.augment,
            seed:            a.seed,
            num_workers:     a.num_workers,
            backend:         a.backend.into(),
            resume:          a.resume,
        }
    }
}

/// All arguments for the `eval` command
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Directory of a finished training run
    #[arg(long)]
    pub checkpoint_dir: PathBuf,

    /// Dataset directory; defaults to the one used for training
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

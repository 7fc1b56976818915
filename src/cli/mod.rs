// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with `clap` and delegates all
// work to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — trains a ViT on CIFAR and keeps the best checkpoint
//   2. `eval`  — reloads the best checkpoint and reports val metrics
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser};
use commands::{Commands, EvalArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "vit-cifar",
    version,
    about = "Train a Vision Transformer on CIFAR-10 / CIFAR-100."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case of the chosen subcommand.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let cfg: TrainConfig = args.into();
    // cross-field problems are usage errors, reported like clap's own
    if let Err(e) = cfg.validate() {
        Cli::command().error(ErrorKind::ValueValidation, e).exit();
    }

    tracing::info!(
        "Training ViT on {} ({} epochs, optimizer {})",
        cfg.dataset.name(), cfg.epochs, cfg.optimizer.name(),
    );
    let history = TrainUseCase::new(cfg).execute()?;

    println!(
        "Training complete. Best validation accuracy: {:.4}",
        history.best_val_accuracy()
    );
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::EvalUseCase;

    let (meta, summary) = EvalUseCase::new(args.checkpoint_dir, args.dir).execute()?;
    println!(
        "Checkpoint from epoch {}: val_loss={:.4} val_acc={:.4} ({} images)",
        meta.epoch, summary.loss, summary.accuracy, summary.examples,
    );
    Ok(())
}

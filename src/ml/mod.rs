// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that runs on a Burn backend, plus the epoch loop
// that drives it.
//
//   model.rs     — Vision Transformer: strided-conv patch
//                  embedding, class token, learned positions,
//                  pre-norm blocks with stochastic depth
//   loss.rs      — label-smoothed cross-entropy
//   optim.rs     — AdamW / SGD (Burn) and LARS
//   scheduler.rs — linear warmup + cosine decay, per epoch
//   scaler.rs    — dynamic loss scaling
//   executor.rs  — one training / validation step on the model
//   trainer.rs   — the epoch loop over a StepExecutor
//   runner.rs    — backend selection and wiring
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Dosovitskiy et al. (2021) An Image is Worth 16x16 Words

/// Vision Transformer architecture
pub mod model;

/// Label-smoothed cross-entropy
pub mod loss;

/// Optimizer construction, including LARS
pub mod optim;

/// Warmup + cosine learning-rate schedule
pub mod scheduler;

/// Dynamic loss scaling
pub mod scaler;

/// Burn implementation of the StepExecutor trait
pub mod executor;

/// Epoch loop with validation and best-checkpoint tracking
pub mod trainer;

/// Backend selection, training and evaluation entry points
pub mod runner;

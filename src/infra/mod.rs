// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs — Saving and loading the best model,
//                   optimizer state and schedule position with
//                   Burn's CompactRecorder, plus the run's
//                   TrainConfig as JSON so `eval` can rebuild
//                   the model.
//
//   metrics.rs    — Epoch reporters: a tracing log line and a
//                   CSV row per epoch.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Best-model checkpoint saving and loading
pub mod checkpoint;

/// Per-epoch metrics reporters (log + CSV)
pub mod metrics;

// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file handling used by the trainer and the use
// cases:
//
//   checkpoint.rs — Saving and loading model weights
//                   Uses Burn's CompactRecorder to serialise
//                   model parameters to disk. Also writes the
//                   ModelDescriptor and the run config as JSON
//                   so `evaluate` can rebuild the model.
//
//   metrics.rs    — Training metrics logging
//                   Writes epoch-level metrics (loss, accuracy,
//                   learning rate) to a CSV file and keeps the
//                   run's History.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger and History
pub mod metrics;

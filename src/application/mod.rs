// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal per use case (train, train on folders, evaluate).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Every training run follows the same shape:
//   construct callbacks → fit → evaluate
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Array-fed training with one-hot labels
pub mod train_use_case;

// Directory-fed training with sparse labels
pub mod train_raw_use_case;

// Reload a checkpoint and score it on a folder
pub mod evaluate_use_case;

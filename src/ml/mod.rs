// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, trains, or evaluates a network.
//
//   model.rs      — ImageClassifier trait + ResNet v1 for small
//                   images (depth 6n + 2, three residual stages)
//
//   loss.rs       — categorical / sparse cross-entropy and
//                   accuracy, picked by the batch's target encoding
//
//   callbacks.rs  — epoch hooks: learning-rate schedule,
//                   reduce-on-plateau, best-model checkpoint,
//                   early stopping
//
//   trainer.rs    — the fit loop: forward, loss, backward, Adam
//                   step, validation, callbacks, History
//
//   evaluator.rs  — loss/accuracy over a batch stream, no grads
//
// The trainer and evaluator are generic over ImageClassifier, so
// the ResNet here is one model among any that implement it.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            He et al. (2016) Deep Residual Learning

/// Classifier trait and ResNet architecture
pub mod model;

/// Cross-entropy losses and accuracy
pub mod loss;

/// Training callbacks (scheduler, plateau, checkpoint, early stop)
pub mod callbacks;

/// Full training loop with validation and callbacks
pub mod trainer;

/// Test-set / validation evaluation
pub mod evaluator;

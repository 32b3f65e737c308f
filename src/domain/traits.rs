// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer asks for samples without caring where
// they come from:
//   - ImageFolder         → class sub-directories on disk
//   - (future) a packed array file
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::label::{ImageSample, LabelMode};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can materialise a labelled image set in memory.
pub trait SampleSource {
    /// Load every sample, encoding labels with `mode`.
    fn load_samples(&self, mode: LabelMode) -> Result<Vec<ImageSample>>;

    /// Class names in label-index order.
    fn class_names(&self) -> &[String];

    fn num_classes(&self) -> usize {
        self.class_names().len()
    }
}

// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between image files on disk and tensor batches.
//
//   class-per-directory folder
//       │
//       ▼
//   ImageFolder        → scans classes and files, decodes/resizes
//       │
//       ├──► load_samples → in-memory arrays (array pipeline)
//       └──► ImageFolderDataset → lazy reads (directory pipeline)
//       │
//       ▼
//   Augmenter          → random transform + standardisation
//       │
//       ▼
//   ImageBatcher       → stacks samples into [N, C, H, W] tensors
//       │
//       ▼
//   DataLoader (Burn)  → shuffles, batches, runs workers
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Scans class-per-directory image folders
pub mod loader;

/// In-memory and lazy Burn datasets
pub mod dataset;

/// Real-time augmentation and standardisation
pub mod augmentation;

/// Affine warp, fill modes, and flips used by augmentation
pub mod affine;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded shuffle-and-split of sample lists
pub mod splitter;

// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// What lives in a checkpoint directory:
//   1. <model-file>.mpk      — model weights (best epoch so far)
//   2. model.json            — ModelDescriptor: architecture config,
//                              input size, class names, label mode,
//                              evaluation-time preprocessing
//   3. train_config.json     — the run's hyperparameters
//   4. metrics.csv           — written by MetricsLogger
//
// The descriptor is what makes `evaluate` possible: loading needs
// a model of the exact same architecture to load the weights into,
// and the class order to interpret the folder being evaluated.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack (half precision)
//   - Appends the .mpk extension itself
//   - Type-safe: loading fails if architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::data::augmentation::AugmentationConfig;
use crate::domain::label::LabelMode;
use crate::ml::model::ResNetConfig;

const DESCRIPTOR_FILE: &str = "model.json";
const CONFIG_FILE:     &str = "train_config.json";

/// Everything needed to rebuild a trained network and feed it images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model:       ResNetConfig,
    /// (height, width) the network was trained on
    pub image_size:  (usize, usize),
    /// Label index → class name
    pub class_names: Vec<String>,
    pub label_mode:  LabelMode,
    /// Weights file stem inside the checkpoint directory
    pub weights:     String,
    /// Standardisation applied to images at evaluation time
    pub preprocessing: AugmentationConfig,
}

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the directory like `mkdir -p`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        anyhow::ensure!(
            dir.is_dir(),
            "Checkpoint directory '{}' does not exist. Have you run 'train' first?",
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a weights file (without the extension the recorder adds).
    pub fn weights_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Save `model`'s weights to `path` (the recorder adds `.mpk`).
    pub fn save_model<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
        }
        CompactRecorder::new()
            .record(model.clone().into_record(), path.to_path_buf())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved weights to '{}'", path.display());
        Ok(())
    }

    /// Load weights from `path` into a model of the same architecture.
    pub fn load_model<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
        let record = CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_descriptor(&self, descriptor: &ModelDescriptor) -> Result<()> {
        self.write_json(DESCRIPTOR_FILE, descriptor)
    }

    pub fn load_descriptor(&self) -> Result<ModelDescriptor> {
        self.read_json(DESCRIPTOR_FILE)
    }

    /// Save the run's hyperparameters next to the weights.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read '{}'. Make sure you have run 'train' first.", path.display())
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }
}

// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Reloads a trained model from its checkpoint directory and
// measures loss/accuracy on a class-per-directory folder.
//
//   model.json ──► rebuild architecture ──► load weights
//   test folder ──► same image size, same preprocessing ──► evaluate

use anyhow::{ensure, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};

use crate::data::{
    augmentation::Augmenter, batcher::ImageBatcher, dataset::ImageFolderDataset, loader::ImageFolder,
};
use crate::domain::traits::SampleSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    evaluator::{evaluate, Evaluation},
    model::ResNet,
};

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    test_dir:       String,
    batch_size:     usize,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: impl Into<String>, test_dir: impl Into<String>) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), test_dir: test_dir.into(), batch_size: 32 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<Evaluation> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");

        let ckpt = CheckpointManager::open(&self.checkpoint_dir)?;
        let desc = ckpt.load_descriptor()?;

        let folder = ImageFolder::scan(&self.test_dir, desc.image_size)?;
        ensure!(
            folder.class_names() == desc.class_names.as_slice(),
            "Classes in '{}' {:?} do not match the trained classes {:?}",
            self.test_dir,
            folder.class_names(),
            desc.class_names
        );

        let model: ResNet<B> = desc.model.init(device)?;
        let model = CheckpointManager::load_model(model, &ckpt.weights_path(&desc.weights), device)?;
        tracing::info!("Loaded '{}' from '{}'", desc.weights, self.checkpoint_dir);

        let batcher = ImageBatcher::<B>::with_augmenter(device.clone(), Augmenter::new(desc.preprocessing)?);
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(self.batch_size)
            .build(ImageFolderDataset::new(&folder, desc.label_mode));

        Ok(evaluate(&model, &*loader))
    }
}

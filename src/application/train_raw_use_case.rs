// ============================================================
// Layer 2 — TrainRawUseCase
// ============================================================
// Directory-fed training with sparse (index) labels.
//
//   train folder ──► heavy augmentation ──┐
//                                         ├──► fit (fixed step counts)
//   val folder   ──► rescale only      ───┘
//
// Images are decoded lazily by the data loader workers, so the
// folders never have to fit in memory. Each epoch runs a fixed
// number of steps; the streams restart when they run out.
//
// Reference: Burn Book §4 (Datasets), §5 (Training)

use anyhow::{bail, ensure, Result};
use burn::{module::AutodiffModule, optim::AdamConfig, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::{
    augmentation::{AugmentationConfig, Augmenter},
    dataset::ImageFolderDataset,
    loader::{ImageFolder, Subset},
};
use crate::domain::{label::LabelMode, traits::SampleSource};
use crate::infra::{
    checkpoint::{CheckpointManager, ModelDescriptor},
    metrics::{History, MetricsLogger},
};
use crate::ml::{
    callbacks::CallbackList,
    model::{ImageClassifier, ResNet, ResNetConfig},
    trainer::{fit, FitData, FitOptions},
};

const RAW_WEIGHTS: &str = "resnet_raw";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainRawConfig {
    pub train_dir:          String,
    /// Without a validation folder, the training folder is split using
    /// `train_augmentation.validation_split`
    pub val_dir:            Option<String>,
    pub epochs:             usize,
    pub steps_per_epoch:    usize,
    pub validation_steps:   usize,
    pub image_size:         usize,
    pub batch_size:         usize,
    pub lr:                 f64,
    pub depth:              usize,
    pub checkpoint_dir:     String,
    pub seed:               u64,
    pub workers:            usize,
    pub train_augmentation: AugmentationConfig,
    pub val_augmentation:   AugmentationConfig,
}

impl Default for TrainRawConfig {
    fn default() -> Self {
        Self {
            train_dir:          "data/train".to_string(),
            val_dir:            None,
            epochs:             10,
            steps_per_epoch:    100,
            validation_steps:   50,
            image_size:         150,
            batch_size:         32,
            lr:                 0.01,
            depth:              20,
            checkpoint_dir:     "checkpoints".to_string(),
            seed:               42,
            workers:            1,
            train_augmentation: AugmentationConfig::directory_pipeline(),
            val_augmentation:   AugmentationConfig::rescale_only(1.0 / 255.0),
        }
    }
}

/// Train `model` on a training folder, validating on `val` every epoch.
///
/// Adam with a constant learning rate, sparse cross-entropy, no
/// callbacks. Returns the trained model and its history.
pub fn train_raw<B, M>(
    model:  M,
    train:  &ImageFolder,
    val:    &ImageFolder,
    cfg:    &TrainRawConfig,
    logger: Option<&MetricsLogger>,
    device: &B::Device,
) -> Result<(M, History)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    ensure!(
        train.class_names() == val.class_names(),
        "Validation classes {:?} do not match training classes {:?}",
        val.class_names(),
        train.class_names()
    );

    let train_data = FitData::new(ImageFolderDataset::new(train, LabelMode::Sparse))
        .with_augmenter(Augmenter::new(cfg.train_augmentation.clone())?);
    let val_data = FitData::new(ImageFolderDataset::new(val, LabelMode::Sparse))
        .with_augmenter(Augmenter::new(cfg.val_augmentation.clone())?);

    let opts = FitOptions {
        epochs:           cfg.epochs,
        batch_size:       cfg.batch_size,
        steps_per_epoch:  Some(cfg.steps_per_epoch),
        validation_steps: Some(cfg.validation_steps),
        shuffle:          true,
        seed:             cfg.seed,
        workers:          cfg.workers,
        initial_lr:       cfg.lr,
        verbose:          true,
    };

    fit(
        model,
        train_data,
        Some(val_data),
        &AdamConfig::new().with_epsilon(1e-7),
        &opts,
        &mut CallbackList::new(),
        logger,
        device,
    )
}

pub struct TrainRawUseCase {
    config: TrainRawConfig,
}

impl TrainRawUseCase {
    pub fn new(config: TrainRawConfig) -> Self {
        Self { config }
    }

    /// Train a ResNet from the configured folders, save the final
    /// weights, and return the history.
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<History> {
        let cfg = &self.config;
        ensure!(cfg.epochs > 0, "epochs must be at least 1");
        ensure!(cfg.steps_per_epoch > 0, "steps_per_epoch must be at least 1");
        ensure!(cfg.batch_size > 0, "batch_size must be at least 1");
        let size = (cfg.image_size, cfg.image_size);
        let (train, val) = scan_folders(cfg, size)?;

        let model_cfg = ResNetConfig::new(train.num_classes()).with_depth(cfg.depth);
        let model: ResNet<B> = model_cfg.init(device)?;

        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt.save_config(cfg)?;
        ckpt.save_descriptor(&ModelDescriptor {
            model:         model_cfg,
            image_size:    size,
            class_names:   train.class_names().to_vec(),
            label_mode:    LabelMode::Sparse,
            weights:       RAW_WEIGHTS.to_string(),
            preprocessing: cfg.val_augmentation.clone(),
        })?;
        let logger = MetricsLogger::new(ckpt.dir())?;

        let (model, history) = train_raw(model, &train, &val, cfg, Some(&logger), device)?;

        CheckpointManager::save_model(&model, &ckpt.weights_path(RAW_WEIGHTS))?;
        tracing::info!("Saved final weights to '{}'", ckpt.weights_path(RAW_WEIGHTS).display());
        Ok(history)
    }
}

/// Training and validation folders. A separate validation folder
/// leaves the whole training folder for training; otherwise it is
/// split per class by `validation_split`.
fn scan_folders(cfg: &TrainRawConfig, size: (usize, usize)) -> Result<(ImageFolder, ImageFolder)> {
    let split = cfg.train_augmentation.validation_split;
    match (&cfg.val_dir, split > 0.0) {
        (Some(dir), _) => Ok((ImageFolder::scan(&cfg.train_dir, size)?, ImageFolder::scan(dir, size)?)),
        (None, true) => Ok((
            ImageFolder::scan_subset(&cfg.train_dir, size, split, Subset::Training)?,
            ImageFolder::scan_subset(&cfg.train_dir, size, split, Subset::Validation)?,
        )),
        (None, false) => bail!("train-raw needs a validation folder or a validation_split > 0"),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::make_folder;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn small_config(train_dir: &std::path::Path, ckpt_dir: &std::path::Path) -> TrainRawConfig {
        TrainRawConfig {
            train_dir:        train_dir.to_string_lossy().into_owned(),
            epochs:           2,
            steps_per_epoch:  3,
            validation_steps: 2,
            image_size:       8,
            batch_size:       2,
            depth:            8,
            checkpoint_dir:   ckpt_dir.to_string_lossy().into_owned(),
            ..TrainRawConfig::default()
        }
    }

    #[test]
    fn test_train_raw_with_validation_folder() {
        let train = make_folder(2);
        let val   = make_folder(1);
        let out   = tempfile::tempdir().unwrap();
        let cfg   = TrainRawConfig {
            val_dir: Some(val.path().to_string_lossy().into_owned()),
            ..small_config(train.path(), out.path())
        };

        let history = TrainRawUseCase::new(cfg).execute::<TestBackend>(&Default::default()).unwrap();

        assert_eq!(history.len(), 2);
        assert!(history.series("val_acc").is_some());
        // constant learning rate without callbacks
        assert_eq!(history.series("lr").unwrap(), vec![0.01, 0.01]);
        assert!(out.path().join("resnet_raw.mpk").exists());
    }

    #[test]
    fn test_validation_split_of_training_folder() {
        let train = make_folder(4);
        let out   = tempfile::tempdir().unwrap();
        let mut cfg = small_config(train.path(), out.path());
        cfg.epochs = 1;
        cfg.train_augmentation.validation_split = 0.25;

        let history = TrainRawUseCase::new(cfg).execute::<TestBackend>(&Default::default()).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_validation_folder_keeps_every_training_image() {
        let train = make_folder(4);
        let val   = make_folder(1);
        let out   = tempfile::tempdir().unwrap();
        let mut cfg = TrainRawConfig {
            val_dir: Some(val.path().to_string_lossy().into_owned()),
            ..small_config(train.path(), out.path())
        };
        cfg.train_augmentation.validation_split = 0.25;

        let (train_folder, val_folder) = scan_folders(&cfg, (8, 8)).unwrap();
        assert_eq!(train_folder.len(), 8);
        assert_eq!(val_folder.len(), 2);

        // without the folder the split applies
        cfg.val_dir = None;
        let (train_folder, val_folder) = scan_folders(&cfg, (8, 8)).unwrap();
        assert_eq!(train_folder.len(), 6);
        assert_eq!(val_folder.len(), 2);
    }

    #[test]
    fn test_missing_validation_source_is_an_error() {
        let train = make_folder(1);
        let out   = tempfile::tempdir().unwrap();
        let cfg   = small_config(train.path(), out.path());
        assert!(TrainRawUseCase::new(cfg).execute::<TestBackend>(&Default::default()).is_err());
    }
}

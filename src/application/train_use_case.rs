// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Array-fed training of a classifier with one-hot labels.
//
//   Step 1: Scan + decode the training folder     (Layer 4 - data)
//   Step 2: Test split: second folder or hold-out (Layer 4 - data)
//   Step 3: Build the ResNet                      (Layer 5 - ml)
//   Step 4: Save config + model descriptor        (Layer 6 - infra)
//   Step 5: train(): callbacks → fit → evaluate   (Layer 5 - ml)
//
// train() is the reusable part: it accepts any ImageClassifier
// plus in-memory train/test arrays, exactly like handing X/Y
// arrays to a framework's fit().
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

use crate::data::{
    augmentation::{AugmentationConfig, Augmenter},
    batcher::ImageBatcher,
    dataset::{array_dataset, load_arrays},
    loader::ImageFolder,
    splitter::split_train_val,
};
use crate::domain::{
    label::{ImageSample, LabelMode},
    traits::SampleSource,
};
use crate::infra::{
    checkpoint::{CheckpointManager, ModelDescriptor},
    metrics::{History, MetricsLogger},
};
use crate::ml::{
    callbacks::{step_decay, CallbackList, EarlyStopping, LearningRateScheduler, ModelCheckpoint, Monitor, PlateauConfig},
    evaluator::{evaluate, Evaluation},
    model::{ImageClassifier, ResNet, ResNetConfig},
    trainer::{fit, FitData, FitOptions, SharedDataset},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Serialisable so it can be
// saved next to the checkpoint and loaded back with --config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_dir:      String,
    /// Without a test folder, `test_fraction` of the training images are held out
    pub test_dir:       Option<String>,
    pub image_size:     usize,
    pub epochs:         usize,
    pub batch_size:     usize,
    /// Real-time augmentation instead of static shuffled arrays
    pub augment:        bool,
    pub depth:          usize,
    pub early_stopping: bool,
    pub checkpoint_dir: String,
    /// Weights file stem for the best model
    pub model_file:     String,
    pub test_fraction:  f64,
    pub seed:           u64,
    /// Multiplier applied to pixel values when the arrays are loaded
    pub input_scale:    f32,
    /// Used only when `augment` is set
    pub augmentation:   AugmentationConfig,
    /// Learning-rate reduction on a val_loss plateau
    pub plateau:        PlateauConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir:      String::new(),
            test_dir:       None,
            image_size:     32,
            epochs:         200,
            batch_size:     32,
            augment:        false,
            depth:          20,
            early_stopping: false,
            checkpoint_dir: "checkpoints".to_string(),
            model_file:     "resnet_best".to_string(),
            test_fraction:  0.2,
            seed:           42,
            input_scale:    1.0 / 255.0,
            augmentation:   AugmentationConfig::array_pipeline(),
            plateau:        PlateauConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Load a full run configuration from JSON; missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.train_dir.is_empty(), "train_dir is required");
        ensure!(self.epochs > 0, "epochs must be at least 1");
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.image_size > 0, "image_size must be at least 1");
        ensure!(
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "test_fraction must be strictly between 0 and 1"
        );
        self.plateau.build(Monitor::ValLoss)?;
        self.augmentation.validate()
    }
}

/// What a training run produced.
pub struct TrainReport<M> {
    pub model:   M,
    pub history: History,
    pub test:    Evaluation,
}

/// Train `model` on in-memory arrays, then evaluate it on the test arrays.
///
/// Callbacks: best-only checkpoint on `val_acc`, step-decay schedule,
/// reduce-on-plateau, and (opt-in) early stopping.
pub fn train<B, M>(
    model:       M,
    train_set:   Vec<ImageSample>,
    test_set:    Vec<ImageSample>,
    cfg:         &TrainConfig,
    ckpt:        &CheckpointManager,
    device:      &B::Device,
) -> Result<TrainReport<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    ensure!(!train_set.is_empty(), "Training set is empty");
    ensure!(
        !test_set.is_empty(),
        "Test set is empty; add images or raise test_fraction"
    );
    let optimizer = AdamConfig::new().with_epsilon(1e-8);

    let mut callbacks = CallbackList::new();
    callbacks.push(
        ModelCheckpoint::new(ckpt.weights_path(&cfg.model_file).to_string_lossy(), Monitor::ValAcc)
            .save_best_only(true)
            .verbose(true),
    );
    callbacks.push(LearningRateScheduler::new(step_decay));
    callbacks.push(cfg.plateau.build(Monitor::ValLoss)?);
    if cfg.early_stopping {
        callbacks.push(EarlyStopping::default());
    }

    let logger = MetricsLogger::new(ckpt.dir())?;
    let test_ds: SharedDataset = Arc::new(array_dataset(test_set));
    let validation = FitData { dataset: test_ds.clone(), augmenter: None };

    let mut opts = FitOptions {
        epochs:     cfg.epochs,
        batch_size: cfg.batch_size,
        shuffle:    true,
        seed:       cfg.seed,
        initial_lr: step_decay(0),
        ..FitOptions::default()
    };

    let train_data = if !cfg.augment {
        println!("Not using data augmentation.");
        FitData::new(array_dataset(train_set))
    } else {
        println!("Using real-time data augmentation.");
        let mut augmenter = Augmenter::new(cfg.augmentation.clone())?;
        // featurewise statistics come from the training arrays
        augmenter.fit(&train_set)?;
        opts.workers         = 4;
        opts.steps_per_epoch = Some(train_set.len().div_ceil(cfg.batch_size));
        FitData::new(array_dataset(train_set)).with_augmenter(augmenter)
    };

    let (model, history) = fit(
        model,
        train_data,
        Some(validation),
        &optimizer,
        &opts,
        &mut callbacks,
        Some(&logger),
        device,
    )?;

    // ── Evaluate the final model on the test arrays ──────────────────────────
    let test_loader = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .build(test_ds);
    let test = evaluate(&model.valid(), &*test_loader);
    println!("Accuracy on the test set: {}%", test.accuracy * 100.0);

    Ok(TrainReport { model, history, test })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full pipeline from folders on disk.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainReport<ResNet<B>>> {
        let cfg = &self.config;
        cfg.validate()?;
        let size = (cfg.image_size, cfg.image_size);

        // ── Step 1: Load the training arrays ─────────────────────────────────
        let folder = ImageFolder::scan(&cfg.train_dir, size)?;
        let mut samples = load_arrays(&folder, LabelMode::Categorical)?;
        scale_pixels(&mut samples, cfg.input_scale);

        // ── Step 2: Test arrays ───────────────────────────────────────────────
        let (train_set, test_set) = match &cfg.test_dir {
            Some(dir) => {
                let test_folder = ImageFolder::scan(dir, size)?;
                ensure!(
                    test_folder.class_names() == folder.class_names(),
                    "Test classes {:?} do not match training classes {:?}",
                    test_folder.class_names(),
                    folder.class_names()
                );
                let mut test = load_arrays(&test_folder, LabelMode::Categorical)?;
                scale_pixels(&mut test, cfg.input_scale);
                (samples, test)
            }
            None => split_train_val(samples, 1.0 - cfg.test_fraction, cfg.seed),
        };
        tracing::info!("Split: {} train, {} test", train_set.len(), test_set.len());
        ensure!(
            !train_set.is_empty() && !test_set.is_empty(),
            "Holding out {} of {} images leaves {} train and {} test images; both need at least one",
            cfg.test_fraction,
            train_set.len() + test_set.len(),
            train_set.len(),
            test_set.len()
        );

        // ── Step 3: Build the model ──────────────────────────────────────────
        let model_cfg = ResNetConfig::new(folder.num_classes()).with_depth(cfg.depth);
        let model: ResNet<B> = model_cfg.init(device)?;
        tracing::info!("ResNet{} ready: {} classes", cfg.depth, folder.num_classes());

        // ── Step 4: Save config + descriptor for `evaluate` ──────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt.save_config(cfg)?;
        ckpt.save_descriptor(&ModelDescriptor {
            model:         model_cfg,
            image_size:    size,
            class_names:   folder.class_names().to_vec(),
            label_mode:    LabelMode::Categorical,
            weights:       cfg.model_file.clone(),
            preprocessing: AugmentationConfig::rescale_only(cfg.input_scale),
        })?;

        // ── Step 5: Fit + evaluate ────────────────────────────────────────────
        train(model, train_set, test_set, cfg, &ckpt, device)
    }
}

fn scale_pixels(samples: &mut [ImageSample], factor: f32) {
    if factor == 1.0 {
        return;
    }
    for s in samples.iter_mut() {
        s.image.data.iter_mut().for_each(|v| *v *= factor);
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::make_folder;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn small_config(train_dir: &Path, ckpt_dir: &Path) -> TrainConfig {
        TrainConfig {
            train_dir:      train_dir.to_string_lossy().into_owned(),
            image_size:     4,
            epochs:         2,
            batch_size:     2,
            depth:          8,
            checkpoint_dir: ckpt_dir.to_string_lossy().into_owned(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_writes_checkpoint_files() {
        let data = make_folder(5);
        let out  = tempfile::tempdir().unwrap();
        let cfg  = small_config(data.path(), out.path());

        let report = TrainUseCase::new(cfg).execute::<TestBackend>(&Default::default()).unwrap();

        assert_eq!(report.history.len(), 2);
        // 10 images, 20% held out
        assert_eq!(report.test.samples, 2);
        assert!((0.0..=1.0).contains(&report.test.accuracy));
        for file in ["resnet_best.mpk", "model.json", "metrics.csv", "train_config.json"] {
            assert!(out.path().join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn test_augmented_branch_runs() {
        let data = make_folder(3);
        let out  = tempfile::tempdir().unwrap();
        let cfg  = TrainConfig {
            augment: true,
            epochs:  1,
            ..small_config(data.path(), out.path())
        };

        let report = TrainUseCase::new(cfg).execute::<TestBackend>(&Default::default()).unwrap();
        assert_eq!(report.history.len(), 1);
    }

    #[test]
    fn test_empty_hold_out_is_an_error() {
        // 2 images: 20% rounds to an empty test split
        let data = make_folder(1);
        let out  = tempfile::tempdir().unwrap();
        let cfg  = small_config(data.path(), out.path());

        let err = TrainUseCase::new(cfg).execute::<TestBackend>(&Default::default());
        assert!(err.is_err());
        assert!(!out.path().join("model.json").exists());
    }

    #[test]
    fn test_train_rejects_empty_test_arrays() {
        let data   = make_folder(2);
        let out    = tempfile::tempdir().unwrap();
        let cfg    = small_config(data.path(), out.path());
        let device = Default::default();
        let folder = ImageFolder::scan(data.path(), (4, 4)).unwrap();
        let arrays = load_arrays(&folder, LabelMode::Categorical).unwrap();
        let model: ResNet<TestBackend> = ResNetConfig::new(2).with_depth(8).init(&device).unwrap();
        let ckpt   = CheckpointManager::new(out.path()).unwrap();

        assert!(train(model, arrays, Vec::new(), &cfg, &ckpt, &device).is_err());
    }

    #[test]
    fn test_config_json_fills_defaults() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{ "train_dir": "imgs", "epochs": 3, "augment": true }"#).unwrap();

        let cfg = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.train_dir, "imgs");
        assert_eq!(cfg.epochs, 3);
        assert!(cfg.augment);
        assert_eq!(cfg.batch_size, 32);
        assert!(cfg.augmentation.horizontal_flip);
        assert_eq!(cfg.plateau.patience, 5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let base = TrainConfig { train_dir: "imgs".into(), ..TrainConfig::default() };
        assert!(base.validate().is_ok());
        assert!(TrainConfig::default().validate().is_err());
        let cfg = TrainConfig { batch_size: 0, ..base.clone() };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig {
            plateau: PlateauConfig { factor: 1.5, ..PlateauConfig::default() },
            ..base.clone()
        };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig { test_fraction: 1.0, ..base };
        assert!(cfg.validate().is_err());
    }
}

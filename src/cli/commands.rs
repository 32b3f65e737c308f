// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `train-raw`, and
// `evaluate`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{train_raw_use_case::TrainRawConfig, train_use_case::TrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a ResNet on in-memory image arrays (one-hot labels)
    Train(TrainArgs),

    /// Train a ResNet streaming images from folders (sparse labels)
    TrainRaw(TrainRawArgs),

    /// Score a trained checkpoint on an image folder
    Evaluate(EvaluateArgs),
}

/// Compute backend for tensors.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// GPU through WGPU (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// CPU through ndarray
    Ndarray,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Class-per-directory folder with the training images
    #[arg(long, required_unless_present = "config")]
    pub train_dir: Option<String>,

    /// Folder with the test images; without it 20% of the
    /// training images are held out
    #[arg(long)]
    pub test_dir: Option<String>,

    /// Images are resized to SIZE x SIZE
    #[arg(long, default_value_t = 32)]
    pub image_size: usize,

    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Use real-time data augmentation (shifts + horizontal flips)
    #[arg(long)]
    pub augment: bool,

    /// ResNet depth, 6n + 2 (20, 32, 44, 56, ...)
    #[arg(long, default_value_t = 20)]
    pub depth: usize,

    /// Stop when val_loss stops improving and restore the best weights
    #[arg(long)]
    pub early_stopping: bool,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// File stem for the best model's weights
    #[arg(long, default_value = "resnet_best")]
    pub model_file: String,

    /// JSON TrainConfig; replaces all the flags above
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_dir:      a.train_dir.unwrap_or_default(),
            test_dir:       a.test_dir,
            image_size:     a.image_size,
            epochs:         a.epochs,
            batch_size:     a.batch_size,
            augment:        a.augment,
            depth:          a.depth,
            early_stopping: a.early_stopping,
            checkpoint_dir: a.checkpoint_dir,
            model_file:     a.model_file,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainRawArgs {
    #[arg(long)]
    pub train_dir: String,

    /// Validation folder; may be replaced by --validation-split
    #[arg(long)]
    pub val_dir: Option<String>,

    /// Fraction of each training class used for validation when
    /// no --val-dir is given
    #[arg(long, default_value_t = 0.0)]
    pub validation_split: f64,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 100)]
    pub steps_per_epoch: usize,

    #[arg(long, default_value_t = 50)]
    pub validation_steps: usize,

    #[arg(long, default_value_t = 150)]
    pub image_size: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 0.01)]
    pub lr: f64,

    #[arg(long, default_value_t = 20)]
    pub depth: usize,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl From<TrainRawArgs> for TrainRawConfig {
    fn from(a: TrainRawArgs) -> Self {
        let mut cfg = TrainRawConfig {
            train_dir:        a.train_dir,
            val_dir:          a.val_dir,
            epochs:           a.epochs,
            steps_per_epoch:  a.steps_per_epoch,
            validation_steps: a.validation_steps,
            image_size:       a.image_size,
            batch_size:       a.batch_size,
            lr:               a.lr,
            depth:            a.depth,
            checkpoint_dir:   a.checkpoint_dir,
            ..TrainRawConfig::default()
        };
        cfg.train_augmentation.validation_split = a.validation_split;
        cfg
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Class-per-directory folder to score
    #[arg(long)]
    pub test_dir: String,

    /// Directory written by `train` or `train-raw`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

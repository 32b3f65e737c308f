// ============================================================
// Layer 5 — Training Loop
// ============================================================
// A Keras-style `fit` over Burn's DataLoader and Adam.
//
//   for each epoch:
//     callbacks.on_epoch_begin   → learning rate for the epoch
//     steps_per_epoch × (forward → loss → backward → Adam step)
//     validation_steps × forward on model.valid()
//     print + CSV row + History
//     callbacks.on_epoch_end     → save / new lr / stop
//
// Step counts work like a Python generator: the batch stream is
// created once and restarted whenever it runs dry, so 100 steps
// over a 63-batch folder take 63 batches, then 37 from a fresh
// (reshuffled) pass, and the next epoch continues from there.
//
// Key Burn insight:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation batcher must also use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{ensure, Result};
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::data::{
    augmentation::Augmenter,
    batcher::{ImageBatch, ImageBatcher},
};
use crate::domain::label::ImageSample;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, History, MetricsLogger},
};
use crate::ml::{
    callbacks::CallbackList,
    evaluator::evaluate_batches,
    loss::{classification_loss, correct_predictions},
    model::ImageClassifier,
};

pub type SharedDataset = Arc<dyn Dataset<ImageSample>>;

/// A dataset plus the per-image processing applied while batching.
#[derive(Clone)]
pub struct FitData {
    pub dataset:   SharedDataset,
    pub augmenter: Option<Augmenter>,
}

impl FitData {
    pub fn new(dataset: impl Dataset<ImageSample> + 'static) -> Self {
        Self { dataset: Arc::new(dataset), augmenter: None }
    }

    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs:           usize,
    pub batch_size:       usize,
    /// Defaults to one pass over the training set
    pub steps_per_epoch:  Option<usize>,
    /// Defaults to one pass over the validation set
    pub validation_steps: Option<usize>,
    pub shuffle:          bool,
    pub seed:             u64,
    pub workers:          usize,
    /// Learning rate before any callback changes it
    pub initial_lr:       f64,
    /// Show a progress bar per epoch
    pub verbose:          bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs:           1,
            batch_size:       32,
            steps_per_epoch:  None,
            validation_steps: None,
            shuffle:          true,
            seed:             42,
            workers:          1,
            initial_lr:       1e-3,
            verbose:          true,
        }
    }
}

/// Train `model` and return it with the per-epoch history.
pub fn fit<B, M>(
    mut model:  M,
    train:      FitData,
    validation: Option<FitData>,
    optimizer:  &AdamConfig,
    opts:       &FitOptions,
    callbacks:  &mut CallbackList,
    logger:     Option<&MetricsLogger>,
    device:     &B::Device,
) -> Result<(M, History)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    ensure!(!train.is_empty(), "Training set is empty; nothing to fit");
    ensure!(opts.batch_size > 0, "batch_size must be at least 1");

    let validation = validation.filter(|v| {
        if v.is_empty() {
            tracing::warn!("Validation set is empty; skipping validation");
        }
        !v.is_empty()
    });

    let train_steps = opts.steps_per_epoch.unwrap_or_else(|| train.len().div_ceil(opts.batch_size));
    let val_steps   = validation.as_ref().map(|v| {
        opts.validation_steps.unwrap_or_else(|| v.len().div_ceil(opts.batch_size))
    });
    tracing::info!(
        "Fitting on {} samples ({} steps/epoch), validating on {} samples",
        train.len(),
        train_steps,
        validation.as_ref().map_or(0, FitData::len)
    );

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = match train.augmenter {
        Some(aug) => ImageBatcher::<B>::with_augmenter(device.clone(), aug),
        None => ImageBatcher::<B>::new(device.clone()),
    };
    let mut builder = DataLoaderBuilder::new(train_batcher)
        .batch_size(opts.batch_size)
        .num_workers(opts.workers.max(1));
    if opts.shuffle {
        builder = builder.shuffle(opts.seed);
    }
    let train_loader = builder.build(train.dataset);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_loader = validation.map(|v| validation_loader::<B::InnerBackend>(v, opts.batch_size, device));

    // Endless streams; each restart of loader.iter() is a new pass
    let mut train_stream = std::iter::repeat_with(|| train_loader.iter()).flatten();
    let mut val_stream   = val_loader
        .as_ref()
        .map(|loader| std::iter::repeat_with(move || loader.iter()).flatten());

    let mut optim    = optimizer.init();
    let mut lr       = opts.initial_lr;
    let mut history  = History::default();
    let mut snapshot = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 0..opts.epochs {
        lr = callbacks.on_epoch_begin(epoch, lr);
        if opts.verbose {
            println!("Epoch {}/{}", epoch + 1, opts.epochs);
        }

        let bar = progress_bar(train_steps as u64, opts.verbose)?;

        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in train_stream.by_ref().take(train_steps) {
            let n      = batch.len();
            let logits = model.forward(batch.images);
            let loss   = classification_loss(logits.clone(), &batch.targets);

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            if loss_val.is_nan() {
                tracing::warn!("NaN loss at epoch {}", epoch + 1);
            }
            loss_sum += loss_val * n as f64;
            correct  += correct_predictions(logits, &batch.targets);
            seen     += n;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);

            bar.inc(1);
            bar.set_message(format!(
                "loss: {:.4} - acc: {:.4}",
                loss_sum / seen as f64,
                correct as f64 / seen as f64
            ));
        }
        bar.finish_and_clear();

        let train_loss = if seen > 0 { loss_sum / seen as f64 } else { f64::NAN };
        let train_acc  = if seen > 0 { correct as f64 / seen as f64 } else { 0.0 };

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → model on the inner backend, dropout disabled
        let (val_loss, val_acc) = match (val_stream.as_mut(), val_steps) {
            (Some(stream), Some(steps)) => {
                let eval = evaluate_batches(&model.valid(), stream.by_ref().take(steps));
                (Some(eval.loss), Some(eval.accuracy))
            }
            _ => (None, None),
        };

        let metrics = EpochMetrics::new(epoch + 1, train_loss, train_acc, val_loss, val_acc, lr);
        if opts.verbose {
            println!("{}/{} - {}", train_steps, train_steps, metrics.summary());
        }
        if let Some(logger) = logger {
            logger.log(&metrics)?;
        }

        let decision = callbacks.on_epoch_end(&metrics, lr);
        history.push(metrics);

        if decision.snapshot {
            snapshot = Some(model.clone());
        }
        if let Some(path) = &decision.save_to {
            CheckpointManager::save_model(&model, path)?;
        }
        if let Some(new_lr) = decision.lr {
            lr = new_lr;
        }
        if decision.stop {
            if decision.restore_snapshot {
                if let Some(best) = snapshot.take() {
                    tracing::info!("Restoring model weights from the end of the best epoch");
                    model = best;
                }
            }
            break;
        }
    }

    tracing::info!("Training complete after {} epochs", history.len());
    Ok((model, history))
}

/// Validation batches in dataset order from a single worker, so one
/// pass is exactly `ceil(len / batch_size)` batches covering every sample.
fn validation_loader<B: Backend>(
    data:       FitData,
    batch_size: usize,
    device:     &B::Device,
) -> Arc<dyn DataLoader<ImageBatch<B>>> {
    let batcher = match data.augmenter {
        Some(aug) => ImageBatcher::<B>::with_augmenter(device.clone(), aug),
        None => ImageBatcher::<B>::new(device.clone()),
    };
    DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(1)
        .build(data.dataset)
}

fn progress_bar(steps: u64, verbose: bool) -> Result<ProgressBar> {
    if !verbose {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(steps);
    bar.set_style(ProgressStyle::with_template("{pos:>4}/{len} [{bar:30}] {elapsed} {msg}")?.progress_chars("=> "));
    Ok(bar)
}

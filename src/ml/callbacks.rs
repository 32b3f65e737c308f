// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Hooks the trainer calls at epoch boundaries:
//
//   on_epoch_begin(epoch, lr)      → maybe a new learning rate
//   on_epoch_end(metrics, lr)      → EpochDecision
//
// Callbacks never touch the model. They only return decisions
// (new lr, save to path, snapshot, stop) and the trainer, which
// owns the model, carries them out. This keeps callbacks plain
// structs that are trivial to unit-test.
//
// Available:
//   LearningRateScheduler   lr = schedule(epoch)
//   ReduceLrOnPlateau       shrink lr when a metric stalls
//   ModelCheckpoint         save weights when a metric improves
//   EarlyStopping           stop when a metric stalls
//
// All "has it improved?" questions go through one tracker so the
// direction (min for losses, max for accuracies) and the NaN
// handling are identical everywhere.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

use crate::infra::metrics::EpochMetrics;

// ─── Monitor ──────────────────────────────────────────────────────────────────
/// A metric a callback can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Loss,
    Acc,
    ValLoss,
    ValAcc,
}

impl Monitor {
    /// The value for this epoch; `None` when no validation ran.
    pub fn value(self, m: &EpochMetrics) -> Option<f64> {
        match self {
            Monitor::Loss    => Some(m.loss),
            Monitor::Acc     => Some(m.acc),
            Monitor::ValLoss => m.val_loss,
            Monitor::ValAcc  => m.val_acc,
        }
    }

    /// Accuracies are maximised, losses minimised.
    pub fn higher_is_better(self) -> bool {
        matches!(self, Monitor::Acc | Monitor::ValAcc)
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Monitor::Loss    => "loss",
            Monitor::Acc     => "acc",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAcc  => "val_acc",
        };
        f.write_str(s)
    }
}

// ─── ImprovementTracker ───────────────────────────────────────────────────────
/// Remembers the best value of a monitored metric.
#[derive(Debug, Clone)]
pub struct ImprovementTracker {
    monitor:   Monitor,
    min_delta: f64,
    best:      Option<f64>,
}

impl ImprovementTracker {
    pub fn new(monitor: Monitor, min_delta: f64) -> Self {
        Self { monitor, min_delta: min_delta.abs(), best: None }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// True when `current` beats the best by more than `min_delta`.
    /// NaN never improves. The first real value always does.
    pub fn is_improvement(&self, current: f64) -> bool {
        if current.is_nan() {
            return false;
        }
        match self.best {
            None => true,
            Some(best) if self.monitor.higher_is_better() => current - self.min_delta > best,
            Some(best) => current + self.min_delta < best,
        }
    }

    /// Record `current` if it improves; returns whether it did.
    pub fn update(&mut self, current: f64) -> bool {
        let improved = self.is_improvement(current);
        if improved {
            self.best = Some(current);
        }
        improved
    }
}

// ─── Callback trait ───────────────────────────────────────────────────────────
/// What the trainer should do after an epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochDecision {
    /// Switch to this learning rate from the next step on
    pub lr:               Option<f64>,
    /// Save the current weights to this path
    pub save_to:          Option<PathBuf>,
    /// Keep an in-memory copy of the current weights
    pub snapshot:         bool,
    /// End training after this epoch
    pub stop:             bool,
    /// Put the snapshotted weights back before returning
    pub restore_snapshot: bool,
}

impl EpochDecision {
    /// Combine with a later callback's decision; later values win.
    pub fn merge(&mut self, other: EpochDecision) {
        if other.lr.is_some() {
            self.lr = other.lr;
        }
        if other.save_to.is_some() {
            self.save_to = other.save_to;
        }
        self.snapshot         |= other.snapshot;
        self.stop             |= other.stop;
        self.restore_snapshot |= other.restore_snapshot;
    }
}

pub trait Callback {
    /// Called before epoch `epoch` (0-based). Returning `Some(lr)`
    /// replaces the learning rate for the whole epoch.
    fn on_epoch_begin(&mut self, _epoch: usize, _lr: f64) -> Option<f64> {
        None
    }

    /// Called after training and validation of an epoch.
    fn on_epoch_end(&mut self, _metrics: &EpochMetrics, _lr: f64) -> EpochDecision {
        EpochDecision::default()
    }
}

/// Runs callbacks in registration order.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback + Send>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cb: impl Callback + Send + 'static) {
        self.callbacks.push(Box::new(cb));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Learning rate to use for `epoch`, after every callback had its say.
    pub fn on_epoch_begin(&mut self, epoch: usize, lr: f64) -> f64 {
        self.callbacks
            .iter_mut()
            .fold(lr, |lr, cb| cb.on_epoch_begin(epoch, lr).unwrap_or(lr))
    }

    pub fn on_epoch_end(&mut self, metrics: &EpochMetrics, lr: f64) -> EpochDecision {
        let mut decision = EpochDecision::default();
        let mut lr = lr;
        for cb in self.callbacks.iter_mut() {
            let d = cb.on_epoch_end(metrics, lr);
            if let Some(new_lr) = d.lr {
                lr = new_lr;
            }
            decision.merge(d);
        }
        decision
    }
}

// ─── LearningRateScheduler ────────────────────────────────────────────────────
/// Sets the learning rate to `schedule(epoch)` (0-based) at the start
/// of every epoch. A reduction made by `ReduceLrOnPlateau` therefore
/// lasts for one epoch only.
pub struct LearningRateScheduler {
    schedule: Box<dyn Fn(usize) -> f64 + Send>,
}

impl LearningRateScheduler {
    pub fn new(schedule: impl Fn(usize) -> f64 + Send + 'static) -> Self {
        Self { schedule: Box::new(schedule) }
    }
}

impl Callback for LearningRateScheduler {
    fn on_epoch_begin(&mut self, epoch: usize, _lr: f64) -> Option<f64> {
        let scheduled = (self.schedule)(epoch);
        tracing::debug!("Epoch {:05}: learning rate set to {:e}", epoch + 1, scheduled);
        Some(scheduled)
    }
}

/// Step decay: 1e-3, cut by 10x after epoch 80 and 120, by 1000x
/// after 160, and by 2000x after 180.
pub fn step_decay(epoch: usize) -> f64 {
    let lr = 1e-3;
    if epoch > 180 {
        lr * 0.5e-3
    } else if epoch > 160 {
        lr * 1e-3
    } else if epoch > 120 {
        lr * 1e-2
    } else if epoch > 80 {
        lr * 1e-1
    } else {
        lr
    }
}

// ─── ReduceLrOnPlateau ────────────────────────────────────────────────────────
/// Multiplies the learning rate by `factor` when `monitor` has not
/// improved for `patience` epochs.
///
/// `new` starts from factor 0.1, patience 10, no cooldown, no floor
/// and min_delta 1e-4.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    tracker:          ImprovementTracker,
    factor:           f64,
    patience:         usize,
    cooldown:         usize,
    min_lr:           f64,
    wait:             usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            tracker:          ImprovementTracker::new(monitor, 1e-4),
            factor:           0.1,
            patience:         10,
            cooldown:         0,
            min_lr:           0.0,
            wait:             0,
            cooldown_counter: 0,
        }
    }

    /// `factor` must lie in (0, 1).
    pub fn with_factor(mut self, factor: f64) -> Result<Self> {
        ensure!(
            factor > 0.0 && factor < 1.0,
            "ReduceLrOnPlateau does not support a factor of {factor}; it must be in (0, 1)"
        );
        self.factor = factor;
        Ok(self)
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.tracker = ImprovementTracker::new(self.tracker.monitor, min_delta);
        self
    }

    fn in_cooldown(&self) -> bool {
        self.cooldown_counter > 0
    }
}

/// Serialisable `ReduceLrOnPlateau` settings for run configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    pub factor:    f64,
    pub patience:  usize,
    pub cooldown:  usize,
    pub min_lr:    f64,
    pub min_delta: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor:    0.1f64.sqrt(),
            patience:  5,
            cooldown:  0,
            min_lr:    0.5e-6,
            min_delta: 1e-4,
        }
    }
}

impl PlateauConfig {
    pub fn build(&self, monitor: Monitor) -> Result<ReduceLrOnPlateau> {
        Ok(ReduceLrOnPlateau::new(monitor)
            .with_factor(self.factor)?
            .with_patience(self.patience)
            .with_cooldown(self.cooldown)
            .with_min_lr(self.min_lr)
            .with_min_delta(self.min_delta))
    }
}

impl Callback for ReduceLrOnPlateau {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics, lr: f64) -> EpochDecision {
        let monitor = self.tracker.monitor;
        let Some(current) = monitor.value(metrics) else {
            tracing::warn!("ReduceLrOnPlateau: metric '{}' is not available; skipping", monitor);
            return EpochDecision::default();
        };

        if self.in_cooldown() {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if self.tracker.update(current) {
            self.wait = 0;
        } else if !self.in_cooldown() {
            self.wait += 1;
            if self.wait >= self.patience && lr > self.min_lr {
                let new_lr = (lr * self.factor).max(self.min_lr);
                tracing::info!(
                    "Epoch {:05}: ReduceLrOnPlateau reducing learning rate to {:e}",
                    metrics.epoch, new_lr
                );
                self.cooldown_counter = self.cooldown;
                self.wait = 0;
                return EpochDecision { lr: Some(new_lr), ..EpochDecision::default() };
            }
        }
        EpochDecision::default()
    }
}

// ─── ModelCheckpoint ──────────────────────────────────────────────────────────
/// Requests a save of the model weights after an epoch.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    /// May contain `{epoch}`, replaced by the 1-based epoch number
    filepath:       String,
    tracker:        ImprovementTracker,
    save_best_only: bool,
    verbose:        bool,
}

impl ModelCheckpoint {
    pub fn new(filepath: impl Into<String>, monitor: Monitor) -> Self {
        Self {
            filepath:       filepath.into(),
            tracker:        ImprovementTracker::new(monitor, 0.0),
            save_best_only: false,
            verbose:        false,
        }
    }

    pub fn save_best_only(mut self, on: bool) -> Self {
        self.save_best_only = on;
        self
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Path for the given 1-based epoch.
    pub fn path_for(&self, epoch: usize) -> PathBuf {
        PathBuf::from(self.filepath.replace("{epoch}", &format!("{epoch:02}")))
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _lr: f64) -> EpochDecision {
        let path = self.path_for(metrics.epoch);
        if !self.save_best_only {
            if self.verbose {
                tracing::info!("Epoch {:05}: saving model to {}", metrics.epoch, path.display());
            }
            return EpochDecision { save_to: Some(path), ..EpochDecision::default() };
        }

        let monitor = self.tracker.monitor;
        let Some(current) = monitor.value(metrics) else {
            tracing::warn!("ModelCheckpoint: can save best model only with '{}' available, skipping", monitor);
            return EpochDecision::default();
        };

        let previous = self.tracker.best();
        if self.tracker.update(current) {
            if self.verbose {
                match previous {
                    Some(prev) => tracing::info!(
                        "Epoch {:05}: {} improved from {:.5} to {:.5}, saving model to {}",
                        metrics.epoch, monitor, prev, current, path.display()
                    ),
                    None => tracing::info!(
                        "Epoch {:05}: {} improved to {:.5}, saving model to {}",
                        metrics.epoch, monitor, current, path.display()
                    ),
                }
            }
            EpochDecision { save_to: Some(path), ..EpochDecision::default() }
        } else {
            if self.verbose {
                tracing::info!(
                    "Epoch {:05}: {} did not improve from {:.5}",
                    metrics.epoch, monitor, previous.unwrap_or(f64::NAN)
                );
            }
            EpochDecision::default()
        }
    }
}

// ─── EarlyStopping ────────────────────────────────────────────────────────────
/// Stops training once `monitor` has stalled for `patience` epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    tracker:              ImprovementTracker,
    patience:             usize,
    restore_best_weights: bool,
    wait:                 usize,
    stopped_epoch:        Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, patience: usize, min_delta: f64) -> Self {
        Self {
            tracker: ImprovementTracker::new(monitor, min_delta),
            patience,
            restore_best_weights: false,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn restore_best_weights(mut self, on: bool) -> Self {
        self.restore_best_weights = on;
        self
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(Monitor::ValLoss, 5, 1e-3).restore_best_weights(true)
    }
}

impl Callback for EarlyStopping {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _lr: f64) -> EpochDecision {
        let Some(current) = self.tracker.monitor.value(metrics) else {
            return EpochDecision::default();
        };

        if self.tracker.update(current) {
            self.wait = 0;
            return EpochDecision { snapshot: self.restore_best_weights, ..EpochDecision::default() };
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(metrics.epoch);
            tracing::info!("Epoch {:05}: early stopping", metrics.epoch);
            return EpochDecision {
                stop:             true,
                restore_snapshot: self.restore_best_weights,
                ..EpochDecision::default()
            };
        }
        EpochDecision::default()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(n: usize, val_loss: f64, val_acc: f64) -> EpochMetrics {
        EpochMetrics::new(n, 1.0, 0.5, Some(val_loss), Some(val_acc), 1e-3)
    }

    #[test]
    fn test_step_decay_boundaries() {
        assert_eq!(step_decay(0), 1e-3);
        assert_eq!(step_decay(80), 1e-3);
        assert!((step_decay(81) - 1e-4).abs() < 1e-12);
        assert!((step_decay(121) - 1e-5).abs() < 1e-12);
        assert!((step_decay(161) - 1e-6).abs() < 1e-12);
        assert!((step_decay(181) - 0.5e-6).abs() < 1e-12);
    }

    #[test]
    fn test_tracker_direction_and_nan() {
        let mut acc = ImprovementTracker::new(Monitor::ValAcc, 0.0);
        assert!(acc.update(0.5));
        assert!(!acc.update(0.4));
        assert!(!acc.update(f64::NAN));
        assert!(acc.update(0.6));

        let mut loss = ImprovementTracker::new(Monitor::ValLoss, 0.1);
        assert!(loss.update(1.0));
        // within min_delta → not an improvement
        assert!(!loss.update(0.95));
        assert!(loss.update(0.8));
        assert_eq!(loss.best(), Some(0.8));
    }

    #[test]
    fn test_scheduler_sets_rate_every_epoch() {
        let mut s = LearningRateScheduler::new(|e| if e < 2 { 0.1 } else { 0.01 });
        assert_eq!(s.on_epoch_begin(0, 1.0), Some(0.1));
        // a plateau reduction made in between is overridden
        assert_eq!(s.on_epoch_begin(1, 0.03), Some(0.1));
        assert_eq!(s.on_epoch_begin(2, 0.03), Some(0.01));
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut p = ReduceLrOnPlateau::new(Monitor::ValLoss).with_patience(2).with_factor(0.5).unwrap();
        assert_eq!(p.on_epoch_end(&epoch(1, 1.0, 0.0), 0.1).lr, None);
        assert_eq!(p.on_epoch_end(&epoch(2, 1.0, 0.0), 0.1).lr, None);
        assert_eq!(p.on_epoch_end(&epoch(3, 1.0, 0.0), 0.1).lr, Some(0.05));
        // wait counter restarts after a reduction
        assert_eq!(p.on_epoch_end(&epoch(4, 1.0, 0.0), 0.05).lr, None);
        assert_eq!(p.on_epoch_end(&epoch(5, 1.0, 0.0), 0.05).lr, Some(0.025));
    }

    #[test]
    fn test_plateau_respects_min_lr() {
        let mut p = ReduceLrOnPlateau::new(Monitor::ValLoss)
            .with_patience(1)
            .with_factor(0.1)
            .unwrap()
            .with_min_lr(0.004);
        p.on_epoch_end(&epoch(1, 1.0, 0.0), 0.01);
        assert_eq!(p.on_epoch_end(&epoch(2, 1.0, 0.0), 0.01).lr, Some(0.004));
        // already at the floor
        assert_eq!(p.on_epoch_end(&epoch(3, 1.0, 0.0), 0.004).lr, None);
    }

    #[test]
    fn test_plateau_cooldown() {
        let mut p = ReduceLrOnPlateau::new(Monitor::ValLoss)
            .with_patience(1)
            .with_factor(0.5)
            .unwrap()
            .with_cooldown(2);
        p.on_epoch_end(&epoch(1, 1.0, 0.0), 0.1);
        assert_eq!(p.on_epoch_end(&epoch(2, 1.0, 0.0), 0.1).lr, Some(0.05));
        assert_eq!(p.on_epoch_end(&epoch(3, 1.0, 0.0), 0.05).lr, None);
        assert_eq!(p.on_epoch_end(&epoch(4, 1.0, 0.0), 0.05).lr, None);
        assert_eq!(p.on_epoch_end(&epoch(5, 1.0, 0.0), 0.05).lr, Some(0.025));
    }

    #[test]
    fn test_plateau_defaults() {
        let mut p = ReduceLrOnPlateau::new(Monitor::ValLoss);
        p.on_epoch_end(&epoch(1, 1.0, 0.0), 1.0);
        let mut last = None;
        for e in 2..=11 {
            last = p.on_epoch_end(&epoch(e, 1.0, 0.0), 1.0).lr;
        }
        assert_eq!(last, Some(0.1));
    }

    #[test]
    fn test_plateau_config_defaults() {
        let mut p = PlateauConfig::default().build(Monitor::ValLoss).unwrap();
        p.on_epoch_end(&epoch(1, 1.0, 0.0), 1.0);
        let mut last = None;
        for e in 2..=6 {
            last = p.on_epoch_end(&epoch(e, 1.0, 0.0), 1.0).lr;
        }
        assert!((last.unwrap() - 0.1f64.sqrt()).abs() < 1e-12);

        let bad = PlateauConfig { factor: 2.0, ..PlateauConfig::default() };
        assert!(bad.build(Monitor::ValLoss).is_err());
    }

    #[test]
    fn test_plateau_factor_out_of_range() {
        assert!(ReduceLrOnPlateau::new(Monitor::ValLoss).with_factor(1.0).is_err());
        assert!(ReduceLrOnPlateau::new(Monitor::ValLoss).with_factor(0.0).is_err());
        assert!(ReduceLrOnPlateau::new(Monitor::ValLoss).with_factor(0.1f64.sqrt()).is_ok());
    }

    #[test]
    fn test_checkpoint_best_only() {
        let mut c = ModelCheckpoint::new("ckpt/model_{epoch}", Monitor::ValAcc).save_best_only(true);
        let d1 = c.on_epoch_end(&epoch(1, 1.0, 0.5), 0.1);
        assert_eq!(d1.save_to, Some(PathBuf::from("ckpt/model_01")));
        assert_eq!(c.on_epoch_end(&epoch(2, 1.0, 0.4), 0.1).save_to, None);
        assert_eq!(c.on_epoch_end(&epoch(3, 1.0, f64::NAN), 0.1).save_to, None);
        assert_eq!(
            c.on_epoch_end(&epoch(4, 1.0, 0.7), 0.1).save_to,
            Some(PathBuf::from("ckpt/model_04"))
        );
    }

    #[test]
    fn test_checkpoint_every_epoch() {
        let mut c = ModelCheckpoint::new("weights", Monitor::ValAcc);
        assert!(c.on_epoch_end(&epoch(1, 1.0, 0.5), 0.1).save_to.is_some());
        assert!(c.on_epoch_end(&epoch(2, 1.0, 0.1), 0.1).save_to.is_some());
    }

    #[test]
    fn test_checkpoint_without_validation_skips() {
        let mut c = ModelCheckpoint::new("weights", Monitor::ValAcc).save_best_only(true);
        let m = EpochMetrics::new(1, 1.0, 0.5, None, None, 0.1);
        assert_eq!(c.on_epoch_end(&m, 0.1), EpochDecision::default());
    }

    #[test]
    fn test_early_stopping() {
        let mut es = EarlyStopping::new(Monitor::ValLoss, 2, 0.0).restore_best_weights(true);
        assert!(es.on_epoch_end(&epoch(1, 1.0, 0.0), 0.1).snapshot);
        assert!(!es.on_epoch_end(&epoch(2, 1.1, 0.0), 0.1).stop);
        let d = es.on_epoch_end(&epoch(3, 1.2, 0.0), 0.1);
        assert!(d.stop);
        assert!(d.restore_snapshot);
        assert_eq!(es.stopped_epoch(), Some(3));
    }

    #[test]
    fn test_callback_list_chains_learning_rate() {
        let mut list = CallbackList::new();
        list.push(LearningRateScheduler::new(|_| 0.5));
        list.push(ReduceLrOnPlateau::new(Monitor::ValLoss).with_patience(1).with_factor(0.5).unwrap());
        assert_eq!(list.len(), 2);

        assert_eq!(list.on_epoch_begin(0, 1.0), 0.5);
        list.on_epoch_end(&epoch(1, 1.0, 0.0), 0.5);
        let d = list.on_epoch_end(&epoch(2, 1.0, 0.0), 0.5);
        assert_eq!(d.lr, Some(0.25));
        // the schedule wins at the next epoch start
        assert_eq!(list.on_epoch_begin(1, 0.25), 0.5);
    }

    #[test]
    fn test_monitor_display() {
        assert_eq!(Monitor::ValLoss.to_string(), "val_loss");
        assert_eq!(Monitor::ValAcc.to_string(), "val_acc");
    }
}

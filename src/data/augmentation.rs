// ============================================================
// Layer 4 — Real-time Data Augmentation
// ============================================================
// AugmentationConfig names every knob of the augmentation
// pipeline; Augmenter applies them to one image at a time as
// batches are assembled, so every epoch sees a fresh random
// variant of each training image.
//
// Per image, in order:
//   1. random_transform
//        rotation / shift / shear / zoom  (one affine warp)
//        channel shift                     (clipped to input range)
//        horizontal / vertical flip        (p = 0.5 each)
//   2. standardize
//        preprocessing function → rescale → samplewise centre/std
//        → featurewise centre/std
//
// Featurewise statistics come from `fit`, computed over the raw
// training arrays before training starts.

use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::affine::{self, Affine, FillMode};
use crate::domain::image::ImageArray;
use crate::domain::label::ImageSample;

/// Guard against division by a zero standard deviation.
const STD_EPSILON: f32 = 1e-6;

/// A fixed function applied to each image before rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    #[default]
    None,
    /// Map 0..255 onto -1..1 (x / 127.5 - 1).
    Inception,
}

impl Preprocessing {
    fn apply(self, image: &mut ImageArray) {
        match self {
            Preprocessing::None => {}
            Preprocessing::Inception => {
                for v in image.data.iter_mut() {
                    *v = *v / 127.5 - 1.0;
                }
            }
        }
    }
}

/// Every option of the augmentation pipeline. The default is the
/// identity: nothing is changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Subtract the dataset per-channel mean
    pub featurewise_center:            bool,
    /// Subtract each image's own mean
    pub samplewise_center:             bool,
    /// Divide by the dataset per-channel std
    pub featurewise_std_normalization: bool,
    /// Divide each image by its own std
    pub samplewise_std_normalization:  bool,
    /// Not supported; kept so configs that request it are rejected
    pub zca_whitening:                 bool,
    /// Degrees; rotation is drawn from [-range, range]
    pub rotation_range:                f32,
    /// Fraction of the width if < 1, otherwise pixels
    pub width_shift_range:             f32,
    /// Fraction of the height if < 1, otherwise pixels
    pub height_shift_range:            f32,
    /// Degrees; shear is drawn from [-range, range]
    pub shear_range:                   f32,
    /// Zoom factors are drawn from [1 - range, 1 + range]
    pub zoom_range:                    f32,
    /// Offset drawn from [-range, range] and added to every channel
    pub channel_shift_range:           f32,
    pub fill_mode:                     FillMode,
    /// Fill value for `FillMode::Constant`
    pub cval:                          f32,
    pub horizontal_flip:               bool,
    pub vertical_flip:                 bool,
    /// Multiplier applied after the preprocessing function
    pub rescale:                       Option<f32>,
    pub preprocessing:                 Preprocessing,
    /// Fraction of a directory reserved for validation, in [0, 1)
    pub validation_split:              f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            featurewise_center:            false,
            samplewise_center:             false,
            featurewise_std_normalization: false,
            samplewise_std_normalization:  false,
            zca_whitening:                 false,
            rotation_range:                0.0,
            width_shift_range:             0.0,
            height_shift_range:            0.0,
            shear_range:                   0.0,
            zoom_range:                    0.0,
            channel_shift_range:           0.0,
            fill_mode:                     FillMode::Nearest,
            cval:                          0.0,
            horizontal_flip:               false,
            vertical_flip:                 false,
            rescale:                       None,
            preprocessing:                 Preprocessing::None,
            validation_split:              0.0,
        }
    }
}

impl AugmentationConfig {
    /// Light augmentation for the array-fed pipeline: 10% shifts and
    /// horizontal flips.
    pub fn array_pipeline() -> Self {
        Self {
            width_shift_range:  0.1,
            height_shift_range: 0.1,
            horizontal_flip:    true,
            ..Self::default()
        }
    }

    /// Heavy augmentation for the directory-fed training stream.
    pub fn directory_pipeline() -> Self {
        Self {
            rescale:            Some(1.0 / 255.0),
            preprocessing:      Preprocessing::Inception,
            rotation_range:     40.0,
            width_shift_range:  0.2,
            height_shift_range: 0.2,
            shear_range:        0.2,
            zoom_range:         0.2,
            horizontal_flip:    true,
            fill_mode:          FillMode::Nearest,
            ..Self::default()
        }
    }

    /// No augmentation, only a rescale (validation streams).
    pub fn rescale_only(factor: f32) -> Self {
        Self { rescale: Some(factor), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.zca_whitening {
            bail!("ZCA whitening is not supported");
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            bail!("validation_split must be in [0, 1), got {}", self.validation_split);
        }
        let ranges = [
            ("rotation_range",      self.rotation_range),
            ("width_shift_range",   self.width_shift_range),
            ("height_shift_range",  self.height_shift_range),
            ("shear_range",         self.shear_range),
            ("zoom_range",          self.zoom_range),
            ("channel_shift_range", self.channel_shift_range),
        ];
        for (name, v) in ranges {
            if !v.is_finite() || v < 0.0 {
                bail!("{name} must be a non-negative number, got {v}");
            }
        }
        if self.zoom_range >= 1.0 {
            bail!("zoom_range must be below 1, got {}", self.zoom_range);
        }
        Ok(())
    }

    fn needs_featurewise_stats(&self) -> bool {
        self.featurewise_center || self.featurewise_std_normalization
    }
}

/// Dataset-level per-channel statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    pub mean: Vec<f32>,
    pub std:  Vec<f32>,
}

/// Applies an `AugmentationConfig` to individual images.
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
    stats:  Option<FeatureStats>,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, stats: None })
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    pub fn stats(&self) -> Option<&FeatureStats> {
        self.stats.as_ref()
    }

    /// Compute the per-channel mean and std of `samples`. Only needed
    /// when a featurewise option is enabled; otherwise a no-op.
    pub fn fit(&mut self, samples: &[ImageSample]) -> Result<()> {
        if !self.config.needs_featurewise_stats() {
            return Ok(());
        }
        let Some(first) = samples.first() else {
            bail!("Cannot fit featurewise statistics on an empty dataset");
        };
        let channels = first.image.channels;

        let mut sum   = vec![0.0f64; channels];
        let mut sq    = vec![0.0f64; channels];
        let mut count = 0usize;
        for s in samples {
            if s.image.channels != channels {
                bail!("All images must share the same channel count");
            }
            for px in s.image.data.chunks_exact(channels) {
                for (k, &v) in px.iter().enumerate() {
                    sum[k] += v as f64;
                    sq[k]  += (v as f64) * (v as f64);
                }
                count += 1;
            }
        }

        let n    = count.max(1) as f64;
        let mean: Vec<f32> = sum.iter().map(|s| (s / n) as f32).collect();
        let std:  Vec<f32> = sq
            .iter()
            .zip(sum.iter())
            .map(|(q, s)| {
                let m = s / n;
                ((q / n - m * m).max(0.0)).sqrt() as f32
            })
            .collect();

        tracing::info!("Fitted featurewise statistics: mean={:?} std={:?}", mean, std);
        self.stats = Some(FeatureStats { mean, std });
        Ok(())
    }

    /// Random augmentation followed by standardisation.
    pub fn process<R: Rng + ?Sized>(&self, image: &ImageArray, rng: &mut R) -> ImageArray {
        let mut out = self.random_transform(image, rng);
        self.standardize(&mut out);
        out
    }

    /// Apply one randomly drawn geometric/colour transform.
    pub fn random_transform<R: Rng + ?Sized>(&self, image: &ImageArray, rng: &mut R) -> ImageArray {
        let cfg = &self.config;
        let (h, w, _) = image.shape();

        let theta = symmetric(rng, cfg.rotation_range).to_radians();

        let mut tx = symmetric(rng, cfg.height_shift_range);
        if cfg.height_shift_range < 1.0 {
            tx *= h as f32;
        }
        let mut ty = symmetric(rng, cfg.width_shift_range);
        if cfg.width_shift_range < 1.0 {
            ty *= w as f32;
        }

        let shear = symmetric(rng, cfg.shear_range).to_radians();

        let (zx, zy) = if cfg.zoom_range > 0.0 {
            let lo = 1.0 - cfg.zoom_range;
            let hi = 1.0 + cfg.zoom_range;
            (rng.gen_range(lo..=hi), rng.gen_range(lo..=hi))
        } else {
            (1.0, 1.0)
        };

        let flip_h = cfg.horizontal_flip && rng.gen_bool(0.5);
        let flip_v = cfg.vertical_flip && rng.gen_bool(0.5);
        let channel_shift = symmetric(rng, cfg.channel_shift_range);

        let transform = Affine::rotation(theta)
            .then(&Affine::shift(tx, ty))
            .then(&Affine::shear(shear))
            .then(&Affine::zoom(zx, zy));

        let mut out = if transform.is_identity() {
            image.clone()
        } else {
            affine::warp(image, &transform.about_center(h, w), cfg.fill_mode, cfg.cval)
        };

        if channel_shift != 0.0 {
            let (lo, hi) = out.value_range();
            for v in out.data.iter_mut() {
                *v = (*v + channel_shift).clamp(lo, hi);
            }
        }
        if flip_h {
            if let Some(flipped) = affine::flip_horizontal(&out) {
                out = flipped;
            }
        }
        if flip_v {
            if let Some(flipped) = affine::flip_vertical(&out) {
                out = flipped;
            }
        }
        out
    }

    /// Deterministic normalisation applied to every image.
    pub fn standardize(&self, image: &mut ImageArray) {
        let cfg = &self.config;

        cfg.preprocessing.apply(image);

        if let Some(scale) = cfg.rescale {
            for v in image.data.iter_mut() {
                *v *= scale;
            }
        }

        if cfg.samplewise_center {
            let mean = mean(&image.data);
            for v in image.data.iter_mut() {
                *v -= mean;
            }
        }
        if cfg.samplewise_std_normalization {
            let std = std_dev(&image.data);
            for v in image.data.iter_mut() {
                *v /= std + STD_EPSILON;
            }
        }

        if cfg.needs_featurewise_stats() {
            match &self.stats {
                Some(stats) => {
                    let channels = image.channels;
                    for px in image.data.chunks_exact_mut(channels) {
                        for (k, v) in px.iter_mut().enumerate() {
                            if cfg.featurewise_center {
                                *v -= stats.mean[k];
                            }
                            if cfg.featurewise_std_normalization {
                                *v /= stats.std[k] + STD_EPSILON;
                            }
                        }
                    }
                }
                None => tracing::warn!(
                    "Featurewise normalisation requested but `fit` was never called; skipping"
                ),
            }
        }
    }
}

/// Uniform draw from [-range, range]; zero when the range is zero.
fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32).sqrt()
}

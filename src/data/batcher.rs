// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ImageSample>
// into tensors.
//
// Samples are stored channels-last (H, W, C); Burn's Conv2d
// wants channels-first, so every image is transposed while the
// batch buffer is filled:
//
//   Input:  N samples of shape [H, W, C]
//   Output: images [N, C, H, W] + targets
//
// When the batcher owns an Augmenter, each image is randomly
// transformed here. Burn's DataLoader runs batchers on its
// worker threads, so augmentation is parallel for free.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::augmentation::Augmenter;
use crate::domain::label::{ImageSample, Label};

// ─── Targets ──────────────────────────────────────────────────────────────────
/// Ground truth for a batch, in the dataset's label encoding.
#[derive(Debug, Clone)]
pub enum Targets<B: Backend> {
    /// Class indices — shape: [batch_size]
    Sparse(Tensor<B, 1, Int>),
    /// One-hot rows — shape: [batch_size, num_classes]
    Categorical(Tensor<B, 2>),
}

impl<B: Backend> Targets<B> {
    /// Class indices regardless of encoding — shape: [batch_size]
    pub fn class_indices(&self) -> Tensor<B, 1, Int> {
        match self {
            Targets::Sparse(t) => t.clone(),
            Targets::Categorical(t) => t.clone().argmax(1).flatten::<1>(0, 1),
        }
    }
}

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// shape: [batch_size, channels, height, width]
    pub images:  Tensor<B, 4>,
    pub targets: Targets<B>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device:    B::Device,
    augmenter: Option<Augmenter>,
}

impl<B: Backend> ImageBatcher<B> {
    /// A batcher that feeds images through unchanged.
    pub fn new(device: B::Device) -> Self {
        Self { device, augmenter: None }
    }

    /// A batcher that augments and standardises every image.
    pub fn with_augmenter(device: B::Device, augmenter: Augmenter) -> Self {
        Self { device, augmenter: Some(augmenter) }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let batch_size = items.len();
        let (height, width, channels) = items[0].image.shape();

        let mut rng    = rand::thread_rng();
        let mut pixels = Vec::with_capacity(batch_size * height * width * channels);
        for item in &items {
            let image = match &self.augmenter {
                Some(aug) => aug.process(&item.image, &mut rng),
                None => item.image.clone(),
            };
            pixels.extend(image.to_channels_first());
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, channels, height, width]),
            &self.device,
        );

        let targets = match &items[0].label {
            Label::Index(_) => {
                let idx: Vec<i64> = items
                    .iter()
                    .map(|s| s.label.class_index() as i64)
                    .collect();
                Targets::Sparse(Tensor::<B, 1, Int>::from_data(
                    TensorData::new(idx, [batch_size]),
                    &self.device,
                ))
            }
            Label::OneHot(first) => {
                let num_classes = first.len();
                let rows: Vec<f32> = items
                    .iter()
                    .flat_map(|s| match &s.label {
                        Label::OneHot(v) => v.clone(),
                        Label::Index(i) => {
                            let mut v = vec![0.0; num_classes];
                            v[*i] = 1.0;
                            v
                        }
                    })
                    .collect();
                Targets::Categorical(Tensor::<B, 2>::from_data(
                    TensorData::new(rows, [batch_size, num_classes]),
                    &self.device,
                ))
            }
        };

        ImageBatch { images, targets }
    }
}

// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Loss and accuracy of a model over a stream of batches, with no
// gradient tracking. Used for the per-epoch validation pass and
// for the final test-set report.
//
// Loss is averaged per sample (each batch mean is weighted by the
// batch size) so a short final batch does not skew the result.

use burn::{data::dataloader::DataLoader, prelude::*, tensor::ElementConversion};

use crate::data::batcher::ImageBatch;
use crate::ml::loss::{classification_loss, correct_predictions};
use crate::ml::model::ImageClassifier;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss:     f64,
    pub accuracy: f64,
    pub samples:  usize,
}

/// Evaluate `model` on every batch of `loader`.
pub fn evaluate<B, M>(model: &M, loader: &dyn DataLoader<ImageBatch<B>>) -> Evaluation
where
    B: Backend,
    M: ImageClassifier<B>,
{
    evaluate_batches(model, loader.iter())
}

/// Evaluate `model` on the given batches. An empty stream gives NaN
/// loss and zero accuracy.
pub fn evaluate_batches<B, M>(model: &M, batches: impl Iterator<Item = ImageBatch<B>>) -> Evaluation
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut loss_sum = 0.0f64;
    let mut correct  = 0usize;
    let mut samples  = 0usize;

    for batch in batches {
        let n      = batch.len();
        let logits = model.forward(batch.images);
        let loss: f64 = classification_loss(logits.clone(), &batch.targets)
            .into_scalar()
            .elem::<f64>();

        loss_sum += loss * n as f64;
        correct  += correct_predictions(logits, &batch.targets);
        samples  += n;
    }

    if samples == 0 {
        return Evaluation { loss: f64::NAN, accuracy: 0.0, samples };
    }
    Evaluation {
        loss:     loss_sum / samples as f64,
        accuracy: correct as f64 / samples as f64,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::Targets;
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray;

    /// Echoes the two pixels of each [1, 1, 2] image as logits.
    struct Echo;

    impl ImageClassifier<TestBackend> for Echo {
        fn forward(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            let [n, _, _, _] = images.dims();
            images.reshape([n, 2])
        }

        fn num_classes(&self) -> usize {
            2
        }
    }

    fn batch(pixels: Vec<f32>, labels: Vec<i64>) -> ImageBatch<TestBackend> {
        let device = Default::default();
        let n      = labels.len();
        ImageBatch {
            images:  Tensor::from_data(TensorData::new(pixels, [n, 1, 1, 2]), &device),
            targets: Targets::Sparse(Tensor::from_data(TensorData::new(labels, [n]), &device)),
        }
    }

    #[test]
    fn test_accuracy_over_batches() {
        let batches = vec![
            batch(vec![5.0, 0.0, 0.0, 5.0], vec![0, 1]),
            batch(vec![5.0, 0.0], vec![1]),
        ];
        let eval = evaluate_batches(&Echo, batches.into_iter());
        assert_eq!(eval.samples, 3);
        assert!((eval.accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!(eval.loss > 0.0);
    }

    #[test]
    fn test_empty_stream() {
        let eval = evaluate_batches::<TestBackend, _>(&Echo, std::iter::empty());
        assert_eq!(eval.samples, 0);
        assert!(eval.loss.is_nan());
    }
}

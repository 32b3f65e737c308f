// ============================================================
// Layer 5 — Loss and Accuracy
// ============================================================
// Two cross-entropy flavours, picked by the label encoding:
//
//   categorical  loss = mean_i( -Σ_k  y_ik · log softmax(z_i)_k )
//                (one-hot or soft targets, array pipeline)
//   sparse       Burn's CrossEntropyLoss on class indices
//                (directory pipeline)
//
// For strict one-hot targets both give the same number.
// Accuracy compares argmax(logits) with the target class.

use burn::{
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::{activation::log_softmax, ElementConversion},
};

use crate::data::batcher::Targets;

/// Mean cross-entropy of `logits` [batch, classes] against `targets`.
pub fn classification_loss<B: Backend>(logits: Tensor<B, 2>, targets: &Targets<B>) -> Tensor<B, 1> {
    match targets {
        Targets::Sparse(indices) => CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, indices.clone()),
        Targets::Categorical(one_hot) => categorical_cross_entropy(logits, one_hot.clone()),
    }
}

pub fn categorical_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (targets * log_probs).sum_dim(1).neg().mean()
}

/// Number of rows whose highest logit is the target class.
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: &Targets<B>) -> usize {
    // argmax(1) returns [batch, 1] — flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted
        .equal(targets.class_indices())
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray;

    fn logits(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(vec![2.0f32, 0.0, 0.0, 2.0, 3.0, 1.0], [3, 2]), device)
    }

    #[test]
    fn test_sparse_and_categorical_losses_agree() {
        let device = Default::default();
        let sparse = Targets::Sparse(Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 1], [3]),
            &device,
        ));
        let one_hot = Targets::Categorical(Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0, 0.0, 1.0], [3, 2]),
            &device,
        ));

        let a: f32 = classification_loss(logits(&device), &sparse).into_scalar().elem();
        let b: f32 = classification_loss(logits(&device), &one_hot).into_scalar().elem();
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");

        // rows: log(1+e^-2), log(1+e^-2), log(1+e^2)
        let expected = ((1.0f32 + (-2.0f32).exp()).ln() * 2.0 + (1.0f32 + 2.0f32.exp()).ln()) / 3.0;
        assert!((b - expected).abs() < 1e-4, "{b} vs {expected}");
    }

    #[test]
    fn test_correct_predictions() {
        let device  = Default::default();
        let targets = Targets::Sparse(Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 1], [3]),
            &device,
        ));
        // third row predicts class 0 but target is 1
        assert_eq!(correct_predictions(logits(&device), &targets), 2);
    }
}

// ============================================================
// Layer 3 — Labels and Samples
// ============================================================
// Two label encodings are in play:
//
//   Sparse       — a class index            (directory pipeline)
//   Categorical  — a one-hot vector         (array pipeline)
//
// The encoding decides which loss and accuracy definitions the
// trainer uses, so it travels with every sample.

use serde::{Deserialize, Serialize};

use crate::domain::image::ImageArray;

/// How labels are encoded for a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    Sparse,
    Categorical,
}

/// The label of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Label {
    Index(usize),
    OneHot(Vec<f32>),
}

impl Label {
    /// Build a label in the requested encoding from a class index.
    pub fn encode(index: usize, num_classes: usize, mode: LabelMode) -> Self {
        match mode {
            LabelMode::Sparse      => Label::Index(index),
            LabelMode::Categorical => Label::one_hot(index, num_classes),
        }
    }

    pub fn one_hot(index: usize, num_classes: usize) -> Self {
        assert!(index < num_classes, "class {index} out of range for {num_classes} classes");
        let mut v = vec![0.0; num_classes];
        v[index] = 1.0;
        Label::OneHot(v)
    }

    /// The class the label points at. For one-hot (or soft) vectors this
    /// is the position of the largest entry.
    pub fn class_index(&self) -> usize {
        match self {
            Label::Index(i) => *i,
            Label::OneHot(v) => v
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                    if p > best.1 { (i, p) } else { best }
                })
                .0,
        }
    }
}

/// One training/evaluation example.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSample {
    pub image: ImageArray,
    pub label: Label,
}

impl ImageSample {
    pub fn new(image: ImageArray, label: Label) -> Self {
        Self { image, label }
    }
}

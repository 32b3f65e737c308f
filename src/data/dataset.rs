use anyhow::{Context, Result};
use burn::data::dataset::{Dataset, InMemDataset};

use crate::data::loader::{load_image, ImageFolder, ImageRecord};
use crate::domain::image::ImageArray;
use crate::domain::label::{ImageSample, Label, LabelMode};
use crate::domain::traits::SampleSource;

/// In-memory arrays (the `X`/`Y` pair of the array-fed pipeline).
pub type ArrayDataset = InMemDataset<ImageSample>;

pub fn array_dataset(samples: Vec<ImageSample>) -> ArrayDataset {
    InMemDataset::new(samples)
}

/// Decode every image of `folder` into memory.
pub fn load_arrays(folder: &ImageFolder, mode: LabelMode) -> Result<Vec<ImageSample>> {
    let samples = folder
        .load_samples(mode)
        .with_context(|| format!("Cannot load images from '{}'", folder.root().display()))?;
    tracing::info!(
        "Loaded {} images of {} classes from '{}'",
        samples.len(),
        folder.num_classes(),
        folder.root().display()
    );
    Ok(samples)
}

/// A folder that is read from disk one image at a time, as the data
/// loader asks for it.
pub struct ImageFolderDataset {
    records:     Vec<ImageRecord>,
    num_classes: usize,
    target_size: (usize, usize),
    mode:        LabelMode,
}

impl ImageFolderDataset {
    pub fn new(folder: &ImageFolder, mode: LabelMode) -> Self {
        Self {
            records:     folder.records().to_vec(),
            num_classes: folder.num_classes(),
            target_size: folder.target_size(),
            mode,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Dataset<ImageSample> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        let record = self.records.get(index)?;
        let label  = Label::encode(record.class_index, self.num_classes, self.mode);

        // Files were probed during the scan, so this only fails if the
        // file changed on disk since. Returning None here would end the
        // epoch early, so substitute a blank image instead.
        let image = load_image(&record.path, self.target_size).unwrap_or_else(|e| {
            tracing::warn!("{e:#}; using a blank image");
            let (h, w) = self.target_size;
            ImageArray::zeros(h, w, 3)
        });
        Some(ImageSample::new(image, label))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::make_folder;

    #[test]
    fn test_lazy_dataset_reads_images() {
        let dir     = make_folder(2);
        let folder  = ImageFolder::scan(dir.path(), (3, 3)).unwrap();
        let dataset = ImageFolderDataset::new(&folder, LabelMode::Sparse);

        assert_eq!(dataset.len(), 4);
        let sample = dataset.get(2).unwrap();
        assert_eq!(sample.label, Label::Index(1));
        assert_eq!(sample.image.shape(), (3, 3, 3));
        // "dog" images are red
        assert_eq!(sample.image.get(0, 0, 0), 200.0);
        assert!(dataset.get(4).is_none());
    }

    #[test]
    fn test_load_arrays_one_hot() {
        let dir     = make_folder(3);
        let folder  = ImageFolder::scan(dir.path(), (4, 4)).unwrap();
        let samples = load_arrays(&folder, LabelMode::Categorical).unwrap();

        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0].label, Label::OneHot(vec![1.0, 0.0]));
        assert_eq!(samples[5].label, Label::OneHot(vec![0.0, 1.0]));
        assert_eq!(array_dataset(samples).len(), 6);
    }

    #[test]
    fn test_file_removed_after_scan_gives_blank_image() {
        let dir     = make_folder(1);
        let folder  = ImageFolder::scan(dir.path(), (2, 2)).unwrap();
        let dataset = ImageFolderDataset::new(&folder, LabelMode::Categorical);
        std::fs::remove_file(&folder.records()[0].path).unwrap();

        let sample = dataset.get(0).unwrap();
        assert!(sample.image.data.iter().all(|&v| v == 0.0));
        assert_eq!(sample.label, Label::OneHot(vec![1.0, 0.0]));
    }
}

// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Scans a directory laid out one sub-directory per class:
//
//   train/
//     cats/  001.jpg 002.jpg ...
//     dogs/  001.png ...
//
// Class indices follow the alphabetical order of the
// sub-directory names, so the same folder always produces the
// same label mapping.
//
// Files are collected recursively inside each class directory
// (symlinks are not followed) when their extension is a known
// image format. The header of every file is probed during the
// scan; files the decoder cannot read are skipped with a
// warning rather than failing the whole run halfway through an
// epoch.
//
// Reference: walkdir crate documentation
//            image crate documentation (open, resize_exact)

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::domain::image::ImageArray;
use crate::domain::label::{ImageSample, Label, LabelMode};
use crate::domain::traits::SampleSource;

/// File extensions recognised as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Which part of a folder to keep when a validation split is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    All,
    Training,
    Validation,
}

/// One image file and the class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path:        PathBuf,
    pub class_index: usize,
}

/// A scanned class-per-directory image folder.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root:        PathBuf,
    class_names: Vec<String>,
    records:     Vec<ImageRecord>,
    /// (height, width) every image is resized to on load
    target_size: (usize, usize),
}

impl ImageFolder {
    /// Scan every image under `root`.
    pub fn scan(root: impl AsRef<Path>, target_size: (usize, usize)) -> Result<Self> {
        Self::scan_subset(root, target_size, 0.0, Subset::All)
    }

    /// Scan `root`, keeping only one side of a per-class validation split.
    ///
    /// Within each class the first `floor(validation_split * n)` files
    /// (in sorted order) are the validation subset and the rest the
    /// training subset.
    pub fn scan_subset(
        root:             impl AsRef<Path>,
        target_size:      (usize, usize),
        validation_split: f64,
        subset:           Subset,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !(0.0..1.0).contains(&validation_split) {
            bail!("validation_split must be in [0, 1), got {validation_split}");
        }
        if !root.is_dir() {
            bail!("Image directory '{}' does not exist", root.display());
        }

        let class_names = list_class_dirs(&root)?;
        if class_names.is_empty() {
            bail!("No class sub-directories found in '{}'", root.display());
        }

        let mut records = Vec::new();
        for (class_index, name) in class_names.iter().enumerate() {
            let files = list_image_files(&root.join(name));
            let split = (validation_split * files.len() as f64) as usize;
            let kept = match subset {
                Subset::All        => &files[..],
                Subset::Validation => &files[..split],
                Subset::Training   => &files[split..],
            };
            tracing::debug!("Class '{}' → index {} ({} files)", name, class_index, kept.len());
            records.extend(kept.iter().map(|path| ImageRecord {
                path: path.clone(),
                class_index,
            }));
        }

        if records.is_empty() {
            bail!("No readable images found under '{}'", root.display());
        }

        tracing::info!(
            "Found {} images belonging to {} classes in '{}'",
            records.len(),
            class_names.len(),
            root.display()
        );

        Ok(Self { root, class_names, records, target_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn target_size(&self) -> (usize, usize) {
        self.target_size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SampleSource for ImageFolder {
    /// Decode every image into memory. Used to turn a folder into the
    /// `X`/`Y` arrays the array-fed pipeline trains on.
    fn load_samples(&self, mode: LabelMode) -> Result<Vec<ImageSample>> {
        let num_classes = self.class_names.len();
        self.records
            .iter()
            .map(|r| {
                let image = load_image(&r.path, self.target_size)?;
                Ok(ImageSample::new(image, Label::encode(r.class_index, num_classes, mode)))
            })
            .collect()
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

/// Decode one image file as RGB and resize it to `(height, width)` with
/// nearest-neighbour sampling. Pixel values stay in 0..255.
pub fn load_image(path: &Path, target_size: (usize, usize)) -> Result<ImageArray> {
    let (height, width) = target_size;
    let img = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?;

    let rgb = img
        .resize_exact(width as u32, height as u32, FilterType::Nearest)
        .to_rgb8();

    // RgbImage's raw buffer is already row-major, channels-last
    let data: Vec<f32> = rgb.as_raw().iter().map(|&b| b as f32).collect();
    Ok(ImageArray::new(height, width, 3, data))
}

/// Sorted names of the immediate sub-directories of `root`.
fn list_class_dirs(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)
        .with_context(|| format!("Cannot read directory '{}'", root.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Every decodable image file below `dir`, in sorted path order.
fn list_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!("Skipping unreadable entry under '{}': {}", dir.display(), err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_image_extension(e.path()))
        .map(|e| e.into_path())
        .filter(|p| match image::image_dimensions(p) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("Skipping '{}': {}", p.display(), err);
                false
            }
        })
        .collect();
    files.sort();
    files
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Write a solid-colour PNG of the given size.
    pub(crate) fn write_png(path: &Path, w: u32, h: u32, colour: [u8; 3]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        RgbImage::from_pixel(w, h, Rgb(colour)).save(path).unwrap();
    }

    /// Two classes ("cat", "dog"), `per_class` images each.
    pub(crate) fn make_folder(per_class: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..per_class {
            write_png(&dir.path().join("dog").join(format!("{i:02}.png")), 8, 6, [200, 10, 10]);
            write_png(&dir.path().join("cat").join(format!("{i:02}.png")), 8, 6, [10, 200, 10]);
        }
        dir
    }

    #[test]
    fn test_classes_sorted_alphabetically() {
        let dir    = make_folder(2);
        let folder = ImageFolder::scan(dir.path(), (4, 4)).unwrap();
        assert_eq!(folder.class_names(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.records()[0].class_index, 0);
        assert_eq!(folder.records()[3].class_index, 1);
    }

    #[test]
    fn test_non_images_are_ignored() {
        let dir = make_folder(1);
        fs::write(dir.path().join("cat").join("notes.txt"), "hello").unwrap();
        // right extension, wrong content
        fs::write(dir.path().join("cat").join("broken.png"), "not a png").unwrap();
        let folder = ImageFolder::scan(dir.path(), (4, 4)).unwrap();
        assert_eq!(folder.len(), 2);
    }

    #[test]
    fn test_nested_files_are_found() {
        let dir = make_folder(1);
        write_png(&dir.path().join("cat").join("deeper").join("x.PNG"), 4, 4, [0, 0, 0]);
        let folder = ImageFolder::scan(dir.path(), (4, 4)).unwrap();
        assert_eq!(folder.len(), 3);
    }

    #[test]
    fn test_validation_split_per_class() {
        let dir   = make_folder(10);
        let train = ImageFolder::scan_subset(dir.path(), (4, 4), 0.2, Subset::Training).unwrap();
        let val   = ImageFolder::scan_subset(dir.path(), (4, 4), 0.2, Subset::Validation).unwrap();
        assert_eq!(train.len(), 16);
        assert_eq!(val.len(), 4);
        // validation takes the first files of each class
        assert!(val.records()[0].path.ends_with("cat/00.png"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(ImageFolder::scan("/definitely/not/here", (4, 4)).is_err());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageFolder::scan(dir.path(), (4, 4)).is_err());
    }

    #[test]
    fn test_load_image_resizes_and_keeps_raw_range() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 10, 7, [255, 128, 0]);
        let img = load_image(&path, (3, 5)).unwrap();
        assert_eq!(img.shape(), (3, 5, 3));
        assert_eq!(img.get(1, 2, 0), 255.0);
        assert_eq!(img.get(1, 2, 1), 128.0);
        assert_eq!(img.get(1, 2, 2), 0.0);
    }

    #[test]
    fn test_load_samples_encodes_labels() {
        let dir     = make_folder(1);
        let folder  = ImageFolder::scan(dir.path(), (4, 4)).unwrap();
        let samples = folder.load_samples(LabelMode::Categorical).unwrap();
        assert_eq!(samples[0].label, Label::OneHot(vec![1.0, 0.0]));
        assert_eq!(samples[1].label, Label::OneHot(vec![0.0, 1.0]));
    }
}

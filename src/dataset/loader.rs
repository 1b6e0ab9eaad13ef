//! ImageNet Dataset Loader
//!
//! Discovers the ImageNet 2012 splits on disk, draws seeded samples from them
//! and checks that the first training example looks like the images the
//! model is calibrated for.

use std::fmt;
use std::path::{Path, PathBuf};

use burn::tensor::TensorData;
use image::{DynamicImage, ImageReader, RgbImage};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{sample_size, IMAGE_EXTENSIONS, TOTAL_TRAIN_SIZE, TOTAL_VALIDATION_SIZE};
use crate::utils::error::{AlexNetError, Result};
use crate::utils::format_number;

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    /// Directory name of the split under the data directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
        }
    }

    /// Nominal number of images in the full split
    pub fn nominal_size(&self) -> usize {
        match self {
            Split::Train => TOTAL_TRAIN_SIZE,
            Split::Validation => TOTAL_VALIDATION_SIZE,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A single image on disk with its class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index (0-999)
    pub label: usize,
    /// WordNet id of the class directory (e.g. "n01440764")
    pub wnid: String,
}

/// One split of the corpus, records are decoded lazily
#[derive(Debug, Clone)]
pub struct ImageNetSplit {
    pub split: Split,
    /// Sorted class directory names, the label is the index
    pub classes: Vec<String>,
    pub records: Vec<ImageRecord>,
}

impl ImageNetSplit {
    /// Discover `<data_dir>/<split>/<wnid>/<image>` records.
    ///
    /// Class directories are sorted lexicographically and labelled by their
    /// position.
    pub fn discover<P: AsRef<Path>>(data_dir: P, split: Split) -> Result<Self> {
        let split_dir = split_dir(data_dir.as_ref(), split)?;
        let classes = class_dirs(&split_dir)?;
        Self::collect(&split_dir, split, classes)
    }

    /// Discover a split whose class directories must all appear in
    /// `classes`. Used for validation so labels agree with training.
    pub fn discover_with_classes<P: AsRef<Path>>(
        data_dir: P,
        split: Split,
        classes: &[String],
    ) -> Result<Self> {
        let split_dir = split_dir(data_dir.as_ref(), split)?;

        for wnid in class_dirs(&split_dir)? {
            if classes.binary_search(&wnid).is_err() {
                return Err(AlexNetError::Dataset(format!(
                    "class '{}' in {} split has no training counterpart",
                    wnid, split
                )));
            }
        }

        Self::collect(&split_dir, split, classes.to_vec())
    }

    fn collect(split_dir: &Path, split: Split, classes: Vec<String>) -> Result<Self> {
        let mut records = Vec::new();

        for (label, wnid) in classes.iter().enumerate() {
            let class_dir = split_dir.join(wnid);
            if !class_dir.is_dir() {
                continue;
            }

            let before = records.len();
            let mut files: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            files.sort();

            records.extend(files.into_iter().map(|path| ImageRecord {
                path,
                label,
                wnid: wnid.clone(),
            }));

            debug!("{} class '{}' (label {}): {} images", split, wnid, label, records.len() - before);
        }

        info!(
            "Discovered {} {} images in {} classes",
            format_number(records.len()),
            split,
            classes.len()
        );

        Ok(Self {
            split,
            classes,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Shuffle with `seed` and keep the first `size` records
    pub fn sample(&self, size: usize, seed: u64) -> Self {
        let mut records = self.records.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        records.shuffle(&mut rng);
        records.truncate(size);

        Self {
            split: self.split,
            classes: self.classes.clone(),
            records,
        }
    }

    /// Decode the first record of the split
    pub fn first_image(&self) -> Result<DynamicImage> {
        let record = self.records.first().ok_or_else(|| {
            AlexNetError::Dataset(format!("{} split contains no images", self.split))
        })?;
        open_image(&record.path)
    }
}

fn split_dir(data_dir: &Path, split: Split) -> Result<PathBuf> {
    let dir = data_dir.join(split.dir_name());
    if !dir.is_dir() {
        return Err(AlexNetError::PathNotFound(dir));
    }
    Ok(dir)
}

fn class_dirs(split_dir: &Path) -> Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(split_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();
    Ok(classes)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Open and decode an image file
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| AlexNetError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| AlexNetError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| AlexNetError::ImageLoad(path.to_path_buf(), e.to_string()))
}

/// Open an image file as 8-bit RGB
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    Ok(open_image(path)?.to_rgb8())
}

/// Raw pixels of an image as an `[height, width, channels]` tensor with the
/// native channel count and sample values of the decoded buffer.
pub fn native_tensor_data(image: &DynamicImage) -> TensorData {
    let (h, w) = (image.height() as usize, image.width() as usize);
    match image {
        DynamicImage::ImageLuma8(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 1]),
        DynamicImage::ImageLumaA8(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 2]),
        DynamicImage::ImageRgb8(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 3]),
        DynamicImage::ImageRgba8(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 4]),
        DynamicImage::ImageLuma16(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 1]),
        DynamicImage::ImageLumaA16(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 2]),
        DynamicImage::ImageRgb16(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 3]),
        DynamicImage::ImageRgba16(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 4]),
        DynamicImage::ImageRgb32F(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 3]),
        DynamicImage::ImageRgba32F(buf) => TensorData::new(buf.as_raw().clone(), [h, w, 4]),
        other => {
            let channels = other.color().channel_count() as usize;
            let rgba = other.to_rgba32f().into_raw();
            let samples = rgba
                .chunks(4)
                .flat_map(|px| px[..channels.min(4)].to_vec())
                .collect::<Vec<f32>>();
            TensorData::new(samples, [h, w, channels.min(4)])
        }
    }
}

/// Accept an image tensor only if it is `(height, width, 3)` with pixel
/// values spanning exactly `[0, 255]`.
pub fn check_image_assumptions(data: &TensorData) -> Result<()> {
    let shape = &data.shape;
    if shape.len() != 3 {
        return Err(AlexNetError::InputAssumption(format!(
            "expected 3 dimensions (height, width, channels), got {}",
            shape.len()
        )));
    }
    if shape[2] != 3 {
        return Err(AlexNetError::InputAssumption(format!(
            "expected 3 color channels, got {}",
            shape[2]
        )));
    }

    let (min, max) = data
        .iter::<f32>()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if min != 0.0 {
        return Err(AlexNetError::InputAssumption(format!(
            "expected minimum pixel value 0, got {}",
            min
        )));
    }
    if max != 255.0 {
        return Err(AlexNetError::InputAssumption(format!(
            "expected maximum pixel value 255, got {}",
            max
        )));
    }

    Ok(())
}

/// Both splits of the corpus
#[derive(Debug, Clone)]
pub struct Data {
    pub train: ImageNetSplit,
    pub validation: ImageNetSplit,
}

impl Data {
    /// Discover both splits and check the first training example
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        info!("Loading ImageNet 2012 from: {:?}", data_dir);

        let train = ImageNetSplit::discover(data_dir, Split::Train)?;
        let validation =
            ImageNetSplit::discover_with_classes(data_dir, Split::Validation, &train.classes)?;

        if train.num_classes() != super::NUM_CLASSES {
            warn!(
                "Expected {} classes, found {}",
                super::NUM_CLASSES,
                train.num_classes()
            );
        }

        let data = Self { train, validation };
        data.test_assumptions_of_the_input()?;
        Ok(data)
    }

    /// Check the first training example
    pub fn test_assumptions_of_the_input(&self) -> Result<()> {
        let image = self.train.first_image()?;
        check_image_assumptions(&native_tensor_data(&image))?;
        debug!("First training example satisfies the input assumptions");
        Ok(())
    }

    /// Seeded samples of both splits.
    ///
    /// `floor(fraction * nominal)` records per split, or a single record each
    /// with `only_one`.
    pub fn sample(
        &self,
        sample_fraction: f64,
        only_one: bool,
        seed: u64,
    ) -> Result<(ImageNetSplit, ImageNetSplit)> {
        if !(sample_fraction > 0.0 && sample_fraction <= 1.0) {
            return Err(AlexNetError::InvalidInput(format!(
                "sample fraction must be in (0, 1], got {}",
                sample_fraction
            )));
        }

        let (train_size, validation_size) = if only_one {
            (1.min(self.train.len()), 1.min(self.validation.len()))
        } else {
            (
                sample_size(sample_fraction, self.train.split.nominal_size(), self.train.len()),
                sample_size(
                    sample_fraction,
                    self.validation.split.nominal_size(),
                    self.validation.len(),
                ),
            )
        };

        info!(
            "Training on {} examples, validating on {}",
            format_number(train_size),
            format_number(validation_size)
        );

        Ok((
            self.train.sample(train_size, seed),
            self.validation.sample(validation_size, seed),
        ))
    }
}

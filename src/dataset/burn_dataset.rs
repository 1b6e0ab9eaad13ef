//! Burn Dataset Integration for ImageNet
//!
//! `ImageNetDataset` decodes images lazily on `get`, `ImageNetBatcher` runs
//! the preprocessing pipeline per item and stacks the result, and
//! `create_generator` wires both into a multi-worker Burn data loader.

use std::path::PathBuf;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::RgbImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::warn;

use super::augmentation::Preprocessor;
use super::loader::{load_rgb, ImageNetSplit, ImageRecord};

/// A decoded image and its label
#[derive(Clone)]
pub struct ImageNetItem {
    /// Raw 8-bit RGB pixels, any size
    pub image: RgbImage,
    /// Class label (0-999)
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

impl std::fmt::Debug for ImageNetItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageNetItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Lazily decoding dataset over a list of image records
#[derive(Debug, Clone)]
pub struct ImageNetDataset {
    records: Vec<ImageRecord>,
}

impl ImageNetDataset {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    pub fn from_split(split: &ImageNetSplit) -> Self {
        Self::new(split.records.clone())
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    fn decode(&self, index: usize) -> Option<ImageNetItem> {
        let record = &self.records[index];
        match load_rgb(&record.path) {
            Ok(image) => Some(ImageNetItem {
                image,
                label: record.label,
                path: record.path.clone(),
            }),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }
}

impl Dataset<ImageNetItem> for ImageNetDataset {
    /// Decode record `index`.
    ///
    /// The data loader ends an epoch at the first `None`, so an unreadable
    /// file is replaced by the next readable record (wrapping around).
    fn get(&self, index: usize) -> Option<ImageNetItem> {
        let len = self.records.len();
        if index >= len {
            return None;
        }

        (0..len).find_map(|offset| self.decode((index + offset) % len))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// A batch of preprocessed images
#[derive(Clone, Debug)]
pub struct ImageNetBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher running the training or evaluation pipeline on each item
#[derive(Clone, Debug)]
pub struct ImageNetBatcher {
    preprocessor: Preprocessor,
}

impl ImageNetBatcher {
    pub fn new(preprocessor: Preprocessor) -> Self {
        Self { preprocessor }
    }

    pub fn training() -> Self {
        Self::new(Preprocessor::training())
    }

    pub fn evaluation() -> Self {
        Self::new(Preprocessor::evaluation())
    }
}

impl<B: Backend> Batcher<B, ImageNetItem, ImageNetBatch<B>> for ImageNetBatcher {
    fn batch(&self, items: Vec<ImageNetItem>, device: &B::Device) -> ImageNetBatch<B> {
        let batch_size = items.len();
        let size = self.preprocessor.image_size() as usize;

        // One RNG per item so the parallel pipeline stays lock free
        let seeds: Vec<u64> = (0..batch_size).map(|_| rand::random::<u64>()).collect();

        let images_data: Vec<f32> = items
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(item, seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                self.preprocessor.process(&item.image, &mut rng)
            })
            .collect::<Vec<Vec<f32>>>()
            .concat();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageNetBatch { images, targets }
    }
}

/// Build a shuffled, prefetching loader over `dataset`.
///
/// Training generators augment every image; the loader reshuffles with
/// `seed` each pass. A `batch_size` of 0 or 1 yields batches of one image.
pub fn create_generator<B: Backend>(
    dataset: ImageNetDataset,
    for_training: bool,
    batch_size: usize,
    seed: u64,
    num_workers: usize,
) -> Arc<dyn DataLoader<B, ImageNetBatch<B>>> {
    let preprocessor = if for_training {
        Preprocessor::training()
    } else {
        Preprocessor::evaluation()
    };
    create_generator_with(dataset, preprocessor, batch_size, seed, num_workers)
}

/// [`create_generator`] with an explicit preprocessing pipeline
pub fn create_generator_with<B: Backend>(
    dataset: ImageNetDataset,
    preprocessor: Preprocessor,
    batch_size: usize,
    seed: u64,
    num_workers: usize,
) -> Arc<dyn DataLoader<B, ImageNetBatch<B>>> {
    DataLoaderBuilder::new(ImageNetBatcher::new(preprocessor))
        .batch_size(batch_size.max(1))
        .shuffle(seed)
        .num_workers(num_workers.max(1))
        .build(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::Rgb;
    use tempfile::TempDir;

    use crate::dataset::augmentation::AugmentationConfig;

    type TestBackend = NdArray<f32>;

    fn write_image(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(10, 8, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn record(path: PathBuf, label: usize) -> ImageRecord {
        ImageRecord {
            path,
            label,
            wnid: format!("n{:08}", label),
        }
    }

    #[test]
    fn test_dataset_get() {
        let tmp = TempDir::new().unwrap();
        let ds = ImageNetDataset::new(vec![
            record(write_image(tmp.path(), "a.png"), 3),
            record(write_image(tmp.path(), "b.png"), 7),
        ]);

        assert_eq!(ds.len(), 2);
        let item = ds.get(1).unwrap();
        assert_eq!(item.label, 7);
        assert_eq!(item.image.dimensions(), (10, 8));
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_dataset_replaces_unreadable_record() {
        let tmp = TempDir::new().unwrap();
        let broken = tmp.path().join("broken.png");
        std::fs::write(&broken, b"definitely not a png").unwrap();

        let ds = ImageNetDataset::new(vec![
            record(broken, 0),
            record(write_image(tmp.path(), "ok.png"), 5),
        ]);

        assert_eq!(ds.get(0).unwrap().label, 5);
    }

    #[test]
    fn test_batcher_shapes() {
        let tmp = TempDir::new().unwrap();
        let ds = ImageNetDataset::new(vec![
            record(write_image(tmp.path(), "a.png"), 1),
            record(write_image(tmp.path(), "b.png"), 2),
        ]);
        let items: Vec<_> = (0..2).filter_map(|i| ds.get(i)).collect();

        let batcher = ImageNetBatcher::new(Preprocessor::new(
            AugmentationConfig::new().with_image_size(12),
            true,
        ));
        let device = Default::default();
        let batch: ImageNetBatch<TestBackend> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 12, 12]);
        assert_eq!(batch.targets.dims(), [2]);

        let max = batch.images.clone().max().into_scalar();
        let min = batch.images.min().into_scalar();
        assert!(max <= 0.5 && min >= -0.5);
    }
}

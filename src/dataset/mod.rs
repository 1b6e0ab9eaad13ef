//! Dataset module for ImageNet 2012 data handling
//!
//! This module provides functionality for:
//! - Discovering the ImageNet corpus on disk and sampling a fraction of it
//! - Validating the input assumptions the model is calibrated for
//! - Fetching the label-id to human-readable name mapping
//! - Normalization and augmentation of training images
//! - Burn `Dataset` / `Batcher` integration
//!
//! ## Expected layout
//!
//! ```text
//! data_dir/
//! ├── train/
//! │   ├── n01440764/
//! │   │   ├── n01440764_10026.JPEG
//! │   │   └── ...
//! │   └── ...
//! └── validation/
//!     ├── n01440764/
//!     └── ...
//! ```

pub mod augmentation;
pub mod burn_dataset;
pub mod labels;
pub mod loader;

pub use augmentation::{AugmentationConfig, Preprocessor};
pub use burn_dataset::{
    create_generator, create_generator_with, ImageNetBatch, ImageNetBatcher, ImageNetDataset,
    ImageNetItem,
};
pub use labels::{load_labelid_to_names, LabelMap};
pub use loader::{check_image_assumptions, Data, ImageRecord, ImageNetSplit, Split};

/// Number of ImageNet 2012 classes
pub const NUM_CLASSES: usize = 1000;

/// Nominal size of the training split (counting it would take ages)
pub const TOTAL_TRAIN_SIZE: usize = 1_200_000;

/// Nominal size of the validation split
pub const TOTAL_VALIDATION_SIZE: usize = 150_000;

/// Default batch size for the generators
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Number of records to draw for a sample fraction.
///
/// `floor(fraction * nominal_total)`, capped at what is actually on disk.
pub fn sample_size(fraction: f64, nominal_total: usize, available: usize) -> usize {
    let wanted = (fraction * nominal_total as f64).floor() as usize;
    wanted.min(available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size_tenth() {
        assert_eq!(sample_size(0.1, TOTAL_TRAIN_SIZE, usize::MAX), 120_000);
        assert_eq!(sample_size(0.1, TOTAL_VALIDATION_SIZE, usize::MAX), 15_000);
    }

    #[test]
    fn test_sample_size_capped_by_available() {
        assert_eq!(sample_size(1.0, TOTAL_TRAIN_SIZE, 42), 42);
    }

    #[test]
    fn test_sample_size_floors() {
        assert_eq!(sample_size(0.000_001, TOTAL_VALIDATION_SIZE, usize::MAX), 0);
        assert_eq!(sample_size(0.000_01, TOTAL_VALIDATION_SIZE, usize::MAX), 1);
    }
}

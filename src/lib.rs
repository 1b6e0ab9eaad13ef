//! # AlexNet on ImageNet
//!
//! A Rust library for training and running the AlexNet convolutional network
//! on ImageNet 2012 using the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Directory discovery, input validation, augmentation and data loaders
//! - `model`: AlexNet architecture, hyper-parameters and save/load
//! - `training`: SGD training driver and learning rate schedule
//! - `inference`: Prediction on image files, including ten-crop averaging
//! - `utils`: Errors, logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alexnet_imagenet::backend::TrainingBackend;
//! use alexnet_imagenet::{AlexNetConfig, Trainer, TrainingConfig};
//!
//! let mut trainer: Trainer<TrainingBackend> =
//!     Trainer::new("data/imagenet2012", AlexNetConfig::new(), TrainingConfig::new());
//! trainer.load_data(0.1, false)?;
//! trainer.create_generator(128)?;
//! trainer.build_model()?;
//! trainer.train(5)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    create_generator, Data, ImageNetBatch, ImageNetBatcher, ImageNetDataset, ImageNetItem,
    ImageNetSplit, LabelMap, Preprocessor, Split,
};
pub use inference::{PredictionResult, Predictor};
pub use model::{AlexNet, AlexNetConfig};
pub use training::{Trainer, TrainingConfig};
pub use utils::error::{AlexNetError, Result};
pub use utils::metrics::{EpochMetrics, TopKAccuracy};

/// ImageNet 2012 classes
pub const NUM_CLASSES: usize = dataset::NUM_CLASSES;

/// Side of the square network input
pub const IMAGE_SIZE: usize = 224;

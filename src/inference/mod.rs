//! Inference module for model prediction
//!
//! - Batched prediction on image files
//! - Ten-crop test-time averaging

pub mod predictor;
pub mod ten_crop;

pub use predictor::{predict, PredictionResult, Predictor, DEFAULT_TOP_K};
pub use ten_crop::{ten_crop_inputs, TEN_CROP_RESIZE};

//! Inference Predictor Module
//!
//! Runs a trained AlexNet on image files. Files are decoded and preprocessed
//! in parallel, then pushed through the network in batches.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ten_crop::ten_crop_inputs;
use crate::dataset::augmentation::{to_chw, AugmentationConfig, Preprocessor};
use crate::dataset::labels::LabelMap;
use crate::dataset::loader::load_rgb;
use crate::dataset::DEFAULT_BATCH_SIZE;
use crate::model::{self, AlexNet, AlexNetConfig};
use crate::utils::error::{AlexNetError, Result};
use crate::utils::metrics::top_k_indices;

/// Number of alternatives reported per prediction
pub const DEFAULT_TOP_K: usize = 5;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub predicted_class: usize,

    /// Human readable name, or the index when no label map is loaded
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Best classes with their probabilities, best first
    pub top_k: Vec<(usize, String, f32)>,

    /// Inference time in milliseconds (shared evenly across a batch)
    pub inference_time_ms: f64,
}

impl PredictionResult {
    pub fn new(
        probabilities: &[f32],
        labels: Option<&LabelMap>,
        k: usize,
        image_path: Option<PathBuf>,
        inference_time_ms: f64,
    ) -> Self {
        let name = |idx: usize| match labels {
            Some(map) => map.display_name(idx),
            None => idx.to_string(),
        };

        let top_k: Vec<(usize, String, f32)> = top_k_indices(probabilities, k.max(1))
            .into_iter()
            .map(|idx| (idx, name(idx), probabilities[idx]))
            .collect();

        let (predicted_class, class_name, confidence) = top_k
            .first()
            .cloned()
            .unwrap_or((0, name(0), 0.0));

        Self {
            image_path,
            predicted_class,
            class_name,
            confidence,
            top_k,
            inference_time_ms,
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }

        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.predicted_class
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));

        output.push_str(&format!("Top-{} predictions:\n", self.top_k.len()));
        for (i, (idx, name, prob)) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                name,
                idx,
                prob * 100.0
            ));
        }

        output
    }
}

/// Split a flat `[n, num_classes]` probability buffer into per-image results
pub(crate) fn rows_to_results(
    probabilities: &[f32],
    num_classes: usize,
    labels: Option<&LabelMap>,
    k: usize,
    paths: &[Option<PathBuf>],
    elapsed_ms: f64,
) -> Vec<PredictionResult> {
    let per_image = elapsed_ms / paths.len().max(1) as f64;
    probabilities
        .chunks(num_classes)
        .zip(paths.iter())
        .map(|(row, path)| PredictionResult::new(row, labels, k, path.clone(), per_image))
        .collect()
}

/// Softmax probabilities of `model` for a batch of preprocessed images
pub fn predict<B: Backend>(model: &AlexNet<B>, images: Tensor<B, 4>) -> Tensor<B, 2> {
    model.forward_softmax(images)
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend> {
    model: AlexNet<B>,
    config: AlexNetConfig,
    preprocessor: Preprocessor,
    labels: Option<LabelMap>,
    top_k: usize,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: AlexNet<B>, config: AlexNetConfig, device: B::Device) -> Self {
        let preprocessor = Preprocessor::new(
            AugmentationConfig::new().with_image_size(config.input_size as u32),
            false,
        );

        Self {
            model,
            config,
            preprocessor,
            labels: None,
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            device,
        }
    }

    /// Load a model saved under `path` (see [`model::save`])
    pub fn load<P: AsRef<Path>>(path: P, device: B::Device) -> Result<Self> {
        let (model, config) = model::load::<B, _>(path, &device)?;
        Ok(Self::new(model, config, device))
    }

    pub fn with_labels(mut self, labels: Option<LabelMap>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn config(&self) -> &AlexNetConfig {
        &self.config
    }

    /// Class probabilities for preprocessed images `[N, 3, H, W]`
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        predict(&self.model, images)
    }

    fn stack(&self, inputs: Vec<Vec<f32>>, side: usize) -> Tensor<B, 4> {
        let n = inputs.len();
        Tensor::<B, 4>::from_floats(
            TensorData::new(inputs.concat(), [n, 3, side, side]),
            &self.device,
        )
    }

    /// Predict on multiple image files
    pub fn predict_files(&self, paths: &[PathBuf]) -> Result<Vec<PredictionResult>> {
        let side = self.preprocessor.image_size();
        let num_classes = self.model.num_classes();
        let preprocessor = &self.preprocessor;
        let mut results = Vec::with_capacity(paths.len());

        for chunk in paths.chunks(self.batch_size) {
            let inputs: Vec<Vec<f32>> = chunk
                .par_iter()
                .map(|path| Ok(to_chw(&preprocessor.evaluate(&load_rgb(path)?))))
                .collect::<Result<_>>()?;

            let start = Instant::now();
            let probs = self.predict(self.stack(inputs, side as usize));
            let probs: Vec<f32> = probs.into_data().iter::<f32>().collect();
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            let chunk_paths: Vec<Option<PathBuf>> = chunk.iter().cloned().map(Some).collect();
            results.extend(rows_to_results(
                &probs,
                num_classes,
                self.labels.as_ref(),
                self.top_k,
                &chunk_paths,
                elapsed_ms,
            ));
            debug!("Predicted {} images in {:.1} ms", chunk.len(), elapsed_ms);
        }

        Ok(results)
    }

    /// Predict on a single image file
    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult> {
        self.predict_files(&[path.to_path_buf()])?
            .pop()
            .ok_or_else(|| AlexNetError::InvalidInput(format!("no prediction for {:?}", path)))
    }

    /// Average the softmax over ten crops of the image
    pub fn predict_ten_crop(&self, path: &Path) -> Result<PredictionResult> {
        let side = self.preprocessor.image_size();
        let inputs = ten_crop_inputs(&load_rgb(path)?, side);

        let start = Instant::now();
        let probs = self
            .predict(self.stack(inputs, side as usize))
            .mean_dim(0);
        let probs: Vec<f32> = probs.into_data().iter::<f32>().collect();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(PredictionResult::new(
            &probs,
            self.labels.as_ref(),
            self.top_k,
            Some(path.to_path_buf()),
            elapsed_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn tiny_predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let config = AlexNetConfig::new()
            .with_num_classes(4)
            .with_input_size(163)
            .with_conv_filters([2, 4, 4, 4, 4])
            .with_hidden_units(8);
        let model = config.init::<TestBackend>(&device);
        Predictor::new(model, config, device)
    }

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(200, 180, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_prediction_result_top_k() {
        let labels = LabelMap::new(BTreeMap::from([(2, "goldfish".to_string())]));
        let result = PredictionResult::new(&[0.1, 0.2, 0.6, 0.1], Some(&labels), 2, None, 0.0);

        assert_eq!(result.predicted_class, 2);
        assert_eq!(result.class_name, "goldfish");
        assert!((result.confidence - 0.6).abs() < 1e-6);
        assert_eq!(result.top_k.len(), 2);
        assert_eq!(result.top_k[1].0, 1);
        assert_eq!(result.top_k[1].1, "1");
    }

    #[test]
    fn test_display_mentions_class() {
        let result = PredictionResult::new(&[0.3, 0.7], None, 2, None, 0.0);
        let text = result.display();
        assert!(text.contains("class 1"));
        assert!(text.contains("70.00%"));
    }

    #[test]
    fn test_predict_files() {
        let tmp = TempDir::new().unwrap();
        let paths = vec![write_image(tmp.path(), "a.png"), write_image(tmp.path(), "b.png")];
        let predictor = tiny_predictor().with_batch_size(1).with_top_k(3);

        let results = predictor.predict_files(&paths).unwrap();
        assert_eq!(results.len(), 2);
        for (result, path) in results.iter().zip(paths.iter()) {
            assert_eq!(result.image_path.as_ref(), Some(path));
            assert_eq!(result.top_k.len(), 3);
            assert!(result.predicted_class < 4);
        }
    }

    #[test]
    fn test_predict_missing_file() {
        let predictor = tiny_predictor();
        assert!(predictor.predict_file(Path::new("/no/such/image.png")).is_err());
    }

    #[test]
    fn test_ten_crop_probabilities_sum_to_one() {
        let tmp = TempDir::new().unwrap();
        let path = write_image(tmp.path(), "a.png");
        let predictor = tiny_predictor().with_top_k(4);

        let result = predictor.predict_ten_crop(&path).unwrap();
        let total: f32 = result.top_k.iter().map(|(_, _, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}

//! Model module for the AlexNet architecture using the Burn framework
//!
//! - Layer stack and initialization (`alexnet`)
//! - Architecture and optimizer hyperparameters (`config`)
//! - Saving to and restoring from `<path>/alexnet/<version>/`

pub mod alexnet;
pub mod config;

use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::info;

pub use alexnet::AlexNet;
pub use config::{AlexNetConfig, TrainingConfig};

use crate::utils::error::{AlexNetError, Result};

/// Directory name of saved models
pub const MODEL_NAME: &str = "alexnet";

/// Version subdirectory written by `save`
pub const MODEL_VERSION: u32 = 1;

/// Weights file stem; the recorder appends `.mpk`
const WEIGHTS_FILE: &str = "model";
const CONFIG_FILE: &str = "config.json";

/// `<path>/alexnet/1`
pub fn model_dir<P: AsRef<Path>>(path: P) -> PathBuf {
    path.as_ref()
        .join(MODEL_NAME)
        .join(MODEL_VERSION.to_string())
}

/// Write weights and architecture config, returning the model directory
pub fn save<B: Backend, P: AsRef<Path>>(
    model: &AlexNet<B>,
    config: &AlexNetConfig,
    path: P,
) -> Result<PathBuf> {
    let dir = model_dir(path);
    std::fs::create_dir_all(&dir)?;

    config.save(dir.join(CONFIG_FILE))?;
    model
        .clone()
        .save_file(dir.join(WEIGHTS_FILE), &CompactRecorder::new())
        .map_err(|e| AlexNetError::Model(format!("failed to save weights: {}", e)))?;

    info!("Saved model to {:?}", dir);
    Ok(dir)
}

/// Restore a model written by [`save`].
///
/// `path` may be either the save root or the versioned model directory.
pub fn load<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<(AlexNet<B>, AlexNetConfig)> {
    let path = path.as_ref();
    let dir = if path.join(CONFIG_FILE).is_file() {
        path.to_path_buf()
    } else {
        model_dir(path)
    };

    let config_path = dir.join(CONFIG_FILE);
    if !config_path.is_file() {
        return Err(AlexNetError::PathNotFound(config_path));
    }

    let config = AlexNetConfig::load(&config_path)
        .map_err(|e| AlexNetError::Config(format!("failed to read {:?}: {}", config_path, e)))?;
    config.validate()?;

    let model = config
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_FILE), &CompactRecorder::new(), device)
        .map_err(|e| AlexNetError::Model(format!("failed to load weights: {}", e)))?;

    info!("Loaded model from {:?}", dir);
    Ok((model, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> AlexNetConfig {
        AlexNetConfig::new()
            .with_num_classes(5)
            .with_input_size(163)
            .with_conv_filters([2, 4, 4, 4, 4])
            .with_hidden_units(8)
    }

    #[test]
    fn test_model_dir_layout() {
        assert_eq!(model_dir("/tmp/out"), PathBuf::from("/tmp/out/alexnet/1"));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let dir = save(&model, &config, tmp.path()).unwrap();
        assert!(dir.join("config.json").is_file());
        assert!(dir.join("model.mpk").is_file());

        let (loaded, loaded_config) = load::<TestBackend, _>(tmp.path(), &device).unwrap();
        assert_eq!(loaded_config.num_classes, 5);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 163, 163], &device);
        let a: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(input).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_load_missing_model() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let result = load::<TestBackend, _>(tmp.path(), &device);
        assert!(matches!(result, Err(AlexNetError::PathNotFound(_))));
    }
}

//! Model Configuration Module
//!
//! Architecture and optimizer hyperparameters. Both are Burn `Config`s so
//! they serialize to JSON next to the saved weights.

use burn::config::Config;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::SgdConfig;

use crate::utils::error::AlexNetError;

/// Kernel size and stride of the five convolutions
pub const CONV_KERNELS: [(usize, usize); 5] = [(11, 4), (5, 1), (3, 1), (3, 1), (3, 1)];

/// Max pooling window and stride, applied after conv1 and conv2
pub const POOL_KERNEL: usize = 3;
pub const POOL_STRIDE: usize = 2;

/// Configuration for the AlexNet architecture
#[derive(Config, Debug)]
pub struct AlexNetConfig {
    /// Number of output classes
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "224")]
    pub input_size: usize,

    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of conv1..conv5
    #[config(default = "[96, 256, 384, 384, 256]")]
    pub conv_filters: [usize; 5],

    /// Units of the two hidden dense layers
    #[config(default = "4096")]
    pub hidden_units: usize,

    #[config(default = "0.5")]
    pub dropout: f64,

    /// Standard deviation of the normal kernel initializer
    #[config(default = "0.01")]
    pub init_std: f64,

    /// Bias of conv2, conv4 and conv5. The paper uses 1.0, which makes the
    /// initial loss explode.
    #[config(default = "0.1")]
    pub positive_bias: f32,
}

fn valid_output(size: usize, kernel: usize, stride: usize) -> Option<usize> {
    size.checked_sub(kernel).map(|s| s / stride + 1)
}

impl AlexNetConfig {
    /// Spatial side of the conv5 feature map, `None` if the input is too
    /// small for the valid-padded stack.
    pub fn feature_map_size(&self) -> Option<usize> {
        let mut size = self.input_size;
        for (i, &(kernel, stride)) in CONV_KERNELS.iter().enumerate() {
            size = valid_output(size, kernel, stride)?;
            if i < 2 {
                size = valid_output(size, POOL_KERNEL, POOL_STRIDE)?;
            }
        }
        Some(size)
    }

    /// Number of inputs of fc6 (4 * 4 * 256 = 4096 for the default config)
    pub fn flatten_size(&self) -> usize {
        let side = self.feature_map_size().unwrap_or(0);
        side * side * self.conv_filters[4]
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(AlexNetError::Config("num_classes must be greater than 0".into()));
        }
        if self.in_channels == 0 || self.hidden_units == 0 {
            return Err(AlexNetError::Config(
                "in_channels and hidden_units must be greater than 0".into(),
            ));
        }
        if self.conv_filters.contains(&0) {
            return Err(AlexNetError::Config("conv_filters must all be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(AlexNetError::Config("dropout must be in range [0.0, 1.0)".into()));
        }
        if self.init_std <= 0.0 {
            return Err(AlexNetError::Config("init_std must be positive".into()));
        }
        match self.feature_map_size() {
            Some(side) if side > 0 => Ok(()),
            _ => Err(AlexNetError::Config(format!(
                "input_size {} is too small for AlexNet",
                self.input_size
            ))),
        }
    }
}

/// Optimizer and training loop settings
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "5")]
    pub epochs: usize,

    #[config(default = "128")]
    pub batch_size: usize,

    #[config(default = "0.001")]
    pub learning_rate: f64,

    #[config(default = "0.9")]
    pub momentum: f64,

    /// L2 penalty, the paper uses 0.0005
    #[config(default = "None")]
    pub weight_decay: Option<f64>,

    /// Reduce the learning rate when validation top-1 has not improved for
    /// this many epochs
    #[config(default = "None")]
    pub plateau_patience: Option<usize>,

    #[config(default = "0.1")]
    pub plateau_factor: f64,

    #[config(default = "1e-6")]
    pub min_learning_rate: f64,

    /// k of the top-k accuracy metric
    #[config(default = "10")]
    pub top_k: usize,

    #[config(default = "42")]
    pub seed: u64,

    #[config(default = "4")]
    pub num_workers: usize,
}

impl TrainingConfig {
    /// SGD with classical (undampened) momentum
    pub fn optimizer(&self) -> SgdConfig {
        let momentum = MomentumConfig::new()
            .with_momentum(self.momentum)
            .with_dampening(0.0);

        SgdConfig::new()
            .with_momentum(Some(momentum))
            .with_weight_decay(self.weight_decay.map(|p| WeightDecayConfig::new(p as f32)))
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(AlexNetError::Config("learning_rate must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(AlexNetError::Config("momentum must be in range [0.0, 1.0)".into()));
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return Err(AlexNetError::Config("plateau_factor must be in range (0.0, 1.0)".into()));
        }
        if self.top_k == 0 {
            return Err(AlexNetError::Config("top_k must be greater than 0".into()));
        }
        Ok(())
    }
}

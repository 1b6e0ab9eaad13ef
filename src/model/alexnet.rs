//! AlexNet Architecture
//!
//! Five valid-padded convolutions, the first two followed by overlapping max
//! pooling, then three dense layers with dropout in front of the first two.
//!
//! ```text
//! [N, 3, 224, 224]
//!   conv1 96 11x11/4 -> relu -> pool 3/2   [N, 96, 26, 26]
//!   conv2 256 5x5    -> relu -> pool 3/2   [N, 256, 10, 10]
//!   conv3 384 3x3    -> relu               [N, 384, 8, 8]
//!   conv4 384 3x3    -> relu               [N, 384, 6, 6]
//!   conv5 256 3x3    -> relu               [N, 256, 4, 4]
//!   flatten -> dropout                     [N, 4096]
//!   fc6 4096 -> relu -> dropout
//!   fc7 4096 -> relu
//!   fc8 1000
//! ```

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::config::{AlexNetConfig, CONV_KERNELS, POOL_KERNEL, POOL_STRIDE};

fn normal(std: f64) -> Initializer {
    Initializer::Normal { mean: 0.0, std }
}

/// Valid-padded convolution with N(0, std) kernels and a constant bias
pub fn conv_layer<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    std: f64,
    bias: f32,
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Valid)
        .with_initializer(normal(std))
        .init(device);

    conv.bias = Some(Param::from_tensor(Tensor::full([channels[1]], bias, device)));
    conv
}

/// Dense layer with N(0, std) weights and zero bias
pub fn dense_layer<B: Backend>(
    d_input: usize,
    d_output: usize,
    std: f64,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(normal(std))
        .init(device);

    linear.bias = Some(Param::from_tensor(Tensor::zeros([d_output], device)));
    linear
}

#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,
    pub pool: MaxPool2d,

    pub fc6: Linear<B>,
    pub fc7: Linear<B>,
    pub fc8: Linear<B>,

    pub dropout: Dropout,
    pub relu: Relu,
}

impl AlexNetConfig {
    /// Initialize a freshly weighted model
    pub fn init<B: Backend>(&self, device: &B::Device) -> AlexNet<B> {
        AlexNet::new(self, device)
    }
}

impl<B: Backend> AlexNet<B> {
    pub fn new(config: &AlexNetConfig, device: &B::Device) -> Self {
        let [f1, f2, f3, f4, f5] = config.conv_filters;
        let std = config.init_std;
        let one = config.positive_bias;
        let k = CONV_KERNELS;

        let conv1 = conv_layer([config.in_channels, f1], k[0].0, k[0].1, std, 0.0, device);
        let conv2 = conv_layer([f1, f2], k[1].0, k[1].1, std, one, device);
        let conv3 = conv_layer([f2, f3], k[2].0, k[2].1, std, 0.0, device);
        let conv4 = conv_layer([f3, f4], k[3].0, k[3].1, std, one, device);
        let conv5 = conv_layer([f4, f5], k[4].0, k[4].1, std, one, device);

        let pool = MaxPool2dConfig::new([POOL_KERNEL, POOL_KERNEL])
            .with_strides([POOL_STRIDE, POOL_STRIDE])
            .init();

        let hidden = config.hidden_units;
        let fc6 = dense_layer(config.flatten_size(), hidden, std, device);
        let fc7 = dense_layer(hidden, hidden, std, device);
        let fc8 = dense_layer(hidden, config.num_classes, std, device);

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            conv5,
            pool,
            fc6,
            fc7,
            fc8,
            dropout: DropoutConfig::new(config.dropout).init(),
            relu: Relu::new(),
        }
    }

    /// Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.relu.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.relu.forward(self.conv2.forward(x)));
        let x = self.relu.forward(self.conv3.forward(x));
        let x = self.relu.forward(self.conv4.forward(x));
        let x = self.relu.forward(self.conv5.forward(x));

        // [B, C, H, W] -> [B, C * H * W]
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(x);

        let x = self.relu.forward(self.fc6.forward(x));
        let x = self.dropout.forward(x);
        let x = self.relu.forward(self.fc7.forward(x));

        self.fc8.forward(x)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        // Linear weights are stored as [d_input, d_output]
        self.fc8.weight.val().dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    /// Smallest input the valid-padded stack accepts, with narrow layers
    fn tiny_config() -> AlexNetConfig {
        AlexNetConfig::new()
            .with_num_classes(10)
            .with_input_size(163)
            .with_conv_filters([4, 8, 8, 8, 8])
            .with_hidden_units(16)
    }

    #[test]
    fn test_first_conv_param_count() {
        let device = Default::default();
        let conv1 = conv_layer::<TestBackend>([3, 96], 11, 4, 0.01, 0.0, &device);
        assert_eq!(conv1.num_params(), 34_944);
    }

    #[test]
    fn test_second_conv_param_count() {
        let device = Default::default();
        let conv2 = conv_layer::<TestBackend>([96, 256], 5, 1, 0.01, 0.1, &device);
        assert_eq!(conv2.num_params(), 614_656);
    }

    #[test]
    fn test_default_model_outputs_imagenet_classes() {
        let device = Default::default();
        let model = AlexNetConfig::new().init::<TestBackend>(&device);

        assert_eq!(model.num_classes(), 1000);
        assert_eq!(model.fc6.weight.val().dims(), [4096, 4096]);
        assert_eq!(model.fc8.weight.val().dims(), [4096, 1000]);
    }

    #[test]
    fn test_bias_initialization() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let bias = |conv: &Conv2d<TestBackend>| -> Vec<f32> {
            conv.bias
                .as_ref()
                .unwrap()
                .val()
                .into_data()
                .to_vec::<f32>()
                .unwrap()
        };

        assert!(bias(&model.conv1).iter().all(|&b| b == 0.0));
        assert!(bias(&model.conv2).iter().all(|&b| (b - 0.1).abs() < 1e-6));
        assert!(bias(&model.conv3).iter().all(|&b| b == 0.0));
        assert!(bias(&model.conv4).iter().all(|&b| (b - 0.1).abs() < 1e-6));
        assert!(bias(&model.conv5).iter().all(|&b| (b - 0.1).abs() < 1e-6));

        let fc8_bias = model.fc8.bias.as_ref().unwrap().val().into_data();
        assert!(fc8_bias.iter::<f32>().all(|b| b == 0.0));
    }

    #[test]
    fn test_kernel_initialization_scale() {
        let device = Default::default();
        let conv = conv_layer::<TestBackend>([3, 96], 11, 4, 0.01, 0.0, &device);
        let weights: Vec<f32> = conv.weight.val().into_data().to_vec().unwrap();

        let n = weights.len() as f32;
        let mean = weights.iter().sum::<f32>() / n;
        let var = weights.iter().map(|w| (w - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-3);
        assert!((var.sqrt() - 0.01).abs() < 1e-3);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 163, 163], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 10]);
        assert_eq!(model.num_classes(), 10);
    }

    #[test]
    fn test_forward_softmax_sums_to_one() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 163, 163], &device);
        let probs = model.forward_softmax(input);
        let sum = probs.sum().into_scalar();

        assert!((sum - 1.0).abs() < 1e-4);
    }
}

//! Custom CNN for waste classification.
//!
//! Five convolutional stages (conv -> batch norm -> ReLU -> max pool) followed
//! by a flatten and a two-layer classifier head with dropout on both sides
//! of the hidden layer.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::ImageClassifier;
use crate::error::Error;

/// Channel plan per stage: input channels followed by one output width per
/// convolution in the stage.
const STAGE_CHANNELS: [&[usize]; 5] = [
    &[3, 16, 16],
    &[16, 32, 32],
    &[32, 64],
    &[64, 64],
    &[64, 128],
];

/// Max-pool stride per stage (kernel is always 2).
const STAGE_POOL_STRIDES: [usize; 5] = [1, 2, 2, 2, 1];

/// Hidden width of the classifier head.
const HIDDEN_UNITS: usize = 256;

/// Configuration for [`WasteCnn`].
#[derive(Config, Debug)]
pub struct WasteCnnConfig {
    /// Number of output classes
    #[config(default = "6")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "64")]
    pub input_size: usize,

    /// Dropout rate applied to the flattened features
    #[config(default = "0.2")]
    pub dropout_flatten: f64,

    /// Dropout rate applied after the hidden layer
    #[config(default = "0.5")]
    pub dropout_hidden: f64,
}

impl WasteCnnConfig {
    /// Initialize the model on the given device.
    ///
    /// Fails when `input_size` is too small for the five pooling stages to
    /// leave a positive spatial extent, or when the class/dropout settings
    /// are out of range. The flatten width of the first linear layer is
    /// derived from `input_size` here (64 -> 128 * 6 * 6 = 4608).
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::error::Result<WasteCnn<B>> {
        if self.num_classes == 0 {
            return Err(Error::Model("num_classes must be greater than 0".into()));
        }
        for rate in [self.dropout_flatten, self.dropout_hidden] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::Model(format!(
                    "dropout rate {rate} outside [0.0, 1.0)"
                )));
            }
        }

        let extent = pooled_extent(self.input_size).ok_or_else(|| {
            Error::Model(format!(
                "input size {} collapses below 2x2 across the five pooling stages",
                self.input_size
            ))
        })?;
        let out_channels = *STAGE_CHANNELS[4].last().unwrap();
        let flat_width = out_channels * extent * extent;

        Ok(WasteCnn {
            stage1: ConvStage::new(STAGE_CHANNELS[0], STAGE_POOL_STRIDES[0], device),
            stage2: ConvStage::new(STAGE_CHANNELS[1], STAGE_POOL_STRIDES[1], device),
            stage3: ConvStage::new(STAGE_CHANNELS[2], STAGE_POOL_STRIDES[2], device),
            stage4: ConvStage::new(STAGE_CHANNELS[3], STAGE_POOL_STRIDES[3], device),
            stage5: ConvStage::new(STAGE_CHANNELS[4], STAGE_POOL_STRIDES[4], device),
            dropout1: DropoutConfig::new(self.dropout_flatten).init(),
            fc1: LinearConfig::new(flat_width, HIDDEN_UNITS).init(device),
            dropout2: DropoutConfig::new(self.dropout_hidden).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
            num_classes: self.num_classes,
            input_size: self.input_size,
        })
    }
}

/// Spatial extent left after the five pooling stages, or `None` when a
/// stage would receive an input smaller than its 2x2 pooling kernel.
fn pooled_extent(input_size: usize) -> Option<usize> {
    let mut size = input_size;
    for stride in STAGE_POOL_STRIDES {
        if size < 2 {
            return None;
        }
        size = (size - 2) / stride + 1;
    }
    Some(size)
}

/// One stage: one or two same-padded 3x3 convolutions, batch norm, ReLU,
/// and a 2x2 max pool.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    convs: Vec<Conv2d<B>>,
    bn: BatchNorm<B, 2>,
    activation: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    fn new(channels: &[usize], pool_stride: usize, device: &B::Device) -> Self {
        let convs = channels
            .windows(2)
            .map(|pair| {
                Conv2dConfig::new([pair[0], pair[1]], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();
        let bn = BatchNormConfig::new(*channels.last().unwrap()).init(device);
        let pool = MaxPool2dConfig::new([2, 2])
            .with_strides([pool_stride, pool_stride])
            .init();

        Self {
            convs,
            bn,
            activation: Relu::new(),
            pool,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = conv.forward(x);
        }
        let x = self.bn.forward(x);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }
}

/// The custom waste classification CNN.
#[derive(Module, Debug)]
pub struct WasteCnn<B: Backend> {
    pub stage1: ConvStage<B>,
    pub stage2: ConvStage<B>,
    pub stage3: ConvStage<B>,
    pub stage4: ConvStage<B>,
    pub stage5: ConvStage<B>,
    pub dropout1: Dropout,
    pub fc1: Linear<B>,
    pub dropout2: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
    input_size: usize,
}

impl<B: Backend> WasteCnn<B> {
    /// The square input size this model was built for. Feeding a different
    /// spatial size fails at the flatten/linear boundary.
    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl<B: Backend> ImageClassifier<B> for WasteCnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stage1.forward(images);
        let x = self.stage2.forward(x);
        let x = self.stage3.forward(x);
        let x = self.stage4.forward(x);
        let x = self.stage5.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.dropout1.forward(x);
        let x = self.fc1.forward(x);
        let x = self.dropout2.forward(x);
        self.fc2.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_pooled_extent_reference_size() {
        // 64 -> 63 -> 31 -> 15 -> 7 -> 6
        assert_eq!(pooled_extent(64), Some(6));
    }

    #[test]
    fn test_pooled_extent_too_small() {
        assert_eq!(pooled_extent(8), None);
        assert_eq!(pooled_extent(0), None);
    }

    #[test]
    fn test_flatten_width_matches_reference() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        // 128 channels * 6 * 6 spatial
        assert_eq!(model.fc1.weight.dims(), [4608, HIDDEN_UNITS]);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 64, 64],
            Distribution::Default,
            &device,
        );
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 6]);
    }

    #[test]
    fn test_init_rejects_small_input() {
        let device = Default::default();
        let result = WasteCnnConfig::new()
            .with_input_size(8)
            .init::<TestBackend>(&device);
        assert!(matches!(result, Err(crate::error::Error::Model(_))));
    }

    #[test]
    fn test_init_rejects_bad_dropout() {
        let device = Default::default();
        let result = WasteCnnConfig::new()
            .with_dropout_hidden(1.0)
            .init::<TestBackend>(&device);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_class_count() {
        let device = Default::default();
        let model = WasteCnnConfig::new()
            .with_num_classes(11)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(model.forward(input).dims(), [1, 11]);
        assert_eq!(model.num_classes(), 11);
    }
}

//! ResNet-18 backbone.
//!
//! Classic residual architecture: a 7x7 stem, four stages of two basic
//! blocks each (64/128/256/512 channels), global average pooling, and a
//! linear head. [`resnet18_pretrained`] loads cached ImageNet weights and
//! swaps the head for a freshly initialized one.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::weights::{WeightStore, RESNET18_IMAGENET};
use super::{ImageClassifier, IMAGENET_CLASSES};
use crate::error::Result;

const FEATURE_WIDTH: usize = 512;

/// Strided 1x1 projection for residual shortcuts that change shape.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        Self { conv, bn }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// Two 3x3 convolutions with a residual connection.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x.add(identity))
    }
}

/// ResNet-18 image classifier.
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> ResNet18<B> {
    /// Initialize with randomly initialized weights.
    pub fn init(num_classes: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let layer = |in_ch, out_ch, stride: usize| {
            vec![
                BasicBlock::new(in_ch, out_ch, stride, device),
                BasicBlock::new(out_ch, out_ch, 1, device),
            ]
        };

        Self {
            conv1,
            bn1,
            maxpool,
            layer1: layer(64, 64, 1),
            layer2: layer(64, 128, 2),
            layer3: layer(128, 256, 2),
            layer4: layer(256, FEATURE_WIDTH, 2),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(FEATURE_WIDTH, num_classes).init(device),
            activation: Relu::new(),
            num_classes,
        }
    }

    /// Replace the classification head with a freshly initialized linear
    /// layer for `num_classes` outputs. Backbone weights are kept.
    pub fn with_classes(self, num_classes: usize, device: &B::Device) -> Self {
        Self {
            fc: LinearConfig::new(FEATURE_WIDTH, num_classes).init(device),
            num_classes,
            ..self
        }
    }
}

impl<B: Backend> ImageClassifier<B> for ResNet18<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Build a ResNet-18 fine-tuning model: load cached ImageNet weights into a
/// 1000-class backbone, then swap the head for `num_classes` outputs.
///
/// Fails with a retrieval error when the weight record is not cached.
pub fn resnet18_pretrained<B: Backend>(
    store: &WeightStore,
    num_classes: usize,
    device: &B::Device,
) -> Result<ResNet18<B>> {
    let backbone = ResNet18::init(IMAGENET_CLASSES, device);
    let backbone = store.load_into(RESNET18_IMAGENET, backbone, device)?;
    Ok(backbone.with_classes(num_classes, device))
}

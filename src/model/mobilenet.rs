//! MobileNet-V2 backbone (reduced).
//!
//! Lightweight inverted-bottleneck architecture: a strided stem, a reduced
//! sequence of expand/depthwise/project blocks, a 1x1 convolution up to
//! 1280 features, global average pooling, and a small two-layer head with
//! dropout. [`mobilenet_v2_pretrained`] loads cached ImageNet weights and
//! swaps the head for a freshly initialized one.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::weights::{WeightStore, MOBILENET_V2_IMAGENET};
use super::{ImageClassifier, IMAGENET_CLASSES};
use crate::error::Result;

const FEATURE_WIDTH: usize = 1280;
const HEAD_HIDDEN: usize = 64;
const HEAD_DROPOUT: f64 = 0.5;

/// (in_channels, out_channels, expansion factor, stride)
const BLOCK_PLAN: [(usize, usize, usize, usize); 5] = [
    (32, 16, 1, 1),
    (16, 24, 6, 2),
    (24, 32, 6, 2),
    (32, 64, 6, 2),
    (64, 96, 6, 1),
];

/// 1x1 expansion convolution used when the block's expansion factor is > 1.
#[derive(Module, Debug)]
pub struct Expand<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Expand<B> {
    fn new(in_channels: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, hidden], [1, 1]).init(device),
            bn: BatchNormConfig::new(hidden).init(device),
        }
    }
}

/// Inverted bottleneck: optional 1x1 expansion, 3x3 depthwise convolution,
/// 1x1 projection.
#[derive(Module, Debug)]
pub struct InvertedBottleneck<B: Backend> {
    expand: Option<Expand<B>>,
    depthwise: Conv2d<B>,
    depthwise_bn: BatchNorm<B, 2>,
    project: Conv2d<B>,
    project_bn: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> InvertedBottleneck<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        expansion: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;
        let expand = (expansion > 1).then(|| Expand::new(in_channels, hidden, device));

        let depthwise = Conv2dConfig::new([hidden, hidden], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(hidden)
            .init(device);
        let depthwise_bn = BatchNormConfig::new(hidden).init(device);

        let project = Conv2dConfig::new([hidden, out_channels], [1, 1]).init(device);
        let project_bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            expand,
            depthwise,
            depthwise_bn,
            project,
            project_bn,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => {
                let x = expand.conv.forward(input);
                let x = expand.bn.forward(x);
                self.activation.forward(x)
            }
            None => input,
        };

        let x = self.depthwise.forward(x);
        let x = self.depthwise_bn.forward(x);
        let x = self.activation.forward(x);

        // Linear bottleneck: no activation after projection.
        let x = self.project.forward(x);
        self.project_bn.forward(x)
    }
}

/// Two-layer classification head with dropout between the layers.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    fn new(num_classes: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(FEATURE_WIDTH, HEAD_HIDDEN).init(device),
            dropout: DropoutConfig::new(HEAD_DROPOUT).init(),
            fc2: LinearConfig::new(HEAD_HIDDEN, num_classes).init(device),
        }
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(input);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

/// MobileNet-V2 image classifier.
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    blocks: Vec<InvertedBottleneck<B>>,
    head_conv: Conv2d<B>,
    head_bn: BatchNorm<B, 2>,
    avgpool: AdaptiveAvgPool2d,
    head: ClassifierHead<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> MobileNetV2<B> {
    /// Initialize with randomly initialized weights.
    pub fn init(num_classes: usize, device: &B::Device) -> Self {
        let stem = Conv2dConfig::new([3, 32], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let stem_bn = BatchNormConfig::new(32).init(device);

        let blocks = BLOCK_PLAN
            .iter()
            .map(|&(in_ch, out_ch, expansion, stride)| {
                InvertedBottleneck::new(in_ch, out_ch, expansion, stride, device)
            })
            .collect();

        let last_width = BLOCK_PLAN[BLOCK_PLAN.len() - 1].1;
        let head_conv = Conv2dConfig::new([last_width, FEATURE_WIDTH], [1, 1]).init(device);
        let head_bn = BatchNormConfig::new(FEATURE_WIDTH).init(device);

        Self {
            stem,
            stem_bn,
            blocks,
            head_conv,
            head_bn,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: ClassifierHead::new(num_classes, device),
            activation: Relu::new(),
            num_classes,
        }
    }

    /// Replace the classification head with a freshly initialized one for
    /// `num_classes` outputs. Backbone weights are kept.
    pub fn with_classes(self, num_classes: usize, device: &B::Device) -> Self {
        Self {
            head: ClassifierHead::new(num_classes, device),
            num_classes,
            ..self
        }
    }
}

impl<B: Backend> ImageClassifier<B> for MobileNetV2<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem.forward(images);
        let x = self.stem_bn.forward(x);
        let mut x = self.activation.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.head_conv.forward(x);
        let x = self.head_bn.forward(x);
        let x = self.activation.forward(x);

        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.head.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Build a MobileNet-V2 fine-tuning model: load cached ImageNet weights
/// into a 1000-class backbone, then swap the head for `num_classes` outputs.
///
/// Fails with a retrieval error when the weight record is not cached.
pub fn mobilenet_v2_pretrained<B: Backend>(
    store: &WeightStore,
    num_classes: usize,
    device: &B::Device,
) -> Result<MobileNetV2<B>> {
    let backbone = MobileNetV2::init(IMAGENET_CLASSES, device);
    let backbone = store.load_into(MOBILENET_V2_IMAGENET, backbone, device)?;
    Ok(backbone.with_classes(num_classes, device))
}

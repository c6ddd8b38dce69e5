//! Model architectures for waste classification.
//!
//! Three architectures share the [`ImageClassifier`] seam:
//! - [`WasteCnn`]: the custom five-stage CNN
//! - [`ResNet18`]: deeper residual backbone, ImageNet-pretrainable
//! - [`MobileNetV2`]: lightweight backbone, ImageNet-pretrainable

pub mod cnn;
pub mod mobilenet;
pub mod resnet;
pub mod weights;

pub use cnn::{WasteCnn, WasteCnnConfig};
pub use mobilenet::{mobilenet_v2_pretrained, MobileNetV2};
pub use resnet::{resnet18_pretrained, ResNet18};
pub use weights::WeightStore;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Number of classes in the ImageNet-pretrained backbone heads.
pub const IMAGENET_CLASSES: usize = 1000;

/// A model mapping image batches to class scores.
///
/// Input shape is `[batch, 3, height, width]`, output `[batch, num_classes]`.
pub trait ImageClassifier<B: Backend> {
    /// Forward pass producing unnormalized class scores.
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;
}

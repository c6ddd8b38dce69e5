//! # WasteNet
//!
//! A small image-classification training library for sorting waste imagery,
//! built on the Burn framework.
//!
//! ## Features
//!
//! - A custom five-stage CNN with a validated, size-derived flatten width
//! - ResNet-18 and MobileNet-V2 backbones with head-replacement factories
//!   fed by a cache-aware pretrained weight store
//! - Minibatch training and gradient-free evaluation loops with
//!   end-of-epoch checkpointing
//!
//! ## Modules
//!
//! - `dataset`: directory-per-class loading and tensor batching
//! - `model`: architectures behind the [`ImageClassifier`] seam
//! - `training`: training/evaluation loops and run configuration
//! - `backend`: feature-gated Burn backend selection
//! - `utils`: logging and metric bookkeeping
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use wastenet::backend::{default_device, TrainingBackend};
//! use wastenet::model::WasteCnnConfig;
//! use wastenet::training::{fit, TrainingConfig};
//!
//! let device = default_device();
//! let model = WasteCnnConfig::new().init::<TrainingBackend>(&device)?;
//! // ... build batches, loss, optimizer, then fit(...)
//! ```

pub mod backend;
pub mod dataset;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{WasteBatch, WasteBatcher, WasteDataset, WasteItem};
pub use error::{Error, Result};
pub use model::{
    mobilenet_v2_pretrained, resnet18_pretrained, ImageClassifier, MobileNetV2, ResNet18,
    WasteCnn, WasteCnnConfig, WeightStore,
};
pub use training::{evaluate, fit, train_epoch, TrainingConfig};
pub use utils::metrics::ConfusionMatrix;

/// Waste categories recognized by the default models.
pub const CLASS_NAMES: [&str; 6] = ["cardboard", "glass", "metal", "paper", "plastic", "trash"];

/// Number of waste classes.
pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// Default square image size consumed by [`WasteCnn`].
pub const IMAGE_SIZE: usize = 64;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

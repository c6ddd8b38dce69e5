//! Dataset loading and batching for waste imagery.
//!
//! The directory layout is one subdirectory per class. Batching, shuffling
//! and augmentation policy beyond a seeded train/validation split is left to
//! callers; this module only provides the minimum collaborator the training
//! and evaluation loops consume.

pub mod batch;
pub mod loader;

pub use batch::{WasteBatch, WasteBatcher, WasteItem};
pub use loader::{WasteDataset, WasteSample};

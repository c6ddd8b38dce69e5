//! Tensor batching for waste images.
//!
//! Implements Burn's `Batcher` to turn preprocessed items into
//! `(images, targets)` batches with ImageNet normalization applied.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::imageops::FilterType;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ImageNet statistics, matching the pretrained backbones.
const NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single image ready for batching.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WasteItem {
    /// Image data as flattened CHW float array `[3 * size * size]`, in [0, 1]
    pub image: Vec<f32>,
    /// Class label index
    pub label: usize,
    /// Source path, kept for logging
    pub path: String,
}

impl WasteItem {
    /// Load and preprocess an image: decode, resize to a square of
    /// `image_size`, convert to CHW f32 in [0, 1].
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)?
            .decode()?
            .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
            .to_rgb8();

        let (width, height) = (image_size, image_size);
        let mut image = vec![0.0f32; 3 * height * width];

        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    image[c * height * width + y * width + x] = pixel[c] as f32 / 255.0;
                }
            }
        }

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from already-loaded CHW data.
    pub fn from_data(image: Vec<f32>, label: usize, path: impl Into<String>) -> Self {
        Self {
            image,
            label,
            path: path.into(),
        }
    }
}

/// A batch of waste images.
#[derive(Clone, Debug)]
pub struct WasteBatch<B: Backend> {
    /// Images with shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher producing normalized `WasteBatch`es on a fixed device.
#[derive(Clone, Debug)]
pub struct WasteBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> WasteBatcher<B> {
    /// Create a batcher for the given device and square image size.
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }

    /// Chunk a list of items into consecutive batches of at most
    /// `batch_size` items. The final batch may be smaller.
    pub fn batch_all(&self, items: &[WasteItem], batch_size: usize) -> Vec<WasteBatch<B>> {
        items
            .chunks(batch_size.max(1))
            .map(|chunk| self.batch(chunk.to_vec()))
            .collect()
    }
}

impl<B: Backend> Batcher<WasteItem, WasteBatch<B>> for WasteBatcher<B> {
    fn batch(&self, items: Vec<WasteItem>) -> WasteBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            &self.device,
        );

        // (x - mean) / std, broadcast over batch and spatial dims
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(NORM_MEAN.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(NORM_STD.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        WasteBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    const SIZE: usize = 8;

    fn item(label: usize, value: f32) -> WasteItem {
        WasteItem::from_data(vec![value; 3 * SIZE * SIZE], label, "test.jpg")
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = WasteBatcher::<TestBackend>::new(device, SIZE);

        let batch = batcher.batch(vec![item(0, 0.5), item(3, 0.1)]);

        assert_eq!(batch.images.dims(), [2, 3, SIZE, SIZE]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 3]);
    }

    #[test]
    fn test_normalization_applied() {
        let device = Default::default();
        let batcher = WasteBatcher::<TestBackend>::new(device, SIZE);

        let batch = batcher.batch(vec![item(0, 0.5)]);
        let data: Vec<f32> = batch.images.into_data().to_vec().unwrap();

        // First value belongs to the red channel.
        let expected = (0.5 - NORM_MEAN[0]) / NORM_STD[0];
        assert!((data[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_batch_all_chunks() {
        let device = Default::default();
        let batcher = WasteBatcher::<TestBackend>::new(device, SIZE);

        let items: Vec<_> = (0..5).map(|i| item(i, 0.2)).collect();
        let batches = batcher.batch_all(&items, 2);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].targets.dims(), [2]);
        assert_eq!(batches[2].targets.dims(), [1]);
    }
}

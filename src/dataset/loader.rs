//! Waste dataset loader.
//!
//! Scans a directory-per-class tree and organizes the samples for training
//! and evaluation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class name (e.g., "plastic")
    pub class_name: String,
}

/// Dataset of labeled waste images, loaded lazily from disk.
#[derive(Debug, Clone)]
pub struct WasteDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples in the dataset
    pub samples: Vec<WasteSample>,
    /// Mapping from class name to label index
    pub class_to_idx: HashMap<String, usize>,
    /// Mapping from label index to class name
    pub idx_to_class: HashMap<usize, String>,
}

impl WasteDataset {
    /// Scan a dataset directory.
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── cardboard/
    /// │   ├── cardboard001.jpg
    /// │   └── ...
    /// ├── glass/
    /// └── ...
    /// ```
    ///
    /// Class indices are assigned in sorted directory-name order.
    pub fn scan<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning waste dataset at {:?}", root_dir);

        if !root_dir.exists() {
            return Err(Error::Dataset(format!(
                "dataset directory does not exist: {}",
                root_dir.display()
            )));
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_dirs.push(name.to_string());
                }
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(Error::Dataset(format!(
                "no class directories under {}",
                root_dir.display()
            )));
        }

        let class_to_idx: HashMap<String, usize> = class_dirs
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let idx_to_class: HashMap<usize, String> = class_dirs
            .iter()
            .enumerate()
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        let mut samples = Vec::new();
        for class_name in &class_dirs {
            let class_dir = root_dir.join(class_name);
            let label = class_to_idx[class_name];

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path().to_path_buf();
                let is_image = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));

                if is_image {
                    samples.push(WasteSample {
                        path,
                        label,
                        class_name: class_name.clone(),
                    });
                }
            }
        }

        info!(
            "Found {} samples across {} classes",
            samples.len(),
            class_dirs.len()
        );

        Ok(Self {
            root_dir,
            samples,
            class_to_idx,
            idx_to_class,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples were found.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.class_to_idx.len()
    }

    /// Samples per class, indexed by label.
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            if sample.label < counts.len() {
                counts[sample.label] += 1;
            }
        }
        counts
    }

    /// Split samples into a training and a validation set.
    ///
    /// Samples are shuffled with a seeded RNG so splits are reproducible;
    /// `val_fraction` is clamped to [0, 1].
    pub fn train_val_split(&self, val_fraction: f64, seed: u64) -> (Vec<WasteSample>, Vec<WasteSample>) {
        let mut shuffled = self.samples.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        let val_fraction = val_fraction.clamp(0.0, 1.0);
        let val_len = (shuffled.len() as f64 * val_fraction).round() as usize;
        let train = shuffled.split_off(val_len);

        (train, shuffled)
    }
}

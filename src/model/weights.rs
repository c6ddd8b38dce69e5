//! Cache-aware pretrained weight store.
//!
//! Pretrained backbone records are resolved from a local cache directory
//! rather than fetched at call time; a miss surfaces as an explicit
//! retrieval error telling the caller where the record was expected.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::info;

use crate::error::{Error, Result};

/// Environment variable overriding the default cache directory.
pub const WEIGHTS_DIR_ENV: &str = "WASTENET_WEIGHTS_DIR";

/// Default cache directory, relative to the working directory.
pub const DEFAULT_WEIGHTS_DIR: &str = "weights";

/// Record name for the ImageNet-pretrained ResNet-18 backbone.
pub const RESNET18_IMAGENET: &str = "resnet18-imagenet";

/// Record name for the ImageNet-pretrained MobileNet-V2 backbone.
pub const MOBILENET_V2_IMAGENET: &str = "mobilenet-v2-imagenet";

/// Resolves named pretrained records beneath a cache directory.
#[derive(Debug, Clone)]
pub struct WeightStore {
    cache_dir: PathBuf,
}

impl WeightStore {
    /// Create a store rooted at the given directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Create a store rooted at `$WASTENET_WEIGHTS_DIR`, falling back to
    /// `weights/`.
    pub fn from_env() -> Self {
        let dir = std::env::var(WEIGHTS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WEIGHTS_DIR));
        Self::new(dir)
    }

    /// The cache directory this store resolves against.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a record name to its on-disk path.
    ///
    /// Fails when the record is not cached.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = self.cache_dir.join(format!("{name}.mpk"));
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::Weights(format!(
                "pretrained record '{name}' not found at {} (place the record file there, \
                 or point {WEIGHTS_DIR_ENV} at the cache directory)",
                path.display()
            )))
        }
    }

    /// Load a named record into the given module.
    pub fn load_into<B: Backend, M: Module<B>>(
        &self,
        name: &str,
        module: M,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.resolve(name)?;
        info!("Loading pretrained record '{}' from {:?}", name, path);

        module
            .load_file(path.clone(), &CompactRecorder::new(), device)
            .map_err(|e| {
                Error::Weights(format!(
                    "failed to decode pretrained record {}: {e:?}",
                    path.display()
                ))
            })
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_cache_miss() {
        let dir = TempDir::new().unwrap();
        let store = WeightStore::new(dir.path());

        let result = store.resolve(RESNET18_IMAGENET);
        assert!(matches!(result, Err(Error::Weights(_))));

        let message = result.unwrap_err().to_string();
        assert!(message.contains(RESNET18_IMAGENET));
        assert!(message.contains(WEIGHTS_DIR_ENV));
    }

    #[test]
    fn test_resolve_cache_hit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("{MOBILENET_V2_IMAGENET}.mpk"));
        fs::write(&path, b"not a real record").unwrap();

        let store = WeightStore::new(dir.path());
        assert_eq!(store.resolve(MOBILENET_V2_IMAGENET).unwrap(), path);
    }

    #[test]
    fn test_load_into_round_trip() {
        use crate::model::{WasteCnn, WasteCnnConfig};
        use burn::record::CompactRecorder;
        use burn_ndarray::NdArray;

        let dir = TempDir::new().unwrap();
        let device = Default::default();

        let model: WasteCnn<NdArray> = WasteCnnConfig::new().init(&device).unwrap();
        model
            .clone()
            .save_file(dir.path().join("cnn-test"), &CompactRecorder::new())
            .unwrap();

        let store = WeightStore::new(dir.path());
        let loaded = store
            .load_into::<NdArray, _>("cnn-test", WasteCnnConfig::new().init(&device).unwrap(), &device)
            .unwrap();
        assert_eq!(loaded.num_params(), model.num_params());
    }

    #[test]
    fn test_load_into_undecodable_record() {
        use crate::model::{WasteCnn, WasteCnnConfig};
        use burn_ndarray::NdArray;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cnn-test.mpk"), b"garbage bytes").unwrap();

        let device = Default::default();
        let store = WeightStore::new(dir.path());
        let model: WasteCnn<NdArray> = WasteCnnConfig::new().init(&device).unwrap();

        let result = store.load_into::<NdArray, _>("cnn-test", model, &device);
        assert!(matches!(result, Err(Error::Weights(_))));
    }
}

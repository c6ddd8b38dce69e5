//! Minibatch training loop.
//!
//! [`train_epoch`] runs one pass over a batch sequence: forward, loss,
//! backward, one optimizer step per batch, with loss accumulation and
//! periodic progress logging, then writes a checkpoint. [`fit`] drives
//! multiple epochs with validation between them.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLoss,
    optim::{GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use tracing::info;

use crate::dataset::WasteBatch;
use crate::error::{Error, Result};
use crate::model::ImageClassifier;

use super::config::TrainingConfig;
use super::evaluator::evaluate;

/// Training progress is logged every this many steps.
const LOG_INTERVAL: usize = 100;

/// Losses recorded while training one epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// Mean of the per-batch losses (unweighted; batches of unequal size
    /// are not corrected for)
    pub mean_loss: f64,
    /// Per-batch loss values in iteration order
    pub batch_losses: Vec<f64>,
}

/// Train the model for one epoch over the given batches.
///
/// Per batch: move tensors to `device`, forward, cross-entropy loss,
/// backward, one optimizer step. Every 100 steps a progress line with the
/// step index and current loss is logged. At the end of the epoch the
/// model record is unconditionally written to `checkpoint_path`,
/// overwriting any previous checkpoint.
///
/// Returns the updated model and the per-batch loss record. Checkpoint
/// I/O failures are returned as errors; tensor shape or device failures
/// propagate as panics from the framework and abort the epoch, leaving the
/// previous checkpoint (if any) on disk.
pub fn train_epoch<B, M, O>(
    mut model: M,
    batches: &[WasteBatch<B>],
    loss_fn: &CrossEntropyLoss<B>,
    optimizer: &mut O,
    learning_rate: f64,
    device: &B::Device,
    checkpoint_path: &Path,
) -> Result<(M, EpochReport)>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let num_batches = batches.len();
    let mut batch_losses = Vec::with_capacity(num_batches);
    let mut total_loss = 0.0f64;

    for (step, batch) in batches.iter().enumerate() {
        let images = batch.images.clone().to_device(device);
        let targets = batch.targets.clone().to_device(device);

        let output = model.forward(images);
        let loss = loss_fn.forward(output, targets);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        total_loss += loss_value;
        batch_losses.push(loss_value);

        // Gradients are computed fresh per backward call; the step consumes
        // only this batch's gradients.
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(learning_rate, model, grads);

        if (step + 1) % LOG_INTERVAL == 0 {
            info!(
                "Step [{}/{}] train loss: {:.4}",
                step + 1,
                num_batches,
                loss_value
            );
        }
    }

    save_checkpoint(&model, checkpoint_path)?;

    let mean_loss = if num_batches > 0 {
        total_loss / num_batches as f64
    } else {
        0.0
    };

    Ok((model, EpochReport { mean_loss, batch_losses }))
}

/// Serialize the model record to `path`, creating parent directories as
/// needed. The recorder appends its own file extension.
pub fn save_checkpoint<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    model
        .clone()
        .save_file(path, &CompactRecorder::new())
        .map_err(|e| {
            Error::Training(format!(
                "failed to save checkpoint {}: {e:?}",
                path.display()
            ))
        })?;

    info!("Checkpoint saved to {:?}", path);
    Ok(())
}

/// Load a model record previously written by [`save_checkpoint`].
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    model
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|e| {
            Error::Training(format!(
                "failed to load checkpoint {}: {e:?}",
                path.display()
            ))
        })
}

/// Per-epoch history of a [`fit`] run.
#[derive(Debug, Clone, Default)]
pub struct FitSummary {
    /// Mean training loss per epoch
    pub train_loss: Vec<f64>,
    /// Validation accuracy per epoch
    pub val_accuracy: Vec<f64>,
    /// Best validation accuracy seen
    pub best_accuracy: f64,
}

/// Train for `config.epochs` epochs, evaluating on `val_batches` after each.
///
/// The checkpoint at `config.checkpoint_path` is rewritten every epoch, so
/// the file on disk always holds the latest epoch's parameters.
pub fn fit<B, M, O>(
    mut model: M,
    train_batches: &[WasteBatch<B>],
    val_batches: &[WasteBatch<B::InnerBackend>],
    loss_fn: &CrossEntropyLoss<B>,
    optimizer: &mut O,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(M, FitSummary)>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    config.validate()?;

    let mut summary = FitSummary::default();

    for epoch in 0..config.epochs {
        info!(
            "Epoch {}/{} ({} train batches)",
            epoch + 1,
            config.epochs,
            train_batches.len()
        );

        let (updated, report) = train_epoch(
            model,
            train_batches,
            loss_fn,
            optimizer,
            config.learning_rate,
            device,
            &config.checkpoint_path,
        )?;
        model = updated;

        let accuracy = evaluate::<B, M>(&model, val_batches, device, "validation");
        if accuracy > summary.best_accuracy {
            summary.best_accuracy = accuracy;
        }

        info!(
            "Epoch {}/{}: train loss = {:.4}, val accuracy = {:.2}%",
            epoch + 1,
            config.epochs,
            report.mean_loss,
            accuracy * 100.0
        );

        summary.train_loss.push(report.mean_loss);
        summary.val_accuracy.push(accuracy);
    }

    Ok((model, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{WasteBatcher, WasteItem};
    use crate::model::{WasteCnn, WasteCnnConfig};
    use burn::backend::Autodiff;
    use burn::data::dataloader::batcher::Batcher;
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn::optim::AdamConfig;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    const SIZE: usize = 64;

    fn noise_item(label: usize, seed: usize) -> WasteItem {
        // Deterministic pseudo-noise; values stay in [0, 1].
        let image = (0..3 * SIZE * SIZE)
            .map(|i| (((i * 31 + seed * 17) % 255) as f32) / 255.0)
            .collect();
        WasteItem::from_data(image, label, format!("noise{seed}.jpg"))
    }

    fn noise_batches(labels_per_batch: &[&[usize]]) -> Vec<WasteBatch<TestBackend>> {
        let device = Default::default();
        let batcher = WasteBatcher::<TestBackend>::new(device, SIZE);
        labels_per_batch
            .iter()
            .map(|labels| {
                let items = labels
                    .iter()
                    .enumerate()
                    .map(|(i, &label)| noise_item(label, i))
                    .collect();
                batcher.batch(items)
            })
            .collect()
    }

    #[test]
    fn test_single_batch_epoch() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("cnn");

        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let mut optimizer = AdamConfig::new().init();

        let batches = noise_batches(&[&[0, 1, 2, 3]]);
        let (_model, report) = train_epoch(
            model,
            &batches,
            &loss_fn,
            &mut optimizer,
            1e-3,
            &device,
            &checkpoint,
        )
        .unwrap();

        assert_eq!(report.batch_losses.len(), 1);
        assert!(report.mean_loss.is_finite());
        assert!(report.mean_loss >= 0.0);
        assert_eq!(report.mean_loss, report.batch_losses[0]);
    }

    #[test]
    fn test_mean_loss_is_mean_of_batch_losses() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("cnn");

        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let mut optimizer = AdamConfig::new().init();

        let batches = noise_batches(&[&[0, 1], &[2, 3], &[4, 5]]);
        let (_model, report) = train_epoch(
            model,
            &batches,
            &loss_fn,
            &mut optimizer,
            1e-3,
            &device,
            &checkpoint,
        )
        .unwrap();

        assert_eq!(report.batch_losses.len(), 3);
        let expected = report.batch_losses.iter().sum::<f64>() / 3.0;
        assert!((report.mean_loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_written_and_loadable() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("results").join("cnn");

        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let num_params = model.num_params();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let mut optimizer = AdamConfig::new().init();

        let batches = noise_batches(&[&[0, 1]]);
        let (model, _) = train_epoch(
            model,
            &batches,
            &loss_fn,
            &mut optimizer,
            1e-3,
            &device,
            &checkpoint,
        )
        .unwrap();

        let file = checkpoint.with_extension("mpk");
        assert!(file.is_file());
        assert!(file.metadata().unwrap().len() > 0);

        let fresh = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let loaded = load_checkpoint(fresh, &checkpoint, &device).unwrap();
        assert_eq!(loaded.num_params(), num_params);
        assert_eq!(loaded.num_params(), model.num_params());
    }

    #[test]
    fn test_checkpoint_overwritten_per_epoch() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("cnn");

        let model: WasteCnn<TestBackend> =
            WasteCnnConfig::new().init(&device).unwrap();
        save_checkpoint(&model, &checkpoint).unwrap();
        let first = checkpoint.with_extension("mpk").metadata().unwrap().modified().unwrap();

        save_checkpoint(&model, &checkpoint).unwrap();
        let second = checkpoint.with_extension("mpk").metadata().unwrap().modified().unwrap();

        assert!(second >= first);
    }

    #[test]
    fn test_fit_records_history() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();

        let config = TrainingConfig {
            epochs: 2,
            batch_size: 2,
            learning_rate: 1e-3,
            weight_decay: 0.0,
            seed: 42,
            checkpoint_path: dir.path().join("cnn"),
        };

        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let mut optimizer = AdamConfig::new().init();

        let train_batches = noise_batches(&[&[0, 1]]);

        let inner_batcher = WasteBatcher::<NdArray>::new(Default::default(), SIZE);
        let val_batches = vec![inner_batcher.batch(vec![noise_item(0, 0), noise_item(1, 1)])];

        let (_model, summary) = fit(
            model,
            &train_batches,
            &val_batches,
            &loss_fn,
            &mut optimizer,
            &config,
            &device,
        )
        .unwrap();

        assert_eq!(summary.train_loss.len(), 2);
        assert_eq!(summary.val_accuracy.len(), 2);
        assert!(summary
            .val_accuracy
            .iter()
            .all(|acc| (0.0..=1.0).contains(acc)));
        assert!(summary.best_accuracy <= 1.0);
    }

    #[test]
    fn test_fit_rejects_invalid_config() {
        let device = Default::default();
        let config = TrainingConfig {
            epochs: 0,
            ..TrainingConfig::default()
        };

        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let mut optimizer = AdamConfig::new().init();

        let result = fit(
            model,
            &[],
            &[],
            &loss_fn,
            &mut optimizer,
            &config,
            &device,
        );
        assert!(result.is_err());
    }
}

//! Gradient-free evaluation loop.
//!
//! Evaluation runs on the inner (non-autodiff) module obtained through
//! `valid()`, which disables gradient tracking and train-mode layer
//! behavior (dropout, batch-norm statistics updates) for the whole sweep.
//! The caller's autodiff model is untouched, so there is no mode to
//! restore afterwards.

use burn::{
    module::AutodiffModule,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use tracing::info;

use crate::dataset::WasteBatch;
use crate::model::ImageClassifier;
use crate::utils::metrics::ConfusionMatrix;

/// Evaluate classification accuracy over the given batches.
///
/// For each batch the predicted class is the arg-max of the output scores;
/// correct and total counts are accumulated across the sweep. The accuracy
/// (`correct / total`, `0.0` for an empty sweep) is logged under `name`
/// and returned.
pub fn evaluate<B, M>(
    model: &M,
    batches: &[WasteBatch<B::InnerBackend>],
    device: &B::Device,
    name: &str,
) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    let model = model.valid();

    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in batches {
        let images = batch.images.clone().to_device(device);
        let targets = batch.targets.clone().to_device(device);

        let output = model.forward(images);
        let predictions = output.argmax(1).squeeze::<1>(1);

        let batch_correct: i64 = predictions
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += batch_correct as usize;
        total += batch.targets.dims()[0];
    }

    let accuracy = if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    };

    info!(
        "{}: accuracy = {:.2}% ({}/{})",
        name,
        accuracy * 100.0,
        correct,
        total
    );

    accuracy
}

/// Evaluation result with per-class breakdown.
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Overall accuracy in [0, 1]
    pub accuracy: f64,
    /// Confusion matrix over the model's classes
    pub confusion: ConfusionMatrix,
}

/// Like [`evaluate`], additionally filling a confusion matrix.
pub fn evaluate_detailed<B, M>(
    model: &M,
    batches: &[WasteBatch<B::InnerBackend>],
    device: &B::Device,
    name: &str,
) -> EvalReport
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    let model = model.valid();
    let mut confusion = ConfusionMatrix::new(model.num_classes());

    for batch in batches {
        let images = batch.images.clone().to_device(device);
        let targets = batch.targets.clone().to_device(device);

        let output = model.forward(images);
        let predictions = output.argmax(1).squeeze::<1>(1);

        let pred_vec: Vec<i64> = predictions.into_data().to_vec().unwrap();
        let target_vec: Vec<i64> = targets.into_data().to_vec().unwrap();

        for (target, pred) in target_vec.iter().zip(pred_vec.iter()) {
            confusion.record(*target as usize, *pred as usize);
        }
    }

    let accuracy = confusion.accuracy();
    info!(
        "{}: accuracy = {:.2}% over {} samples",
        name,
        accuracy * 100.0,
        confusion.total()
    );

    EvalReport { accuracy, confusion }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{WasteBatcher, WasteItem};
    use crate::model::WasteCnnConfig;
    use burn::backend::Autodiff;
    use burn::data::dataloader::batcher::Batcher;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    const SIZE: usize = 64;

    fn noise_batch(labels: &[usize]) -> WasteBatch<NdArray> {
        let batcher = WasteBatcher::<NdArray>::new(Default::default(), SIZE);
        let items = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                let image = (0..3 * SIZE * SIZE)
                    .map(|j| (((j * 13 + i * 7) % 255) as f32) / 255.0)
                    .collect();
                WasteItem::from_data(image, label, format!("noise{i}.jpg"))
            })
            .collect();
        batcher.batch(items)
    }

    #[test]
    fn test_accuracy_in_unit_interval() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        let batches = vec![noise_batch(&[0, 1, 2, 3])];
        let accuracy = evaluate::<TestBackend, _>(&model, &batches, &device, "test");

        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_empty_sweep_returns_zero() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        let accuracy = evaluate::<TestBackend, _>(&model, &[], &device, "empty");
        assert_eq!(accuracy, 0.0);
    }

    #[test]
    fn test_evaluation_does_not_mutate_parameters() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        let before: Vec<f32> = model.fc2.weight.val().into_data().to_vec().unwrap();

        let batches = vec![noise_batch(&[0, 1, 2, 3])];
        let _ = evaluate::<TestBackend, _>(&model, &batches, &device, "test");

        let after: Vec<f32> = model.fc2.weight.val().into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_detailed_report_counts_all_samples() {
        let device = Default::default();
        let model = WasteCnnConfig::new().init::<TestBackend>(&device).unwrap();

        let batches = vec![noise_batch(&[0, 1]), noise_batch(&[2, 3, 4])];
        let report = evaluate_detailed::<TestBackend, _>(&model, &batches, &device, "test");

        assert_eq!(report.confusion.total(), 5);
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert_eq!(report.confusion.num_classes(), 6);
    }
}

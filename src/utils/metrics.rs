//! Classification metric bookkeeping.

use serde::{Deserialize, Serialize};

/// Confusion matrix over a fixed number of classes.
///
/// Rows index the true class, columns the predicted class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Create an empty matrix for `num_classes` classes.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Record one (true label, predicted label) observation.
    ///
    /// Out-of-range labels are ignored.
    pub fn record(&mut self, target: usize, prediction: usize) {
        if target < self.num_classes && prediction < self.num_classes {
            self.counts[target][prediction] += 1;
        }
    }

    /// Number of classes tracked.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Total observations recorded.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|row| row.iter().sum::<usize>()).sum()
    }

    /// Correctly classified observations (the diagonal).
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.counts[i][i]).sum()
    }

    /// Overall accuracy, 0.0 when empty.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Per-class recall-style accuracy: diagonal over row sum, 0.0 for
    /// classes without observations.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|i| {
                let support: usize = self.counts[i].iter().sum();
                if support == 0 {
                    0.0
                } else {
                    self.counts[i][i] as f64 / support as f64
                }
            })
            .collect()
    }

    /// Raw counts, row = true class.
    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }
}

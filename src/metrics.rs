//! Confusion-matrix accumulation and derived segmentation metrics.

/// Square confusion matrix accumulated on the host. Rows are actual
/// classes, columns are predicted classes.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    n_classes: usize,
    counts: Vec<f64>,
    batches: usize,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0.0; n_classes * n_classes],
            batches: 0,
        }
    }

    /// Accumulate one batch of flattened (label, prediction) pairs.
    pub fn record(&mut self, labels: &[i64], preds: &[i64]) {
        debug_assert_eq!(labels.len(), preds.len());
        for (label, pred) in labels.iter().zip(preds.iter()) {
            let (l, p) = (*label as usize, *pred as usize);
            if l < self.n_classes && p < self.n_classes {
                self.counts[l * self.n_classes + p] += 1.0;
            }
        }
        self.batches += 1;
    }

    pub fn n_batches(&self) -> usize {
        self.batches
    }

    fn diag(&self, class: usize) -> f64 {
        self.counts[class * self.n_classes + class]
    }

    fn row_sum(&self, class: usize) -> f64 {
        self.counts[class * self.n_classes..(class + 1) * self.n_classes]
            .iter()
            .sum()
    }

    fn col_sum(&self, class: usize) -> f64 {
        (0..self.n_classes)
            .map(|row| self.counts[row * self.n_classes + class])
            .sum()
    }

    /// Per-class Dice `2*diag / (row + col)`; `None` when the class has no
    /// support in either labels or predictions.
    pub fn per_class_dice(&self) -> Vec<Option<f64>> {
        (0..self.n_classes)
            .map(|class| {
                let support = self.row_sum(class) + self.col_sum(class);
                (support > 0.0).then(|| 2.0 * self.diag(class) / support)
            })
            .collect()
    }

    /// Per-class IoU `diag / (row + col - diag)`; `None` without support.
    pub fn per_class_iou(&self) -> Vec<Option<f64>> {
        (0..self.n_classes)
            .map(|class| {
                let row = self.row_sum(class);
                let col = self.col_sum(class);
                let diag = self.diag(class);
                (row + col > 0.0).then(|| diag / (row + col - diag))
            })
            .collect()
    }

    /// Mean Dice over supported classes; 0.0 when none are supported.
    pub fn mean_dice(&self) -> f64 {
        mean_present(&self.per_class_dice())
    }

    /// Mean IoU over supported classes; 0.0 when none are supported.
    pub fn mean_iou(&self) -> f64 {
        mean_present(&self.per_class_iou())
    }
}

fn mean_present(values: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    }
}

/// In-memory trace of per-step scalars within one epoch.
#[derive(Debug, Default)]
pub struct EpochTrace {
    values: Vec<f32>,
}

impl EpochTrace {
    pub fn push(&mut self, value: f32) {
        self.values.push(value);
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f32>() / self.values.len() as f32
        }
    }
}

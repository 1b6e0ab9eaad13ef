//! Metrics Module for Model Evaluation
//!
//! Top-k categorical accuracy and running averages used by the training loop.

use serde::{Deserialize, Serialize};

/// Rank of `label` among `scores`: how many classes score strictly higher.
///
/// Ties count in the label's favour.
fn rank_of(scores: &[f32], label: usize) -> usize {
    let target = scores[label];
    scores.iter().filter(|&&s| s > target).count()
}

/// Count the rows of a flattened `[batch, num_classes]` score matrix whose
/// label is among the `k` highest scores.
pub fn top_k_hits(scores: &[f32], num_classes: usize, labels: &[usize], k: usize) -> usize {
    if num_classes == 0 || k == 0 {
        return 0;
    }

    scores
        .chunks(num_classes)
        .zip(labels.iter())
        .filter(|(row, &label)| label < row.len() && rank_of(row, label) < k)
        .count()
}

/// Indices of the `k` highest scores, best first.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.into_iter().take(k).map(|(i, _)| i).collect()
}

/// Accumulates top-1 and top-k hits over many batches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopKAccuracy {
    pub k: usize,
    pub top1_correct: usize,
    pub top_k_correct: usize,
    pub total: usize,
}

impl TopKAccuracy {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Add a batch of flattened scores `[batch, num_classes]`
    pub fn add_batch(&mut self, scores: &[f32], num_classes: usize, labels: &[usize]) {
        self.top1_correct += top_k_hits(scores, num_classes, labels, 1);
        self.top_k_correct += top_k_hits(scores, num_classes, labels, self.k);
        self.total += labels.len();
    }

    pub fn top1(&self) -> f64 {
        if self.total > 0 {
            self.top1_correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn top_k(&self) -> f64 {
        if self.total > 0 {
            self.top_k_correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.top1_correct = 0;
        self.top_k_correct = 0;
        self.total = 0;
    }
}

/// Running average tracker
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Average of the values seen so far, `0.0` when empty
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_top_k: f64,
    pub val_loss: f64,
    pub val_top1: f64,
    pub val_top_k: f64,
    pub learning_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_hits() {
        // Two samples, four classes
        let scores = vec![
            0.1, 0.6, 0.2, 0.1, // best: 1, then 2
            0.4, 0.3, 0.2, 0.1, // best: 0, then 1
        ];

        assert_eq!(top_k_hits(&scores, 4, &[1, 1], 1), 1);
        assert_eq!(top_k_hits(&scores, 4, &[1, 1], 2), 2);
        // class 3 ties class 0 in the first row, so only that row is a hit
        assert_eq!(top_k_hits(&scores, 4, &[3, 3], 3), 1);
        assert_eq!(top_k_hits(&scores, 4, &[3, 3], 4), 2);
    }

    #[test]
    fn test_top_k_ties_count_as_hit() {
        let scores = vec![0.5, 0.5, 0.0];
        assert_eq!(top_k_hits(&scores, 3, &[1], 1), 1);
    }

    #[test]
    fn test_top_k_ignores_out_of_range_label() {
        let scores = vec![0.5, 0.5];
        assert_eq!(top_k_hits(&scores, 2, &[7], 2), 0);
    }

    #[test]
    fn test_top_k_indices() {
        let scores = vec![0.1, 0.7, 0.05, 0.15];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 3, 0]);
    }

    #[test]
    fn test_top_k_accuracy_tracker() {
        let mut acc = TopKAccuracy::new(2);
        acc.add_batch(&[0.9, 0.1, 0.0, 0.2, 0.3, 0.5], 3, &[0, 1]);

        assert_eq!(acc.total, 2);
        assert!((acc.top1() - 0.5).abs() < 1e-9);
        assert!((acc.top_k() - 1.0).abs() < 1e-9);

        acc.reset();
        assert_eq!(acc.top1(), 0.0);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();

        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);

        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 0.001);

        avg.reset();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);
    }
}

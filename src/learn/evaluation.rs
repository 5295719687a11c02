//! Weighted confusion-matrix evaluation of a trained model.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::dataset::{Dataset, Row};

/// Confusion matrix indexed `[actual][predicted]`, in instance weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    labels: Vec<String>,
    matrix: Vec<Vec<f64>>,
    cross_validated: bool,
}

impl Evaluation {
    pub fn new(labels: Vec<String>) -> Self {
        let k = labels.len();
        Self {
            labels,
            matrix: vec![vec![0.0; k]; k],
            cross_validated: false,
        }
    }

    pub fn record(&mut self, actual: usize, predicted: usize, weight: f64) {
        self.matrix[actual][predicted] += weight;
    }

    /// Score `classify` on every row.
    pub fn on_rows(
        labels: Vec<String>,
        rows: &[Row],
        classify: impl Fn(&[Option<f64>]) -> usize,
    ) -> Self {
        let mut eval = Self::new(labels);
        for row in rows {
            eval.record(row.class, classify(&row.values), row.weight);
        }
        eval
    }

    /// Stratification-free k-fold cross-validation with a seeded shuffle.
    ///
    /// `train` receives the training rows of a fold and returns a classifier
    /// for the held-out rows.
    pub fn cross_validate<F, C>(data: &Dataset, folds: usize, seed: u64, mut train: F) -> Self
    where
        F: FnMut(Dataset) -> C,
        C: Fn(&[Option<f64>]) -> usize,
    {
        let mut order: Vec<usize> = (0..data.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let mut eval = Self::new(data.class_labels().to_vec());
        eval.cross_validated = true;
        for fold in 0..folds {
            let mut training = Vec::new();
            let mut held_out = Vec::new();
            for (position, &row) in order.iter().enumerate() {
                if position % folds == fold {
                    held_out.push(row);
                } else {
                    training.push(data.rows()[row].clone());
                }
            }
            let classifier = train(data.with_rows(training));
            for row in held_out {
                let row = &data.rows()[row];
                eval.record(row.class, classifier(&row.values), row.weight);
            }
        }
        eval
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_cross_validated(&self) -> bool {
        self.cross_validated
    }

    pub fn true_positives(&self, class: usize) -> f64 {
        self.matrix[class][class]
    }

    pub fn false_positives(&self, class: usize) -> f64 {
        (0..self.labels.len())
            .filter(|&a| a != class)
            .map(|a| self.matrix[a][class])
            .sum()
    }

    pub fn false_negatives(&self, class: usize) -> f64 {
        (0..self.labels.len())
            .filter(|&p| p != class)
            .map(|p| self.matrix[class][p])
            .sum()
    }

    pub fn precision(&self, class: usize) -> f64 {
        let tp = self.true_positives(class);
        let denom = tp + self.false_positives(class);
        if denom == 0.0 { 0.0 } else { tp / denom }
    }

    pub fn recall(&self, class: usize) -> f64 {
        let tp = self.true_positives(class);
        let denom = tp + self.false_negatives(class);
        if denom == 0.0 { 0.0 } else { tp / denom }
    }

    pub fn f_measure(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.matrix.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total_weight();
        if total == 0.0 {
            return 0.0;
        }
        (0..self.labels.len()).map(|c| self.matrix[c][c]).sum::<f64>() / total
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.cross_validated {
            "cross-validation"
        } else {
            "training set"
        };
        writeln!(
            f,
            "=== Evaluation on {source} ({:.1} weighted instances, accuracy {:.4}) ===",
            self.total_weight(),
            self.accuracy()
        )?;
        writeln!(f, "{:>10} {:>10} {:>10}  class", "precision", "recall", "f-measure")?;
        for (c, label) in self.labels.iter().enumerate() {
            writeln!(
                f,
                "{:>10.4} {:>10.4} {:>10.4}  {label}",
                self.precision(c),
                self.recall(c),
                self.f_measure(c)
            )?;
        }
        Ok(())
    }
}

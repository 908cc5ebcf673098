//! Classification metrics on a held-out split

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Precision, recall and F1 of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation of a fitted classifier.
///
/// Undefined ratios (no predicted or no true samples) count as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub f1_weighted: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
    /// Rows are true classes, columns predicted classes
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: Vec<ClassReport>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn confusion(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes && p < n_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}

impl ClassificationMetrics {
    /// Compare predictions with the truth; `labels` names class codes in order
    pub fn compute(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::config(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(PipelineError::config("cannot evaluate on an empty split"));
        }

        let n_classes = labels.len();
        let matrix = confusion(y_true, y_pred, n_classes);
        let total = y_true.len();

        let per_class: Vec<ClassReport> = (0..n_classes)
            .map(|c| {
                let tp = matrix[c][c];
                let support: usize = matrix[c].iter().sum();
                let predicted: usize = matrix.iter().map(|row| row[c]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                ClassReport {
                    label: labels[c].clone(),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support,
                }
            })
            .collect();

        // macro averages cover classes that occur in the truth or the predictions
        let active: Vec<&ClassReport> = per_class
            .iter()
            .enumerate()
            .filter(|(c, r)| r.support > 0 || matrix.iter().any(|row| row[*c] > 0))
            .map(|(_, r)| r)
            .collect();
        let macro_avg = |f: fn(&ClassReport) -> f64| {
            if active.is_empty() {
                0.0
            } else {
                active.iter().map(|r| f(r)).sum::<f64>() / active.len() as f64
            }
        };
        let weighted_avg =
            |f: fn(&ClassReport) -> f64| per_class.iter().map(|r| f(r) * r.support as f64).sum::<f64>() / total as f64;

        let correct: usize = (0..n_classes).map(|c| matrix[c][c]).sum();
        let precision_weighted = weighted_avg(|r| r.precision);
        let recall_weighted = weighted_avg(|r| r.recall);
        let f1_weighted = weighted_avg(|r| r.f1);
        let precision_macro = macro_avg(|r| r.precision);
        let recall_macro = macro_avg(|r| r.recall);
        let f1_macro = macro_avg(|r| r.f1);

        Ok(Self {
            accuracy: ratio(correct, total),
            precision_weighted,
            recall_weighted,
            f1_weighted,
            precision_macro,
            recall_macro,
            f1_macro,
            confusion_matrix: matrix,
            per_class,
        })
    }

    pub fn log_summary(&self) {
        info!(
            accuracy = format!("{:.4}", self.accuracy),
            f1_weighted = format!("{:.4}", self.f1_weighted),
            f1_macro = format!("{:.4}", self.f1_macro),
            precision_weighted = format!("{:.4}", self.precision_weighted),
            recall_weighted = format!("{:.4}", self.recall_weighted),
            "Held-out evaluation"
        );
        for report in &self.per_class {
            info!(
                class = %report.label,
                precision = format!("{:.3}", report.precision),
                recall = format!("{:.3}", report.recall),
                f1 = format!("{:.3}", report.f1),
                support = report.support,
                "Class report"
            );
        }
    }
}

/// Support-weighted F1 over `n_classes` codes, the cross-validation score
pub fn f1_weighted(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let matrix = confusion(y_true, y_pred, n_classes);
    if y_true.is_empty() {
        return 0.0;
    }
    let weighted: f64 = (0..n_classes)
        .map(|c| {
            let tp = matrix[c][c];
            let support: usize = matrix[c].iter().sum();
            let predicted: usize = matrix.iter().map(|row| row[c]).sum();
            f1(ratio(tp, predicted), ratio(tp, support)) * support as f64
        })
        .sum();
    weighted / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_perfect_predictions() {
        let y = vec![0, 1, 2, 1, 0];
        let m = ClassificationMetrics::compute(&y, &y, &labels()).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1_weighted, 1.0);
        assert_eq!(m.f1_macro, 1.0);
        assert_eq!(m.confusion_matrix[1][1], 2);
    }

    #[test]
    fn test_zero_division_counts_as_zero() {
        // class 2 is never predicted
        let y_true = vec![0, 0, 1, 2];
        let y_pred = vec![0, 0, 1, 1];
        let m = ClassificationMetrics::compute(&y_true, &y_pred, &labels()).unwrap();

        let c = &m.per_class[2];
        assert_eq!(c.precision, 0.0);
        assert_eq!(c.recall, 0.0);
        assert_eq!(c.support, 1);
        assert_eq!(m.accuracy, 0.75);
        assert!((m.precision_macro - (1.0 + 0.5 + 0.0) / 3.0).abs() < 1e-12);
        assert!((m.recall_weighted - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_f1_matches_report() {
        let y_true = vec![0, 1, 1, 2, 2, 2];
        let y_pred = vec![0, 2, 1, 2, 1, 2];
        let m = ClassificationMetrics::compute(&y_true, &y_pred, &labels()).unwrap();
        assert!((f1_weighted(&y_true, &y_pred, 3) - m.f1_weighted).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(ClassificationMetrics::compute(&[0, 1], &[0], &labels()).is_err());
    }
}

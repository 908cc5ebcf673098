//! Stratified folding and train/test splitting

use crate::error::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Number of samples per class code
pub fn class_counts(y: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &c in y {
        if c < n_classes {
            counts[c] += 1;
        }
    }
    counts
}

/// Reject targets that stratified folding cannot handle: fewer than two
/// distinct classes, or a class with fewer than `min_per_class` samples.
pub fn validate_classes(y: &[usize], n_classes: usize, min_per_class: usize) -> Result<()> {
    let counts = class_counts(y, n_classes);
    let present = counts.iter().filter(|&&c| c > 0).count();
    if present < 2 {
        return Err(PipelineError::config(format!(
            "need at least 2 distinct classes, found {}",
            present
        )));
    }
    if let Some((class, &count)) = counts.iter().enumerate().find(|(_, &c)| c < min_per_class) {
        return Err(PipelineError::config(format!(
            "class {} has {} samples, at least {} required",
            class, count, min_per_class
        )));
    }
    Ok(())
}

/// Indices of each class, shuffled with one seeded generator
fn shuffled_by_class(y: &[usize], rng: &mut StdRng) -> Vec<Vec<usize>> {
    let n_classes = y.iter().max().map_or(0, |m| m + 1);
    let mut by_class = vec![Vec::new(); n_classes];
    for (i, &c) in y.iter().enumerate() {
        by_class[c].push(i);
    }
    for indices in &mut by_class {
        indices.shuffle(rng);
    }
    by_class
}

/// K-fold splitter preserving class proportions in every fold
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    random_state: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, random_state: u64) -> Result<Self> {
        if n_splits < 2 {
            return Err(PipelineError::config(format!("cv_folds must be at least 2, got {}", n_splits)));
        }
        Ok(Self {
            n_splits,
            random_state,
        })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `(train, test)` index pairs, one per fold, each sorted ascending
    pub fn split(&self, y: &[usize]) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let by_class = shuffled_by_class(y, &mut rng);

        let mut fold_of = vec![0usize; y.len()];
        // rotate the starting fold per class so fold sizes stay balanced
        let mut offset = 0;
        for indices in &by_class {
            if !indices.is_empty() && indices.len() < self.n_splits {
                return Err(PipelineError::config(format!(
                    "a class has {} samples, fewer than {} folds",
                    indices.len(),
                    self.n_splits
                )));
            }
            for (j, &i) in indices.iter().enumerate() {
                fold_of[i] = (offset + j) % self.n_splits;
            }
            offset = (offset + indices.len()) % self.n_splits;
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) = (0..y.len()).partition(|&i| fold_of[i] == fold);
                (train, test)
            })
            .collect())
    }
}

/// Stratified `(train, test)` split; every class with at least two samples
/// contributes at least one sample to each side.
pub fn train_test_split(y: &[usize], test_size: f64, random_state: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::config(format!("test_size must be in (0, 1), got {}", test_size)));
    }

    let mut rng = StdRng::seed_from_u64(random_state);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();
    for indices in shuffled_by_class(y, &mut rng) {
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<usize> {
        // 12 of class 0, 8 of class 1, 5 of class 2
        let mut y = vec![0; 12];
        y.extend(vec![1; 8]);
        y.extend(vec![2; 5]);
        y
    }

    #[test]
    fn test_folds_partition_all_samples() {
        let y = labels();
        let folds = StratifiedKFold::new(5, 42).unwrap().split(&y).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, test)| test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..y.len()).collect::<Vec<_>>());

        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), y.len());
            assert!(test.iter().all(|i| !train.contains(i)));
            // every class appears in every test fold
            for class in 0..3 {
                assert!(test.iter().any(|&i| y[i] == class));
            }
        }
    }

    #[test]
    fn test_folds_are_reproducible() {
        let y = labels();
        let a = StratifiedKFold::new(3, 7).unwrap().split(&y).unwrap();
        let b = StratifiedKFold::new(3, 7).unwrap().split(&y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_samples_for_folds() {
        let y = vec![0, 0, 0, 0, 0, 1, 1];
        assert!(StratifiedKFold::new(5, 42).unwrap().split(&y).unwrap_err().is_configuration());
        assert!(StratifiedKFold::new(1, 42).is_err());
    }

    #[test]
    fn test_split_is_stratified() {
        let y = labels();
        let (train, test) = train_test_split(&y, 0.2, 42).unwrap();
        assert_eq!(train.len() + test.len(), y.len());

        let test_counts = class_counts(&test.iter().map(|&i| y[i]).collect::<Vec<_>>(), 3);
        assert_eq!(test_counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_validate_classes() {
        assert!(validate_classes(&[0, 0, 0], 1, 2).is_err());
        assert!(validate_classes(&[0, 0, 1], 2, 2).is_err());
        assert!(validate_classes(&[0, 0, 1, 1], 2, 2).is_ok());
    }
}

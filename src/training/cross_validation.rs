//! Fold assignment and cross-validation splitters
//!
//! A [`FoldAssignment`] is computed once per run and shared, read-only, by
//! every candidate family so their out-of-fold predictions line up row by row.

use crate::error::{Result, StackError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Mapping from training row to fold index in `[0, k)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    folds: Vec<usize>,
    n_folds: usize,
    seed: u64,
}

/// Assign `n_rows` training rows to `k` folds with a seeded shuffle.
///
/// Rows are shuffled with ChaCha8 and dealt into contiguous chunks; the first
/// `n_rows % k` folds receive one extra row, so fold sizes differ by at most one.
pub fn assign_folds(n_rows: usize, k: usize, seed: u64) -> Result<FoldAssignment> {
    if k < 2 {
        return Err(StackError::InvalidConfiguration(format!(
            "fold count must be at least 2, got {}",
            k
        )));
    }
    if n_rows == 0 {
        return Err(StackError::InvalidConfiguration(
            "cannot assign folds over an empty training set".to_string(),
        ));
    }
    if k > n_rows {
        return Err(StackError::InvalidConfiguration(format!(
            "fold count ({}) exceeds number of training rows ({})",
            k, n_rows
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n_rows / k;
    let remainder = n_rows % k;

    let mut folds = vec![0usize; n_rows];
    let mut current = 0;
    for fold_idx in 0..k {
        let fold_size = if fold_idx < remainder { base + 1 } else { base };
        for &row in &indices[current..current + fold_size] {
            folds[row] = fold_idx;
        }
        current += fold_size;
    }

    Ok(FoldAssignment {
        folds,
        n_folds: k,
        seed,
    })
}

impl FoldAssignment {
    /// Number of folds
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Number of assigned rows
    pub fn n_rows(&self) -> usize {
        self.folds.len()
    }

    /// Seed the assignment was drawn with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fold of a given row, `None` past the last row
    pub fn fold_of(&self, row: usize) -> Option<usize> {
        self.folds.get(row).copied()
    }

    /// Per-row fold ids in training-row order
    pub fn as_slice(&self) -> &[usize] {
        &self.folds
    }

    /// Number of rows in each fold
    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_folds];
        for &f in &self.folds {
            sizes[f] += 1;
        }
        sizes
    }

    /// Rows held out by `fold`, ascending
    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows used for fitting when `fold` is held out, ascending
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(_, &f)| f != fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// All train/test splits, one per fold
    pub fn splits(&self) -> Vec<CVSplit> {
        (0..self.n_folds)
            .map(|fold_idx| CVSplit {
                train_indices: self.train_indices(fold_idx),
                test_indices: self.test_indices(fold_idx),
                fold_idx,
            })
            .collect()
    }
}

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize },
    /// Repeated K-Fold, reseeded per repeat
    RepeatedKFold { n_splits: usize, n_repeats: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5 }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits } => {
                Ok(assign_folds(n_samples, *n_splits, self.random_state)?.splits())
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                if *n_repeats == 0 {
                    return Err(StackError::InvalidConfiguration(
                        "n_repeats must be at least 1".to_string(),
                    ));
                }
                let mut all_splits = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    let seed = self.random_state.wrapping_add(repeat as u64);
                    let mut splits = assign_folds(n_samples, *n_splits, seed)?.splits();
                    // Fold indices stay unique across repeats
                    for split in &mut splits {
                        split.fold_idx += repeat * n_splits;
                    }
                    all_splits.extend(splits);
                }
                Ok(all_splits)
            }
        }
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Sample standard deviation of scores
    pub std_score: f64,
    /// Standard error of the mean score
    pub std_error: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds.max(1) as f64;
        let variance = if n_folds > 1 {
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / (n_folds - 1) as f64
        } else {
            0.0
        };
        let std_score = variance.sqrt();
        let std_error = std_score / (n_folds.max(1) as f64).sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            std_error,
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_row_in_exactly_one_fold() {
        for (n, k) in [(100, 4), (101, 4), (7, 7), (10, 3), (53, 10)] {
            let folds = assign_folds(n, k, 7).unwrap();
            assert_eq!(folds.n_rows(), n);

            let mut all_test: Vec<usize> = (0..k).flat_map(|f| folds.test_indices(f)).collect();
            all_test.sort();
            assert_eq!(all_test, (0..n).collect::<Vec<_>>());

            let sizes = folds.fold_sizes();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1, "fold sizes {:?} differ by more than one", sizes);
        }
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let a = assign_folds(50, 5, 123).unwrap();
        let b = assign_folds(50, 5, 123).unwrap();
        let c = assign_folds(50, 5, 124).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.as_slice(), c.as_slice());
    }

    #[test]
    fn test_invalid_fold_counts() {
        assert!(matches!(assign_folds(10, 1, 0), Err(StackError::InvalidConfiguration(_))));
        assert!(matches!(assign_folds(3, 4, 0), Err(StackError::InvalidConfiguration(_))));
        assert!(matches!(assign_folds(0, 2, 0), Err(StackError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_splits_do_not_overlap() {
        let folds = assign_folds(30, 3, 1).unwrap();
        for split in folds.splits() {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 30);
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
                assert_eq!(folds.fold_of(*idx), Some(split.fold_idx));
            }
        }
        assert_eq!(folds.fold_of(30), None);
    }

    #[test]
    fn test_repeated_k_fold() {
        let cv = CrossValidator::new(CVStrategy::RepeatedKFold { n_splits: 5, n_repeats: 3 })
            .with_random_state(42);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 15);
        let ids: Vec<usize> = splits.iter().map(|s| s.fold_idx).collect();
        assert_eq!(ids, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_cv_results_standard_error() {
        let results = CVResults::from_scores(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((results.mean_score - 2.5).abs() < 1e-12);
        let sd = (5.0f64 / 3.0).sqrt();
        assert!((results.std_score - sd).abs() < 1e-12);
        assert!((results.std_error - sd / 2.0).abs() < 1e-12);
    }
}

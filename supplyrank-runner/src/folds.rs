//! Cross-validation fold splitting.
//!
//! Folds are deterministic in the seed. When every class has at least
//! `n_folds` rows the split is stratified: each class is shuffled and dealt
//! round-robin across folds, so every validation fold sees both classes.
//! Otherwise rows are shuffled and cut into `n_folds` contiguous chunks.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyrank_core::rng::RngHierarchy;

// ─── Types ───────────────────────────────────────────────────────────

/// Row positions of one train/validation split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub fold_index: usize,
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldStrategy {
    Stratified,
    Shuffled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("need at least 2 folds, got {0}")]
    TooFewFolds(usize),

    #[error("cannot split {rows} rows into {n_folds} folds")]
    TooFewRows { rows: usize, n_folds: usize },
}

// ─── Fold creation ───────────────────────────────────────────────────

/// Pick the strategy for `labels`: stratified when the minority class fills every fold.
pub fn strategy_for(labels: &[f64], n_folds: usize) -> FoldStrategy {
    let positives = labels.iter().filter(|&&y| y == 1.0).count();
    let minority = positives.min(labels.len() - positives);
    if minority >= n_folds {
        FoldStrategy::Stratified
    } else {
        FoldStrategy::Shuffled
    }
}

/// Split row positions `0..labels.len()` into `n_folds` folds.
pub fn create_folds(labels: &[f64], n_folds: usize, seed: u64) -> Result<Vec<Fold>, FoldError> {
    if n_folds < 2 {
        return Err(FoldError::TooFewFolds(n_folds));
    }
    if n_folds > labels.len() {
        return Err(FoldError::TooFewRows {
            rows: labels.len(),
            n_folds,
        });
    }

    let rng = RngHierarchy::new(seed);
    let strategy = strategy_for(labels, n_folds);
    let mut assignment = vec![0usize; labels.len()];

    match strategy {
        FoldStrategy::Stratified => {
            // Continue the round-robin across classes to keep fold sizes within one row.
            let mut next = 0;
            for (class, label) in [0.0, 1.0].into_iter().enumerate() {
                let mut rows: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == label).collect();
                rows.shuffle(&mut rng.rng_for("stratum", class as u64));
                for row in rows {
                    assignment[row] = next % n_folds;
                    next += 1;
                }
            }
        }
        FoldStrategy::Shuffled => {
            let mut rows: Vec<usize> = (0..labels.len()).collect();
            rows.shuffle(&mut rng.rng_for("shuffle", 0));
            let base = labels.len() / n_folds;
            let extra = labels.len() % n_folds;
            let mut start = 0;
            for fold in 0..n_folds {
                let size = base + usize::from(fold < extra);
                for &row in &rows[start..start + size] {
                    assignment[row] = fold;
                }
                start += size;
            }
        }
    }

    let folds: Vec<Fold> = (0..n_folds)
        .map(|k| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| assignment[i] == k);
            Fold {
                fold_index: k,
                train,
                valid,
            }
        })
        .collect();

    tracing::debug!(?strategy, n_folds, rows = labels.len(), "created folds");
    Ok(folds)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pos: usize, neg: usize) -> Vec<f64> {
        let mut y = vec![1.0; pos];
        y.extend(vec![0.0; neg]);
        y
    }

    #[test]
    fn folds_partition_every_row_once() {
        let y = labels(4, 9);
        let folds = create_folds(&y, 3, 42).unwrap();

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.valid.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..13).collect::<Vec<_>>());
        for f in &folds {
            assert_eq!(f.train.len() + f.valid.len(), 13);
            assert!(f.train.iter().all(|i| !f.valid.contains(i)));
        }
    }

    #[test]
    fn stratified_folds_hold_both_classes() {
        let y = labels(5, 20);
        assert_eq!(strategy_for(&y, 5), FoldStrategy::Stratified);
        for f in create_folds(&y, 5, 1).unwrap() {
            assert_eq!(f.valid.iter().filter(|&&i| y[i] == 1.0).count(), 1);
        }
    }

    #[test]
    fn rare_positives_fall_back_to_shuffled() {
        let y = labels(1, 10);
        assert_eq!(strategy_for(&y, 3), FoldStrategy::Shuffled);
        let sizes: Vec<usize> = create_folds(&y, 3, 1).unwrap().iter().map(|f| f.valid.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[test]
    fn same_seed_same_folds() {
        let y = labels(6, 14);
        assert_eq!(create_folds(&y, 4, 7).unwrap(), create_folds(&y, 4, 7).unwrap());
        assert_ne!(create_folds(&y, 4, 7).unwrap(), create_folds(&y, 4, 8).unwrap());
    }

    #[test]
    fn rejects_bad_fold_counts() {
        assert_eq!(create_folds(&labels(1, 1), 1, 0), Err(FoldError::TooFewFolds(1)));
        assert_eq!(
            create_folds(&labels(1, 1), 3, 0),
            Err(FoldError::TooFewRows { rows: 2, n_folds: 3 })
        );
    }
}

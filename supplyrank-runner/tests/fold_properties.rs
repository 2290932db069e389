//! Property tests for cross-validation folds.

use proptest::prelude::*;
use supplyrank_runner::folds::{create_folds, strategy_for, FoldStrategy};

fn arb_labels() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![Just(0.0), Just(1.0)], 4..80)
}

proptest! {
    /// Every row is validated exactly once and never trains its own fold.
    #[test]
    fn folds_partition_rows(labels in arb_labels(), n_folds in 2usize..5, seed in any::<u64>()) {
        prop_assume!(n_folds <= labels.len());
        let folds = create_folds(&labels, n_folds, seed).unwrap();

        prop_assert_eq!(folds.len(), n_folds);
        let mut hits = vec![0usize; labels.len()];
        for f in &folds {
            for &i in &f.valid {
                hits[i] += 1;
                prop_assert!(!f.train.contains(&i));
            }
            prop_assert_eq!(f.train.len() + f.valid.len(), labels.len());
        }
        prop_assert!(hits.iter().all(|&h| h == 1));
    }

    /// Fold sizes differ by at most one row.
    #[test]
    fn folds_are_balanced(labels in arb_labels(), n_folds in 2usize..5, seed in any::<u64>()) {
        prop_assume!(n_folds <= labels.len());
        let sizes: Vec<usize> = create_folds(&labels, n_folds, seed)
            .unwrap()
            .iter()
            .map(|f| f.valid.len())
            .collect();
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        prop_assert!(max - min <= 1);
    }

    /// Stratified folds give every validation split at least one row of each class.
    #[test]
    fn stratified_folds_see_both_classes(labels in arb_labels(), n_folds in 2usize..5, seed in any::<u64>()) {
        prop_assume!(strategy_for(&labels, n_folds) == FoldStrategy::Stratified);
        for f in create_folds(&labels, n_folds, seed).unwrap() {
            prop_assert!(f.valid.iter().any(|&i| labels[i] == 1.0));
            prop_assert!(f.valid.iter().any(|&i| labels[i] == 0.0));
        }
    }
}

// ============================================================
// Layer 4 - Stratified K-Fold Splitter
// ============================================================
// Partitions the samples into k disjoint folds so that every
// fold keeps (roughly) the global class ratio:
//
//   for each class independently:
//     1. shuffle that class's samples with a seeded RNG
//     2. deal them round-robin into folds 0, 1, ..., k-1, 0, ...
//
// Round-robin dealing means fold sizes differ by at most one
// sample per class, and a class with at least k samples lands
// in every fold.
//
// Fold i's training subset is the union of every other fold.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom on a
// ChaCha8 RNG so the same seed gives the same folds on every
// platform.

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
    traits::Labeled,
};

/// One cross-validation round: train on `train`, validate on `validation`.
#[derive(Debug, Clone)]
pub struct FoldSplit<T> {
    pub fold_index: usize,
    pub train: Vec<T>,
    pub validation: Vec<T>,
}

impl<T: Labeled> FoldSplit<T> {
    pub fn train_count(&self, label: Label) -> usize {
        self.train.iter().filter(|s| s.label() == label).count()
    }

    pub fn validation_count(&self, label: Label) -> usize {
        self.validation.iter().filter(|s| s.label() == label).count()
    }
}

/// Fold index for every sample, in input order.
pub fn assign_folds<T: Labeled>(samples: &[T], k: usize, seed: u64) -> PipelineResult<Vec<usize>> {
    if k < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "fold count must be at least 2, got {k}"
        )));
    }

    let mut assignment = vec![0usize; samples.len()];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    for label in Label::ALL {
        let mut members: Vec<usize> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.label() == label)
            .map(|(i, _)| i)
            .collect();

        if members.len() < k {
            return Err(PipelineError::InsufficientData {
                label,
                found: members.len(),
                required: k,
            });
        }

        members.shuffle(&mut rng);
        for (position, &sample_index) in members.iter().enumerate() {
            assignment[sample_index] = position % k;
        }
    }

    Ok(assignment)
}

/// Split into k (train, validation) pairs, borrowing the samples.
pub fn stratified_k_fold<T: Labeled>(
    samples: &[T],
    k: usize,
    seed: u64,
) -> PipelineResult<Vec<FoldSplit<&T>>> {
    let assignment = assign_folds(samples, k, seed)?;

    let folds: Vec<FoldSplit<&T>> = (0..k)
        .map(|fold_index| {
            let (validation, train): (Vec<(usize, &T)>, Vec<(usize, &T)>) = samples
                .iter()
                .enumerate()
                .partition(|(i, _)| assignment[*i] == fold_index);
            FoldSplit {
                fold_index,
                train: train.into_iter().map(|(_, s)| s).collect(),
                validation: validation.into_iter().map(|(_, s)| s).collect(),
            }
        })
        .collect();

    for fold in &folds {
        tracing::debug!(
            "Fold {}: {} training, {} validation",
            fold.fold_index,
            fold.train.len(),
            fold.validation.len(),
        );
    }

    Ok(folds)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: usize,
        label: Label,
    }

    impl Labeled for Item {
        fn label(&self) -> Label {
            self.label
        }
    }

    fn dataset(match_ready: usize, not_match_ready: usize) -> Vec<Item> {
        (0..match_ready)
            .map(|id| Item { id, label: Label::MatchReady })
            .chain((0..not_match_ready).map(|i| Item {
                id: match_ready + i,
                label: Label::NotMatchReady,
            }))
            .collect()
    }

    #[test]
    fn test_thirty_per_class_three_folds() {
        let items = dataset(30, 30);
        let folds = stratified_k_fold(&items, 3, 42).unwrap();
        assert_eq!(folds.len(), 3);
        for fold in &folds {
            for label in Label::ALL {
                assert_eq!(fold.validation_count(label), 10);
                assert_eq!(fold.train_count(label), 20);
            }
        }
    }

    #[test]
    fn test_validation_folds_partition_the_dataset() {
        let items = dataset(11, 7);
        let folds = stratified_k_fold(&items, 3, 9).unwrap();

        let mut seen = HashSet::new();
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.validation.len(), items.len());
            for item in &fold.validation {
                assert!(seen.insert(item.id), "sample {} in two folds", item.id);
            }
            let train_ids: HashSet<usize> = fold.train.iter().map(|i| i.id).collect();
            assert!(fold.validation.iter().all(|i| !train_ids.contains(&i.id)));
        }
        assert_eq!(seen.len(), items.len());
    }

    #[test]
    fn test_uneven_classes_stay_balanced_and_non_empty() {
        for (a, b, k) in [(3, 3, 3), (5, 13, 4), (17, 6, 5), (100, 3, 3)] {
            let items = dataset(a, b);
            let folds = stratified_k_fold(&items, k, 1).unwrap();
            assert_eq!(folds.len(), k);
            for label in Label::ALL {
                let sizes: Vec<usize> = folds.iter().map(|f| f.validation_count(label)).collect();
                let min = *sizes.iter().min().unwrap();
                let max = *sizes.iter().max().unwrap();
                assert!(min >= 1);
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_same_seed_same_folds() {
        let items = dataset(12, 9);
        assert_eq!(assign_folds(&items, 3, 5).unwrap(), assign_folds(&items, 3, 5).unwrap());
    }

    #[test]
    fn test_too_few_samples_in_a_class() {
        let items = dataset(10, 2);
        let err = stratified_k_fold(&items, 3, 42).unwrap_err();
        match err {
            PipelineError::InsufficientData { label, found, required } => {
                assert_eq!(label, Label::NotMatchReady);
                assert_eq!(found, 2);
                assert_eq!(required, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_single_fold() {
        let items = dataset(4, 4);
        assert!(matches!(
            assign_folds(&items, 1, 0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PipelineError;
use crate::types::{ItemIdx, UserIdx};

/// An observed (positive) user-item engagement. Carries an implicit label of 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user: UserIdx,
    pub item: ItemIdx,
}

impl Interaction {
    /// Construct an interaction from dense indices.
    pub fn new(user: UserIdx, item: ItemIdx) -> Self {
        Self { user, item }
    }
}

/// Which interaction split a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// A user flagged by sparse-user inspection, with its interaction count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SparseUser {
    pub user: UserIdx,
    pub interactions: usize,
}

/// Positive train/test interactions plus per-user negative candidate pools.
///
/// Built once per process and immutable afterward; datasets wrap references to
/// it without copying. Pool/positive disjointness is validated here, at load
/// time, so violations never surface mid-epoch.
#[derive(Clone, Debug)]
pub struct InteractionCorpus {
    num_user: usize,
    num_item: usize,
    train: Vec<Interaction>,
    test: Vec<Interaction>,
    positive_sets: Vec<Vec<ItemIdx>>,
    test_positive_sets: Vec<Vec<ItemIdx>>,
    train_pools: Vec<Vec<ItemIdx>>,
    test_pools: Vec<Vec<ItemIdx>>,
}

impl InteractionCorpus {
    /// Assemble a corpus from positive splits and precomputed per-user pools.
    ///
    /// `num_user`/`num_item` are taken from the train split as
    /// `max(index) + 1`. Each pool vector is indexed by user and must cover
    /// every user. The train pool must be disjoint from the user's train
    /// positives; the test pool additionally from the test positives.
    pub fn load(
        train: Vec<Interaction>,
        test: Vec<Interaction>,
        train_pools: Vec<Vec<ItemIdx>>,
        test_pools: Vec<Vec<ItemIdx>>,
    ) -> Result<Self, PipelineError> {
        let (num_user, num_item) = split_bounds(&train)?;
        let corpus = Self {
            num_user,
            num_item,
            positive_sets: group_by_user(&train, num_user),
            test_positive_sets: group_by_user(&test, num_user),
            train,
            test,
            train_pools,
            test_pools,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    /// Assemble a corpus for sources that ship no negative files, deriving
    /// both pools: every item minus the user's train positives for training,
    /// minus the test positives as well for evaluation.
    pub fn load_deriving(
        train: Vec<Interaction>,
        test: Vec<Interaction>,
    ) -> Result<Self, PipelineError> {
        let (num_user, num_item) = split_bounds(&train)?;
        let positives = group_by_user(&train, num_user);
        let test_positives = group_by_user(&test, num_user);

        let mut train_pools = Vec::with_capacity(num_user);
        let mut test_pools = Vec::with_capacity(num_user);
        for user in 0..num_user {
            train_pools.push(derive_negative_pool(num_item, &[&positives[user]]));
            test_pools.push(derive_negative_pool(
                num_item,
                &[&positives[user], &test_positives[user]],
            ));
        }
        debug!(num_user, num_item, "derived negative pools");

        Self::load_with_derived(train, test, positives, test_positives, train_pools, test_pools)
    }

    fn load_with_derived(
        train: Vec<Interaction>,
        test: Vec<Interaction>,
        positive_sets: Vec<Vec<ItemIdx>>,
        test_positive_sets: Vec<Vec<ItemIdx>>,
        train_pools: Vec<Vec<ItemIdx>>,
        test_pools: Vec<Vec<ItemIdx>>,
    ) -> Result<Self, PipelineError> {
        let (num_user, num_item) = split_bounds(&train)?;
        let corpus = Self {
            num_user,
            num_item,
            positive_sets,
            test_positive_sets,
            train,
            test,
            train_pools,
            test_pools,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for split in [Split::Train, Split::Test] {
            let (pools, interactions) = match split {
                Split::Train => (&self.train_pools, &self.train),
                Split::Test => (&self.test_pools, &self.test),
            };
            if pools.len() != self.num_user {
                return Err(PipelineError::Configuration(format!(
                    "{split} negative pool covers {} users, corpus has {}",
                    pools.len(),
                    self.num_user
                )));
            }
            for interaction in interactions {
                if interaction.user >= self.num_user || interaction.item >= self.num_item {
                    return Err(PipelineError::Configuration(format!(
                        "{split} interaction ({}, {}) outside ({}, {}) index space",
                        interaction.user, interaction.item, self.num_user, self.num_item
                    )));
                }
            }
            for (user, pool) in pools.iter().enumerate() {
                if let Some(&item) = pool.iter().find(|&&item| item >= self.num_item) {
                    return Err(PipelineError::Configuration(format!(
                        "{split} negative pool for user {user} holds item {item} outside {} items",
                        self.num_item
                    )));
                }
            }
        }

        for user in 0..self.num_user {
            let train_positive: HashSet<ItemIdx> =
                self.positive_sets[user].iter().copied().collect();
            for &item in &self.train_pools[user] {
                if train_positive.contains(&item) {
                    return Err(PipelineError::CorpusIntegrity {
                        user,
                        item,
                        split: Split::Train,
                    });
                }
            }
            let test_positive: HashSet<ItemIdx> =
                self.test_positive_sets[user].iter().copied().collect();
            for &item in &self.test_pools[user] {
                let split = if train_positive.contains(&item) {
                    Some(Split::Train)
                } else if test_positive.contains(&item) {
                    Some(Split::Test)
                } else {
                    None
                };
                if let Some(split) = split {
                    return Err(PipelineError::CorpusIntegrity { user, item, split });
                }
            }
        }
        Ok(())
    }

    /// Number of users; `max(train user index) + 1`.
    pub fn num_user(&self) -> usize {
        self.num_user
    }

    /// Number of items; `max(train item index) + 1`.
    pub fn num_item(&self) -> usize {
        self.num_item
    }

    /// Train-split interactions in file order; one training example each.
    pub fn train(&self) -> &[Interaction] {
        &self.train
    }

    /// Test-split interactions in file order.
    pub fn test(&self) -> &[Interaction] {
        &self.test
    }

    /// The user's train-positive items in file order. Empty for users with no
    /// train interactions.
    pub fn positive_set(&self, user: UserIdx) -> &[ItemIdx] {
        self.positive_sets.get(user).map_or(&[], Vec::as_slice)
    }

    /// The user's test-positive items in file order.
    pub fn test_positives(&self, user: UserIdx) -> &[ItemIdx] {
        self.test_positive_sets.get(user).map_or(&[], Vec::as_slice)
    }

    /// Training negative candidates for a user.
    pub fn train_pool(&self, user: UserIdx) -> &[ItemIdx] {
        self.train_pools.get(user).map_or(&[], Vec::as_slice)
    }

    /// Evaluation negative candidates for a user.
    pub fn test_pool(&self, user: UserIdx) -> &[ItemIdx] {
        self.test_pools.get(user).map_or(&[], Vec::as_slice)
    }

    /// Report users whose split interaction count falls below `minimum`.
    /// Diagnostic only; sparse users are never an error.
    pub fn inspect_sparse_users(&self, split: Split, minimum: usize) -> Vec<SparseUser> {
        let sets = match split {
            Split::Train => &self.positive_sets,
            Split::Test => &self.test_positive_sets,
        };
        sets.iter()
            .enumerate()
            .filter(|(_, items)| items.len() < minimum)
            .map(|(user, items)| SparseUser {
                user,
                interactions: items.len(),
            })
            .collect()
    }
}

/// Sorted set difference: every item index in `[0, num_item)` that appears in
/// none of the exclusion lists. `O(num_item)` per call.
pub fn derive_negative_pool(num_item: usize, excluded: &[&[ItemIdx]]) -> Vec<ItemIdx> {
    let mut keep = vec![true; num_item];
    for list in excluded {
        for &item in *list {
            if let Some(slot) = keep.get_mut(item) {
                *slot = false;
            }
        }
    }
    keep.iter()
        .enumerate()
        .filter(|(_, &kept)| kept)
        .map(|(item, _)| item)
        .collect()
}

/// Move up to `count` test rows of `item` into the train split, returning how
/// many moved. Load-time data correction; only applied when a
/// `RebalanceRule` is configured.
pub fn apply_rebalance(
    train: &mut Vec<Interaction>,
    test: &mut Vec<Interaction>,
    item: ItemIdx,
    count: usize,
) -> usize {
    let mut moved = 0;
    let mut idx = 0;
    while idx < test.len() && moved < count {
        if test[idx].item == item {
            train.push(test.remove(idx));
            moved += 1;
        } else {
            idx += 1;
        }
    }
    if moved > 0 {
        debug!(item, moved, "rebalanced test rows into train");
    }
    moved
}

fn split_bounds(train: &[Interaction]) -> Result<(usize, usize), PipelineError> {
    if train.is_empty() {
        return Err(PipelineError::Configuration(
            "train split is empty".to_string(),
        ));
    }
    let num_user = train.iter().map(|x| x.user).max().unwrap_or(0) + 1;
    let num_item = train.iter().map(|x| x.item).max().unwrap_or(0) + 1;
    Ok((num_user, num_item))
}

fn group_by_user(interactions: &[Interaction], num_user: usize) -> Vec<Vec<ItemIdx>> {
    let mut sets = vec![Vec::new(); num_user];
    for interaction in interactions {
        if let Some(set) = sets.get_mut(interaction.user) {
            set.push(interaction.item);
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(user: UserIdx, item: ItemIdx) -> Interaction {
        Interaction::new(user, item)
    }

    #[test]
    fn derived_pools_exclude_positives() {
        let train = vec![pair(0, 1), pair(0, 3), pair(1, 4)];
        let test = vec![pair(0, 2)];
        let corpus = InteractionCorpus::load_deriving(train, test).expect("corpus");

        assert_eq!(corpus.num_user(), 2);
        assert_eq!(corpus.num_item(), 5);
        assert_eq!(corpus.train_pool(0), &[0, 2, 4]);
        assert_eq!(corpus.test_pool(0), &[0, 4]);
        // User 1 has no test positives; both pools exclude item 4 only.
        assert_eq!(corpus.train_pool(1), &[0, 1, 2, 3]);
        assert_eq!(corpus.test_pool(1), &[0, 1, 2, 3]);
    }

    #[test]
    fn overlapping_train_pool_is_rejected_at_load() {
        let train = vec![pair(0, 0), pair(0, 1)];
        let err = InteractionCorpus::load(
            train,
            Vec::new(),
            vec![vec![1]],
            vec![vec![]],
        )
        .expect_err("overlap");
        assert!(matches!(
            err,
            PipelineError::CorpusIntegrity {
                user: 0,
                item: 1,
                split: Split::Train
            }
        ));
    }

    #[test]
    fn test_pool_must_avoid_test_positives_too() {
        let train = vec![pair(0, 0), pair(0, 1), pair(1, 2)];
        let test = vec![pair(0, 2)];
        // Item 2 is fine for user 0's train pool but not their test pool.
        let err = InteractionCorpus::load(
            train.clone(),
            test.clone(),
            vec![vec![2], vec![0, 1]],
            vec![vec![2], vec![0, 1]],
        )
        .expect_err("test overlap");
        assert!(matches!(
            err,
            PipelineError::CorpusIntegrity {
                user: 0,
                item: 2,
                split: Split::Test,
            }
        ));
        // With the overlap confined to the train pool slot, the load is clean.
        InteractionCorpus::load(train, test, vec![vec![2], vec![0, 1]], vec![
            vec![],
            vec![0, 1],
        ])
        .expect("clean corpus");
    }

    #[test]
    fn users_without_train_interactions_are_permitted() {
        let train = vec![pair(2, 0)];
        let corpus =
            InteractionCorpus::load_deriving(train, Vec::new()).expect("corpus with gap users");
        assert_eq!(corpus.positive_set(0), &[] as &[ItemIdx]);
        assert_eq!(corpus.train_pool(0), &[0]);
    }

    #[test]
    fn rebalance_moves_rows_in_file_order() {
        let mut train = vec![pair(0, 0)];
        let mut test = vec![pair(0, 7), pair(1, 7), pair(2, 7), pair(0, 3)];
        let moved = apply_rebalance(&mut train, &mut test, 7, 2);
        assert_eq!(moved, 2);
        assert_eq!(train, vec![pair(0, 0), pair(0, 7), pair(1, 7)]);
        assert_eq!(test, vec![pair(2, 7), pair(0, 3)]);
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EvalCandidates;
use crate::constants::corpus::{NEGATIVE_LABEL, POSITIVE_LABEL};
use crate::corpus::InteractionCorpus;
use crate::errors::PipelineError;
use crate::features::FeatureStore;
use crate::sampler::{worker_seed, NegativeSampler};
use crate::types::{ExampleIdx, Feature, ItemIdx, Label, UserIdx};

/// One training example as assembled by [`TrainDataset::get`].
///
/// Carries the user's *entire* train-positive history and its features, not
/// just the single labelled pair, so scorers that attend over history receive
/// their context per example.
#[derive(Clone, Debug)]
pub struct TrainExample {
    pub user: UserIdx,
    pub positive: ItemIdx,
    /// Freshly sampled negatives; a new draw on every access.
    pub negatives: Vec<ItemIdx>,
    /// The user's full train-positive set, in file order.
    pub history: Vec<ItemIdx>,
    /// Flat `|history| * dim` features for `history`; `None` without features.
    pub history_features: Option<Vec<Feature>>,
}

/// Indexable view over the train split: one entry per train interaction.
///
/// Negative sampling happens inside `get`, so two calls with the same index
/// agree on `user`, `positive`, and features but generally not on negatives.
#[derive(Debug)]
pub struct TrainDataset<'a> {
    corpus: &'a InteractionCorpus,
    features: Option<&'a FeatureStore>,
    sampler: NegativeSampler,
}

impl<'a> TrainDataset<'a> {
    /// Wrap the corpus (and optional feature store) without copying.
    ///
    /// Fails eagerly when any train user's pool cannot cover
    /// `num_negatives` without replacement, or when the store does not span
    /// the corpus item space — both would otherwise abort mid-epoch.
    pub fn new(
        corpus: &'a InteractionCorpus,
        features: Option<&'a FeatureStore>,
        num_negatives: usize,
    ) -> Result<Self, PipelineError> {
        if let Some(store) = features {
            if store.len() != corpus.num_item() {
                return Err(PipelineError::Configuration(format!(
                    "feature store covers {} items, corpus has {}",
                    store.len(),
                    corpus.num_item()
                )));
            }
        }
        for user in 0..corpus.num_user() {
            let pool = corpus.train_pool(user);
            if !corpus.positive_set(user).is_empty() && pool.len() < num_negatives {
                return Err(PipelineError::InsufficientPool {
                    requested: num_negatives,
                    available: pool.len(),
                });
            }
        }
        Ok(Self {
            corpus,
            features,
            sampler: NegativeSampler::new(num_negatives),
        })
    }

    /// Number of training examples (train interactions).
    pub fn len(&self) -> usize {
        self.corpus.train().len()
    }

    /// True when the train split is empty.
    pub fn is_empty(&self) -> bool {
        self.corpus.train().is_empty()
    }

    /// Assemble the example at `index`, drawing fresh negatives from `rng`.
    pub fn get<R: Rng + ?Sized>(
        &self,
        index: ExampleIdx,
        rng: &mut R,
    ) -> Result<TrainExample, PipelineError> {
        let interaction = self.corpus.train().get(index).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "train example index {index} out of range (len {})",
                self.len()
            ))
        })?;
        let negatives = self
            .sampler
            .sample(self.corpus.train_pool(interaction.user), rng)?;
        let history = self.corpus.positive_set(interaction.user).to_vec();
        let history_features = self.features.map(|store| store.gather(&history));
        Ok(TrainExample {
            user: interaction.user,
            positive: interaction.item,
            negatives,
            history,
            history_features,
        })
    }

    /// Negatives drawn per example.
    pub fn num_negatives(&self) -> usize {
        self.sampler.count()
    }

    /// The wrapped feature store, when features are carried.
    pub fn features(&self) -> Option<&FeatureStore> {
        self.features
    }

    /// The wrapped corpus.
    pub fn corpus(&self) -> &InteractionCorpus {
        self.corpus
    }
}

/// One user's evaluation group: every candidate the scorer must rank.
#[derive(Clone, Debug)]
pub struct EvalGroup {
    pub user: UserIdx,
    /// Test positives first, then the negative candidates.
    pub candidates: Vec<ItemIdx>,
    /// `1.0`/`0.0` labels aligned with `candidates`.
    pub labels: Vec<Label>,
    /// Count of leading positives in `candidates`.
    pub num_positive: usize,
    /// The user's train-positive set, for history-attentive scorers.
    pub history: Vec<ItemIdx>,
    /// Flat `|history| * dim` features for `history`; `None` without features.
    pub history_features: Option<Vec<Feature>>,
}

/// Per-user evaluation groups, one per user with at least one test positive.
///
/// Candidates are fixed at construction — the full test pool by default, or a
/// once-drawn fixed-seed subsample — so metrics reproduce across runs given
/// the same corpus and seed.
pub struct EvalDataset {
    groups: Vec<EvalGroup>,
}

impl EvalDataset {
    /// Build every group up front.
    pub fn new(
        corpus: &InteractionCorpus,
        features: Option<&FeatureStore>,
        candidates: EvalCandidates,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        if let Some(store) = features {
            if store.len() != corpus.num_item() {
                return Err(PipelineError::Configuration(format!(
                    "feature store covers {} items, corpus has {}",
                    store.len(),
                    corpus.num_item()
                )));
            }
        }
        let mut groups = Vec::new();
        for user in 0..corpus.num_user() {
            let positives = corpus.test_positives(user);
            if positives.is_empty() {
                continue;
            }
            let pool = corpus.test_pool(user);
            let negatives: Vec<ItemIdx> = match candidates {
                EvalCandidates::FullPool => pool.to_vec(),
                EvalCandidates::Sampled(count) => {
                    // One draw per user, keyed by the configured seed, so the
                    // candidate set is identical on every rebuild.
                    let mut rng = StdRng::seed_from_u64(worker_seed(seed, user as u64, 0));
                    NegativeSampler::new(count).sample(pool, &mut rng)?
                }
            };
            let mut items = Vec::with_capacity(positives.len() + negatives.len());
            items.extend_from_slice(positives);
            items.extend_from_slice(&negatives);
            let mut labels = vec![POSITIVE_LABEL; positives.len()];
            labels.resize(items.len(), NEGATIVE_LABEL);

            let history = corpus.positive_set(user).to_vec();
            let history_features = features.map(|store| store.gather(&history));
            groups.push(EvalGroup {
                user,
                candidates: items,
                labels,
                num_positive: positives.len(),
                history,
                history_features,
            });
        }
        Ok(Self { groups })
    }

    /// Number of evaluation users.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when no user has test positives.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The group at `index`.
    pub fn get(&self, index: usize) -> Option<&EvalGroup> {
        self.groups.get(index)
    }

    /// All groups, in user order.
    pub fn groups(&self) -> &[EvalGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fixtures::TEST_SEED;
    use crate::corpus::Interaction;

    fn two_user_corpus() -> InteractionCorpus {
        // User 0: train {1, 3}, test {2}; user 1: train {0, 4}, test {1}.
        let train = vec![
            Interaction::new(0, 1),
            Interaction::new(0, 3),
            Interaction::new(1, 0),
            Interaction::new(1, 4),
        ];
        let test = vec![Interaction::new(0, 2), Interaction::new(1, 1)];
        InteractionCorpus::load_deriving(train, test).expect("corpus")
    }

    #[test]
    fn repeated_access_is_stable_except_for_negatives() {
        let corpus = two_user_corpus();
        let dataset = TrainDataset::new(&corpus, None, 2).expect("dataset");
        let mut rng = StdRng::seed_from_u64(TEST_SEED);

        let first = dataset.get(1, &mut rng).expect("example");
        let second = dataset.get(1, &mut rng).expect("example");
        assert_eq!(first.user, second.user);
        assert_eq!(first.positive, second.positive);
        assert_eq!(first.history, second.history);
        assert_eq!(first.history, vec![1, 3]);
        for example in [&first, &second] {
            assert_eq!(example.negatives.len(), 2);
            for item in &example.negatives {
                assert!(corpus.train_pool(0).contains(item));
            }
        }
    }

    #[test]
    fn construction_rejects_pools_smaller_than_the_draw() {
        let corpus = two_user_corpus();
        // Each user's train pool holds 3 items; 4 can never be drawn.
        let err = TrainDataset::new(&corpus, None, 4).expect_err("pool too small");
        assert!(matches!(err, PipelineError::InsufficientPool { requested: 4, .. }));
    }

    #[test]
    fn eval_labels_align_with_candidates() {
        let corpus = two_user_corpus();
        let dataset =
            EvalDataset::new(&corpus, None, EvalCandidates::FullPool, TEST_SEED).expect("dataset");
        assert_eq!(dataset.len(), 2);

        let group = dataset.get(0).expect("group for user 0");
        assert_eq!(group.user, 0);
        assert_eq!(group.candidates, vec![2, 0, 4]);
        assert_eq!(group.labels, vec![1.0, 0.0, 0.0]);
        let positive_total: f32 = group.labels.iter().sum();
        assert_eq!(positive_total as usize, group.num_positive);
        assert_eq!(group.labels.len(), group.candidates.len());
    }

    #[test]
    fn sampled_eval_candidates_reproduce_across_rebuilds() {
        let corpus = two_user_corpus();
        let first = EvalDataset::new(&corpus, None, EvalCandidates::Sampled(1), TEST_SEED)
            .expect("dataset");
        let second = EvalDataset::new(&corpus, None, EvalCandidates::Sampled(1), TEST_SEED)
            .expect("dataset");
        for (a, b) in first.groups().iter().zip(second.groups()) {
            assert_eq!(a.candidates, b.candidates);
        }
    }
}

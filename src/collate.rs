use crate::dataset::{EvalGroup, TrainExample};
use crate::errors::PipelineError;
use crate::types::{Feature, ItemIdx, Label, UserIdx};

/// Merges independently fetched dataset entries into batch-shaped arrays.
///
/// Training policy: the negative count is fixed per example (the dataset
/// enforces it), while variable-length positive histories are padded to the
/// batch maximum with a sentinel item plus a validity mask. Evaluation policy:
/// one user per step, so candidate lists never need padding across users.
#[derive(Clone, Copy, Debug)]
pub struct Collator {
    pad_item: ItemIdx,
}

/// A collated training batch. All arrays are flat with row-major layout.
#[derive(Clone, Debug)]
pub struct TrainBatch {
    /// One user per example; length `B`.
    pub users: Vec<UserIdx>,
    /// One positive item per example; length `B`.
    pub positives: Vec<ItemIdx>,
    /// Sampled negatives; `B * num_negatives`.
    pub negatives: Vec<ItemIdx>,
    /// Negatives per example.
    pub num_negatives: usize,
    /// Positive histories padded to the batch maximum; `B * history_width`.
    pub history: Vec<ItemIdx>,
    /// `1.0` for real history entries, `0.0` for padding; `B * history_width`.
    pub history_mask: Vec<Label>,
    /// Padded history length shared by every row.
    pub history_width: usize,
    /// Zero-padded history features; `B * history_width * feature_dim`.
    pub history_features: Option<Vec<Feature>>,
    /// Feature dimensionality; `0` when no features are carried.
    pub feature_dim: usize,
}

impl TrainBatch {
    /// Number of (pre-expansion) examples in the batch.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// A collated evaluation step: one user, every candidate.
#[derive(Clone, Debug)]
pub struct EvalBatch {
    pub user: UserIdx,
    /// Candidates in group order (positives first).
    pub items: Vec<ItemIdx>,
    /// Labels aligned with `items`.
    pub labels: Vec<Label>,
    /// The user's train-positive history, unpadded.
    pub history: Vec<ItemIdx>,
    /// Flat `|history| * feature_dim` history features.
    pub history_features: Option<Vec<Feature>>,
    /// Feature dimensionality; `0` when no features are carried.
    pub feature_dim: usize,
}

impl Collator {
    /// A collator for an item space of `num_item` items. The padding sentinel
    /// is `num_item` itself — one past the last real index, so models can
    /// reserve a single extra embedding row for it.
    pub fn new(num_item: usize) -> Self {
        Self { pad_item: num_item }
    }

    /// The sentinel index used for history padding.
    pub fn pad_item(&self) -> ItemIdx {
        self.pad_item
    }

    /// Stack training examples into one batch.
    ///
    /// Every example must carry the same negative count, and features must be
    /// all-present or all-absent; mixed batches are configuration errors.
    pub fn collate_train(&self, examples: &[TrainExample]) -> Result<TrainBatch, PipelineError> {
        let first = examples.first().ok_or_else(|| {
            PipelineError::Configuration("cannot collate an empty batch".to_string())
        })?;
        let num_negatives = first.negatives.len();
        let with_features = first.history_features.is_some();
        let history_width = examples.iter().map(|x| x.history.len()).max().unwrap_or(0);
        let feature_dim = probe_feature_dim(examples)?;

        let mut users = Vec::with_capacity(examples.len());
        let mut positives = Vec::with_capacity(examples.len());
        let mut negatives = Vec::with_capacity(examples.len() * num_negatives);
        let mut history = Vec::with_capacity(examples.len() * history_width);
        let mut history_mask = Vec::with_capacity(examples.len() * history_width);
        let mut history_features =
            with_features.then(|| Vec::with_capacity(examples.len() * history_width * feature_dim));

        for example in examples {
            if example.negatives.len() != num_negatives {
                return Err(PipelineError::Configuration(format!(
                    "example for user {} carries {} negatives, batch expects {num_negatives}",
                    example.user,
                    example.negatives.len()
                )));
            }
            if example.history_features.is_some() != with_features {
                return Err(PipelineError::Configuration(format!(
                    "example for user {} disagrees with the batch on feature presence",
                    example.user
                )));
            }
            users.push(example.user);
            positives.push(example.positive);
            negatives.extend_from_slice(&example.negatives);

            let real = example.history.len();
            history.extend_from_slice(&example.history);
            history.resize(history.len() + (history_width - real), self.pad_item);
            history_mask.extend(std::iter::repeat(1.0).take(real));
            history_mask.extend(std::iter::repeat(0.0).take(history_width - real));

            if let (Some(stacked), Some(row)) =
                (history_features.as_mut(), example.history_features.as_ref())
            {
                stacked.extend_from_slice(row);
                stacked.resize(stacked.len() + (history_width - real) * feature_dim, 0.0);
            }
        }

        Ok(TrainBatch {
            users,
            positives,
            negatives,
            num_negatives,
            history,
            history_mask,
            history_width,
            history_features,
            feature_dim,
        })
    }

    /// Shape one evaluation group into a scoring step. No cross-user padding
    /// is ever needed at batch size one.
    pub fn collate_eval(&self, group: &EvalGroup) -> EvalBatch {
        let feature_dim = match (&group.history_features, group.history.len()) {
            (Some(features), len) if len > 0 => features.len() / len,
            _ => 0,
        };
        EvalBatch {
            user: group.user,
            items: group.candidates.clone(),
            labels: group.labels.clone(),
            history: group.history.clone(),
            history_features: group.history_features.clone(),
            feature_dim,
        }
    }
}

fn probe_feature_dim(examples: &[TrainExample]) -> Result<usize, PipelineError> {
    let mut dim = None;
    for example in examples {
        let Some(features) = example.history_features.as_ref() else {
            continue;
        };
        if example.history.is_empty() {
            continue;
        }
        let example_dim = features.len() / example.history.len();
        if let Some(expected) = dim {
            if example_dim != expected {
                return Err(PipelineError::Configuration(format!(
                    "example for user {} has feature dim {example_dim}, batch expects {expected}",
                    example.user
                )));
            }
        } else {
            dim = Some(example_dim);
        }
    }
    Ok(dim.unwrap_or(0))
}

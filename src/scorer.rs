use crate::collate::{EvalBatch, TrainBatch};
use crate::constants::corpus::{NEGATIVE_LABEL, POSITIVE_LABEL};
use crate::errors::PipelineError;
use crate::features::FeatureStore;
use crate::types::{Feature, ItemIdx, Label, Score, UserIdx};

/// Per-user interaction history attached to a scoring request, for models
/// that attend over a user's positives when scoring a candidate.
#[derive(Clone, Copy, Debug)]
pub struct HistoryContext<'a> {
    /// Number of history rows: either one per request row, or a single row
    /// shared by every request row (evaluation steps score one user).
    pub rows: usize,
    /// Padded history length of each row.
    pub width: usize,
    /// Flat `rows * width` history items, sentinel-padded.
    pub items: &'a [ItemIdx],
    /// Flat `rows * width` validity mask; `0.0` marks padding.
    pub mask: &'a [Label],
    /// Flat `rows * width * dim` history features, zero-padded.
    pub features: Option<&'a [Feature]>,
}

/// A batched scoring request: equal-length index arrays plus optional
/// per-item features and history context.
#[derive(Clone, Copy, Debug)]
pub struct ScoreRequest<'a> {
    pub users: &'a [UserIdx],
    pub items: &'a [ItemIdx],
    /// Flat `len * feature_dim` features for `items`.
    pub item_features: Option<&'a [Feature]>,
    /// Feature dimensionality; `0` when no features are carried.
    pub feature_dim: usize,
    /// History context; `None` for history-free scorers' inputs.
    pub history: Option<HistoryContext<'a>>,
}

impl ScoreRequest<'_> {
    /// Number of (user, item) rows to score.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when the request holds no rows.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// The opaque model collaborator: scores batched (user, item) rows.
///
/// The pipeline never looks inside; it only requires one real-valued, finite
/// score per row.
pub trait Scorer {
    /// Score every row of the request.
    fn score(&self, request: &ScoreRequest<'_>) -> Result<Vec<Score>, PipelineError>;
}

/// A scorer that can also learn: one optimizer step per batch.
pub trait TrainableScorer: Scorer {
    /// Apply one gradient/optimizer step against the labels and return the
    /// pre-update scores. Gradients are computed from the local batch alone;
    /// cross-worker aggregation only ever touches the reported loss.
    fn fit_batch(
        &mut self,
        request: &ScoreRequest<'_>,
        labels: &[Label],
    ) -> Result<Vec<Score>, PipelineError>;
}

/// Owned storage for an expanded batch, borrowed into [`ScoreRequest`]s.
///
/// Training batches expand each example into one positive row followed by its
/// negative rows; evaluation batches expand into one row per candidate.
#[derive(Clone, Debug)]
pub struct ExpandedBatch {
    users: Vec<UserIdx>,
    items: Vec<ItemIdx>,
    labels: Vec<Label>,
    item_features: Option<Vec<Feature>>,
    feature_dim: usize,
    history_rows: usize,
    history_width: usize,
    history: Vec<ItemIdx>,
    history_mask: Vec<Label>,
    history_features: Option<Vec<Feature>>,
}

impl ExpandedBatch {
    /// Flatten a collated training batch into labelled scoring rows.
    ///
    /// Row order per example: the positive (label 1), then its negatives
    /// (label 0). History rows are repeated so each request row carries its
    /// example's context.
    pub fn from_train(batch: &TrainBatch, features: Option<&FeatureStore>) -> Self {
        let rows_per_example = 1 + batch.num_negatives;
        let total = batch.len() * rows_per_example;
        let mut users = Vec::with_capacity(total);
        let mut items = Vec::with_capacity(total);
        let mut labels = Vec::with_capacity(total);
        let mut history = Vec::with_capacity(total * batch.history_width);
        let mut history_mask = Vec::with_capacity(total * batch.history_width);
        let mut history_features = batch
            .history_features
            .as_ref()
            .map(|_| Vec::with_capacity(total * batch.history_width * batch.feature_dim));

        for (example, &user) in batch.users.iter().enumerate() {
            let negatives = &batch.negatives
                [example * batch.num_negatives..(example + 1) * batch.num_negatives];
            let history_row =
                &batch.history[example * batch.history_width..(example + 1) * batch.history_width];
            let mask_row = &batch.history_mask
                [example * batch.history_width..(example + 1) * batch.history_width];
            let features_row = batch.history_features.as_ref().map(|stacked| {
                let span = batch.history_width * batch.feature_dim;
                &stacked[example * span..(example + 1) * span]
            });

            users.push(user);
            items.push(batch.positives[example]);
            labels.push(POSITIVE_LABEL);
            for &negative in negatives {
                users.push(user);
                items.push(negative);
                labels.push(NEGATIVE_LABEL);
            }
            for _ in 0..rows_per_example {
                history.extend_from_slice(history_row);
                history_mask.extend_from_slice(mask_row);
                if let (Some(stacked), Some(row)) = (history_features.as_mut(), features_row) {
                    stacked.extend_from_slice(row);
                }
            }
        }

        let item_features = features.map(|store| store.gather(&items));
        let feature_dim = features.map_or(0, FeatureStore::dim);
        Self {
            users,
            items,
            labels,
            item_features,
            feature_dim,
            history_rows: total,
            history_width: batch.history_width,
            history,
            history_mask,
            history_features,
        }
    }

    /// Flatten an evaluation step into scoring rows: the user repeated per
    /// candidate, with a single shared history row.
    pub fn from_eval(batch: &EvalBatch, features: Option<&FeatureStore>) -> Self {
        let total = batch.items.len();
        let item_features = features.map(|store| store.gather(&batch.items));
        let feature_dim = features.map_or(0, FeatureStore::dim);
        Self {
            users: vec![batch.user; total],
            items: batch.items.clone(),
            labels: batch.labels.clone(),
            item_features,
            feature_dim,
            history_rows: 1,
            history_width: batch.history.len(),
            history: batch.history.clone(),
            history_mask: vec![1.0; batch.history.len()],
            history_features: batch.history_features.clone(),
        }
    }

    /// Borrow the expansion as a scoring request.
    pub fn request(&self) -> ScoreRequest<'_> {
        ScoreRequest {
            users: &self.users,
            items: &self.items,
            item_features: self.item_features.as_deref(),
            feature_dim: self.feature_dim,
            history: (self.history_width > 0).then(|| HistoryContext {
                rows: self.history_rows,
                width: self.history_width,
                items: &self.history,
                mask: &self.history_mask,
                features: self.history_features.as_deref(),
            }),
        }
    }

    /// Labels aligned with the request rows.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

/// Numerically stable binary cross-entropy with logits, averaged over rows.
pub fn bce_with_logits(scores: &[Score], labels: &[Label]) -> Result<f64, PipelineError> {
    if scores.len() != labels.len() {
        return Err(PipelineError::Scoring(format!(
            "scorer returned {} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if scores.is_empty() {
        return Err(PipelineError::Scoring("empty score batch".to_string()));
    }
    let mut total = 0.0_f64;
    for (&score, &label) in scores.iter().zip(labels) {
        if !score.is_finite() {
            return Err(PipelineError::Scoring(format!(
                "non-finite score {score} in batch"
            )));
        }
        let x = score as f64;
        let y = label as f64;
        total += x.max(0.0) - x * y + (-x.abs()).exp().ln_1p();
    }
    Ok(total / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::Collator;
    use crate::dataset::TrainExample;

    #[test]
    fn train_expansion_interleaves_positive_then_negatives() {
        let collator = Collator::new(5);
        let batch = collator
            .collate_train(&[
                TrainExample {
                    user: 0,
                    positive: 1,
                    negatives: vec![0, 4],
                    history: vec![1, 3],
                    history_features: None,
                },
                TrainExample {
                    user: 1,
                    positive: 2,
                    negatives: vec![3, 0],
                    history: vec![2],
                    history_features: None,
                },
            ])
            .expect("batch");
        let expanded = ExpandedBatch::from_train(&batch, None);
        let request = expanded.request();

        assert_eq!(request.users, &[0, 0, 0, 1, 1, 1]);
        assert_eq!(request.items, &[1, 0, 4, 2, 3, 0]);
        assert_eq!(expanded.labels(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let history = request.history.expect("history context");
        assert_eq!(history.rows, 6);
        assert_eq!(history.width, 2);
        // User 1's single-item history repeats with its padding for each row.
        assert_eq!(&history.items[6..8], &[2, 5]);
        assert_eq!(&history.mask[6..8], &[1.0, 0.0]);
    }

    #[test]
    fn bce_matches_hand_computed_values() {
        // Perfectly confident and correct: loss approaches 0.
        let low = bce_with_logits(&[20.0, -20.0], &[1.0, 0.0]).expect("loss");
        assert!(low < 1e-6);
        // Logit 0 on any label: ln 2.
        let even = bce_with_logits(&[0.0], &[1.0]).expect("loss");
        assert!((even - std::f64::consts::LN_2).abs() < 1e-9);
        // Confidently wrong: large loss.
        let high = bce_with_logits(&[-10.0], &[1.0]).expect("loss");
        assert!(high > 9.0);
    }

    #[test]
    fn bce_rejects_shape_mismatch_and_nan() {
        assert!(bce_with_logits(&[0.0, 1.0], &[1.0]).is_err());
        assert!(bce_with_logits(&[f32::NAN], &[1.0]).is_err());
    }
}

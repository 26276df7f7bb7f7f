use rayon::prelude::*;

use crate::collate::Collator;
use crate::dataset::{EvalDataset, EvalGroup};
use crate::errors::PipelineError;
use crate::features::FeatureStore;
use crate::scorer::{ExpandedBatch, Scorer};

/// Ranking metrics averaged over evaluation users.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RankingMetrics {
    /// Fraction of users with at least one positive in the top K.
    pub hit_ratio: f64,
    /// Coverage variant: per user, positives found in the top K over
    /// `min(K, |positives|)`, averaged.
    pub hit_ratio_all: f64,
    /// Normalized discounted cumulative gain over the top K.
    pub ndcg: f64,
    /// Users evaluated.
    pub users: usize,
}

/// Scores every candidate per user group and computes ranking metrics.
///
/// Candidates are ranked by descending score; equal scores keep their
/// candidate-list order (stable sort), since no secondary key is defined.
pub struct EvalLoop<'a> {
    dataset: &'a EvalDataset,
    features: Option<&'a FeatureStore>,
    collator: Collator,
    top_k: usize,
}

impl<'a> EvalLoop<'a> {
    /// An evaluation loop with ranking cutoff `top_k` over an item space of
    /// `num_item` items.
    pub fn new(
        dataset: &'a EvalDataset,
        features: Option<&'a FeatureStore>,
        num_item: usize,
        top_k: usize,
    ) -> Result<Self, PipelineError> {
        if top_k == 0 {
            return Err(PipelineError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            dataset,
            features,
            collator: Collator::new(num_item),
            top_k,
        })
    }

    /// Score all groups and average their per-user metrics. Groups are
    /// independent, so they are evaluated in parallel.
    pub fn evaluate<M>(&self, model: &M) -> Result<RankingMetrics, PipelineError>
    where
        M: Scorer + Sync,
    {
        if self.dataset.is_empty() {
            return Err(PipelineError::Configuration(
                "no users with test positives to evaluate".to_string(),
            ));
        }
        let per_user: Vec<UserMetrics> = self
            .dataset
            .groups()
            .par_iter()
            .map(|group| self.evaluate_group(model, group))
            .collect::<Result<_, PipelineError>>()?;

        let users = per_user.len();
        let scale = users as f64;
        Ok(RankingMetrics {
            hit_ratio: per_user.iter().map(|m| m.hit).sum::<f64>() / scale,
            hit_ratio_all: per_user.iter().map(|m| m.coverage).sum::<f64>() / scale,
            ndcg: per_user.iter().map(|m| m.ndcg).sum::<f64>() / scale,
            users,
        })
    }

    fn evaluate_group<M: Scorer>(
        &self,
        model: &M,
        group: &EvalGroup,
    ) -> Result<UserMetrics, PipelineError> {
        let batch = self.collator.collate_eval(group);
        let expanded = ExpandedBatch::from_eval(&batch, self.features);
        let scores = model.score(&expanded.request())?;
        if scores.len() != group.candidates.len() {
            return Err(PipelineError::Scoring(format!(
                "scorer returned {} scores for {} candidates of user {}",
                scores.len(),
                group.candidates.len(),
                group.user
            )));
        }
        if let Some(bad) = scores.iter().find(|score| !score.is_finite()) {
            return Err(PipelineError::Scoring(format!(
                "non-finite score {bad} for user {}",
                group.user
            )));
        }

        let order = rank_descending(&scores);
        let cutoff = self.top_k.min(order.len());
        let hits = order[..cutoff]
            .iter()
            .filter(|&&candidate| group.labels[candidate] > 0.5)
            .count();

        let ideal = self.top_k.min(group.num_positive);
        let dcg: f64 = order[..cutoff]
            .iter()
            .enumerate()
            .filter(|(_, &candidate)| group.labels[candidate] > 0.5)
            .map(|(position, _)| discount(position))
            .sum();
        let idcg: f64 = (0..ideal).map(discount).sum();

        Ok(UserMetrics {
            hit: if hits > 0 { 1.0 } else { 0.0 },
            coverage: hits as f64 / ideal.max(1) as f64,
            ndcg: if idcg > 0.0 { dcg / idcg } else { 0.0 },
        })
    }
}

struct UserMetrics {
    hit: f64,
    coverage: f64,
    ndcg: f64,
}

/// Candidate positions sorted by descending score; stable on ties.
fn rank_descending(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

fn discount(position: usize) -> f64 {
    std::f64::consts::LN_2 / ((position as f64) + 2.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalCandidates;
    use crate::constants::fixtures::TEST_SEED;
    use crate::corpus::{Interaction, InteractionCorpus};
    use crate::scorer::ScoreRequest;
    use crate::types::Score;

    /// Scores each item by a fixed per-item table; unlisted items get 0.
    struct TableScorer(Vec<(usize, Score)>);

    impl Scorer for TableScorer {
        fn score(&self, request: &ScoreRequest<'_>) -> Result<Vec<Score>, PipelineError> {
            Ok(request
                .items
                .iter()
                .map(|item| {
                    self.0
                        .iter()
                        .find(|(candidate, _)| candidate == item)
                        .map_or(0.0, |(_, score)| *score)
                })
                .collect())
        }
    }

    fn scenario_corpus() -> InteractionCorpus {
        // User 0: train {1, 3}, test {2}; pools derive to {0, 2, 4} / {0, 4}.
        let train = vec![Interaction::new(0, 1), Interaction::new(0, 3)];
        let test = vec![Interaction::new(0, 2)];
        InteractionCorpus::load_deriving(train, test).expect("corpus")
    }

    fn run(model: &TableScorer, top_k: usize) -> RankingMetrics {
        let corpus = scenario_corpus();
        let dataset = EvalDataset::new(&corpus, None, EvalCandidates::FullPool, TEST_SEED)
            .expect("dataset");
        let eval = EvalLoop::new(&dataset, None, corpus.num_item(), top_k).expect("loop");
        eval.evaluate(model).expect("metrics")
    }

    #[test]
    fn positive_ranked_first_scores_perfectly() {
        let metrics = run(&TableScorer(vec![(2, 5.0), (0, 1.0), (4, 0.5)]), 1);
        assert_eq!(metrics.users, 1);
        assert_eq!(metrics.hit_ratio, 1.0);
        assert_eq!(metrics.hit_ratio_all, 1.0);
        assert!((metrics.ndcg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn positive_ranked_last_misses_the_cutoff() {
        let metrics = run(&TableScorer(vec![(2, -5.0), (0, 1.0), (4, 0.5)]), 1);
        assert_eq!(metrics.hit_ratio, 0.0);
        assert_eq!(metrics.hit_ratio_all, 0.0);
        assert_eq!(metrics.ndcg, 0.0);
    }

    #[test]
    fn ties_keep_candidate_order_so_positives_lead() {
        // All scores equal: candidate order is [2, 0, 4] with the positive
        // first, so the stable ranking puts item 2 on top.
        let metrics = run(&TableScorer(vec![]), 1);
        assert_eq!(metrics.hit_ratio, 1.0);
    }

    #[test]
    fn second_place_positive_discounts_ndcg() {
        let metrics = run(&TableScorer(vec![(0, 9.0), (2, 5.0), (4, 1.0)]), 2);
        assert_eq!(metrics.hit_ratio, 1.0);
        // Single positive at rank 2: DCG = 1/log2(3), IDCG = 1.
        let expected = std::f64::consts::LN_2 / 3.0_f64.ln();
        assert!((metrics.ndcg - expected).abs() < 1e-12);
    }

    #[test]
    fn non_finite_scores_are_a_scoring_error() {
        struct NanScorer;
        impl Scorer for NanScorer {
            fn score(&self, request: &ScoreRequest<'_>) -> Result<Vec<Score>, PipelineError> {
                Ok(vec![f32::NAN; request.len()])
            }
        }
        let corpus = scenario_corpus();
        let dataset = EvalDataset::new(&corpus, None, EvalCandidates::FullPool, TEST_SEED)
            .expect("dataset");
        let eval = EvalLoop::new(&dataset, None, corpus.num_item(), 1).expect("loop");
        assert!(matches!(
            eval.evaluate(&NanScorer),
            Err(PipelineError::Scoring(_))
        ));
    }
}

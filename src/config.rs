use crate::types::RawId;

/// Which per-item feature modalities the pipeline carries.
///
/// Selected once at configuration time; datasets, collation, and score
/// requests branch on this capability descriptor instead of duplicating
/// per-mode code paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modality {
    /// Item image features are present.
    pub has_image: bool,
    /// Item text features are present.
    pub has_text: bool,
}

impl Modality {
    /// No item features; the scorer sees indices only.
    pub const NONE: Modality = Modality {
        has_image: false,
        has_text: false,
    };
    /// Image features only.
    pub const IMAGE: Modality = Modality {
        has_image: true,
        has_text: false,
    };
    /// Text features only.
    pub const TEXT: Modality = Modality {
        has_image: false,
        has_text: true,
    };
    /// Text and image features, concatenated text-then-image.
    pub const BOTH: Modality = Modality {
        has_image: true,
        has_text: true,
    };

    /// True when any feature modality is carried.
    pub fn any(&self) -> bool {
        self.has_image || self.has_text
    }
}

/// How evaluation candidate negatives are chosen per user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalCandidates {
    /// Every item in the user's test negative pool (the default contract).
    FullPool,
    /// A fixed-size subsample drawn once at dataset construction with the
    /// configured seed, so repeated evaluations rank the same candidates.
    Sampled(usize),
}

/// Policy for raw identifiers in test data that are absent from the
/// train-derived index space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownIdPolicy {
    /// Surface `UnknownIdentifier` and abort the load.
    #[default]
    Fail,
    /// Drop the offending row, logging it at `warn` level.
    Drop,
}

/// One-off data correction moving a fixed number of one item's rows from the
/// test split to the train split at load time.
///
/// Never applied by default; corpora that need it opt in explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebalanceRule {
    /// Raw id of the item whose rows move.
    pub item: RawId,
    /// Number of test rows to move into train.
    pub count: usize,
}

/// Top-level pipeline configuration.
///
/// CLI parsing is out of scope; callers hand these in as typed values.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Base RNG seed; worker and epoch seeds are derived from it.
    pub seed: u64,
    /// Training examples per batch (pre-expansion).
    pub batch_size: usize,
    /// Negatives sampled per training example.
    pub num_negatives: usize,
    /// Ranking cutoff for Hit-Ratio@K and NDCG@K.
    pub top_k: usize,
    /// Number of training epochs.
    pub epochs: usize,
    /// Evaluate every this many epochs.
    pub eval_interval: usize,
    /// Feature modalities carried by the pipeline.
    pub modality: Modality,
    /// Evaluation candidate selection policy.
    pub eval_candidates: EvalCandidates,
    /// Handling of test-time ids outside the trained index space.
    pub unknown_ids: UnknownIdPolicy,
    /// Optional test-to-train rebalance correction.
    pub rebalance: Option<RebalanceRule>,
    /// Learning rate handed through to the model collaborator.
    pub learning_rate: f32,
    /// Number of distributed workers; 1 means single-process.
    pub world_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            batch_size: 1024,
            num_negatives: 4,
            top_k: 10,
            epochs: 50,
            eval_interval: 1,
            modality: Modality::NONE,
            eval_candidates: EvalCandidates::FullPool,
            unknown_ids: UnknownIdPolicy::default(),
            rebalance: None,
            learning_rate: 1e-3,
            world_size: 1,
        }
    }
}

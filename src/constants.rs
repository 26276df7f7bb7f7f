/// Constants used by corpus loading and table parsing.
pub mod corpus {
    use crate::types::Label;

    /// Implicit label attached to every observed interaction.
    pub const POSITIVE_LABEL: Label = 1.0;
    /// Label attached to sampled negatives.
    pub const NEGATIVE_LABEL: Label = 0.0;
    /// Minimum train interactions per user reported by sparse-user inspection.
    pub const INSPECT_MIN_TRAIN: usize = 3;
    /// Minimum test interactions per user reported by sparse-user inspection.
    pub const INSPECT_MIN_TEST: usize = 2;
}

/// Constants used by feature-store construction.
pub mod features {
    /// Square resolution raw images are resized to before normalization.
    pub const IMAGE_RESOLUTION: u32 = 224;
    /// Channels produced by the raw-image transform (RGB).
    pub const IMAGE_CHANNELS: usize = 3;
    /// Channel-wise mean subtracted after scaling pixels to `[0, 1]`.
    pub const NORMALIZE_MEAN: f32 = 0.5;
    /// Channel-wise divisor applied after mean subtraction.
    pub const NORMALIZE_STD: f32 = 0.5;
    /// Dimension of precomputed image feature vectors.
    pub const DEFAULT_IMAGE_DIM: usize = 512;
    /// Dimension of precomputed text feature vectors.
    pub const DEFAULT_TEXT_DIM: usize = 300;
}

/// Constants used by seeding and negative sampling.
pub mod sampler {
    /// Offset mixed into epoch-derived shuffle seeds.
    pub const EPOCH_SEED_OFFSET: u64 = 0xC0FF_EE5A;
    /// Multiplier mixed into per-worker seed derivation.
    pub const WORKER_SEED_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;
}

/// Constants used by the train/eval loop contract.
pub mod run {
    use crate::types::Rank;

    /// Rank that owns checkpointing and metric reporting.
    pub const REPORT_RANK: Rank = 0;
    /// Metric name used when reporting the epoch-mean training loss.
    pub const METRIC_TRAIN_LOSS: &str = "train_loss";
    /// Metric name used when reporting Hit-Ratio@K.
    pub const METRIC_HIT_RATIO: &str = "hit_ratio";
    /// Metric name used when reporting the coverage Hit-Ratio variant.
    pub const METRIC_HIT_RATIO_ALL: &str = "hit_ratio_all";
    /// Metric name used when reporting NDCG@K.
    pub const METRIC_NDCG: &str = "ndcg";
}

/// Constants shared by unit-test fixtures.
#[cfg(test)]
pub mod fixtures {
    /// Seed used by deterministic test RNGs.
    pub const TEST_SEED: u64 = 42;
    /// Feature dimension used by synthetic feature tables in tests.
    pub const TEST_FEATURE_DIM: usize = 4;
}

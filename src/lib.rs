#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Batch collation for train and eval steps.
pub mod collate;
/// Pipeline configuration types.
pub mod config;
/// Centralized constants used across the pipeline.
pub mod constants;
/// Interaction corpus and negative-pool construction.
pub mod corpus;
/// Train/eval dataset views over the corpus.
pub mod dataset;
/// Collective-communication and reporting boundaries.
pub mod distributed;
/// Ranking evaluation loop and metrics.
pub mod evaluation;
/// Dense per-item feature stores.
pub mod features;
/// Raw-id to dense-index mapping.
pub mod index;
/// Input-file loading for corpora and features.
pub mod loader;
/// Distributed epoch partitioning.
pub mod partition;
/// Background batch prefetching.
pub mod prefetch;
/// Negative sampling and seed derivation.
pub mod sampler;
/// Opaque scorer contract and batch expansion.
pub mod scorer;
/// Epoch-level training driver.
pub mod train;
/// Shared type aliases.
pub mod types;

mod errors;

pub use collate::{Collator, EvalBatch, TrainBatch};
pub use config::{EvalCandidates, Modality, PipelineConfig, RebalanceRule, UnknownIdPolicy};
pub use corpus::{derive_negative_pool, Interaction, InteractionCorpus, Split};
pub use dataset::{EvalDataset, EvalGroup, TrainDataset, TrainExample};
pub use distributed::{
    Checkpointer, Communicator, LocalCommunicator, LogReporter, NullReporter, Reporter,
};
pub use errors::PipelineError;
pub use evaluation::{EvalLoop, RankingMetrics};
pub use features::FeatureStore;
pub use index::{IdSpace, IndexMapper};
pub use loader::{
    build_features, load_corpus, CorpusSource, FeatureSource, ImageSource, LoadedCorpus,
};
pub use partition::EpochPartitioner;
pub use prefetch::BatchPrefetcher;
pub use sampler::{epoch_seed, worker_seed, NegativeSampler};
pub use scorer::{
    bce_with_logits, ExpandedBatch, HistoryContext, ScoreRequest, Scorer, TrainableScorer,
};
pub use train::TrainLoop;
pub use types::{
    Epoch, ExampleIdx, Feature, ItemIdx, Label, Rank, RawId, Score, UserIdx, WorldSize,
};

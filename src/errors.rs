use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::corpus::Split;
use crate::index::IdSpace;
use crate::types::{ItemIdx, RawId, UserIdx};

/// Error type for corpus construction, feature builds, sampling, and loop failures.
///
/// The four domain variants (`UnknownIdentifier`, `CorpusIntegrity`,
/// `MissingFeature`, `InsufficientPool`) are raised eagerly at load/build time
/// wherever possible so a misconfigured run fails before any epoch starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A raw identifier in test/eval data is absent from the train-derived index.
    #[error("{space} id '{id}' does not appear in the index built from training data")]
    UnknownIdentifier { space: IdSpace, id: RawId },
    /// A negative pool overlaps the positive set it must be disjoint from.
    #[error("negative pool for user {user} contains {split} positive item {item}")]
    CorpusIntegrity {
        user: UserIdx,
        item: ItemIdx,
        split: Split,
    },
    /// An item in the active ID space has no entry in a feature source.
    #[error("no feature entry for item {item} (raw id '{id}')")]
    MissingFeature { item: ItemIdx, id: RawId },
    /// A feature vector does not match the dimension established by the store.
    #[error("feature vector for '{id}' has dimension {found}, expected {expected}")]
    FeatureDimension {
        id: RawId,
        found: usize,
        expected: usize,
    },
    /// More negatives were requested than a pool holds (without replacement).
    #[error("cannot draw {requested} negatives without replacement from a pool of {available}")]
    InsufficientPool { requested: usize, available: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to read table: {0}")]
    Table(#[from] csv::Error),
    #[error("failed to parse '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("failed to decode image '{path}'")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The opaque scorer produced a failure or a non-finite score.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

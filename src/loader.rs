use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Modality, PipelineConfig, UnknownIdPolicy};
use crate::constants::corpus::{INSPECT_MIN_TEST, INSPECT_MIN_TRAIN};
use crate::corpus::{apply_rebalance, Interaction, InteractionCorpus, Split};
use crate::errors::PipelineError;
use crate::features::FeatureStore;
use crate::index::{IdSpace, IndexMapper};
use crate::types::{Feature, ItemIdx, RawId};

/// File locations for one corpus.
///
/// Interaction tables are CSV with user/item id columns; negative pools are
/// JSON maps from raw user id to raw item id lists. When both pool files are
/// absent, pools are derived from the interaction tables instead. Explicit
/// id-to-index tables are optional; without them, dense indices follow
/// first-seen order in the train table.
#[derive(Clone, Debug, Default)]
pub struct CorpusSource {
    pub train: PathBuf,
    pub test: PathBuf,
    pub train_negative: Option<PathBuf>,
    pub test_negative: Option<PathBuf>,
    pub user_index: Option<PathBuf>,
    pub item_index: Option<PathBuf>,
}

/// A fully loaded corpus plus the mappers that produced its index spaces.
#[derive(Debug)]
pub struct LoadedCorpus {
    pub users: IndexMapper,
    pub items: IndexMapper,
    pub corpus: InteractionCorpus,
}

/// One interaction row as read from a CSV table.
#[derive(Debug, Deserialize)]
struct InteractionRow {
    #[serde(alias = "userID", alias = "userid")]
    user: RawId,
    #[serde(alias = "itemID", alias = "itemid", alias = "train_pos", alias = "test_pos")]
    item: RawId,
}

/// One id-to-index row as read from a CSV mapping table.
#[derive(Debug, Deserialize)]
struct IndexRow {
    #[serde(alias = "userid", alias = "itemid")]
    id: RawId,
    #[serde(alias = "useridx", alias = "itemidx")]
    index: usize,
}

/// Per-item metadata entry carrying the image location.
#[derive(Debug, Deserialize)]
struct ItemMeta {
    image_path: String,
}

/// Load interaction tables, build the index spaces, resolve negative pools,
/// and validate the result into an immutable corpus.
pub fn load_corpus(
    source: &CorpusSource,
    config: &PipelineConfig,
) -> Result<LoadedCorpus, PipelineError> {
    let train_rows = read_interactions(&source.train)?;
    let test_rows = read_interactions(&source.test)?;
    info!(
        train = train_rows.len(),
        test = test_rows.len(),
        "read interaction tables"
    );

    let users = match &source.user_index {
        Some(path) => IndexMapper::from_table(IdSpace::User, read_index_table(path)?)?,
        None => {
            IndexMapper::from_observations(IdSpace::User, train_rows.iter().map(|r| r.0.clone()))
        }
    };
    let items = match &source.item_index {
        Some(path) => IndexMapper::from_table(IdSpace::Item, read_index_table(path)?)?,
        None => {
            IndexMapper::from_observations(IdSpace::Item, train_rows.iter().map(|r| r.1.clone()))
        }
    };

    // Train rows define the index space; an unmapped train id is always fatal.
    let mut train = Vec::with_capacity(train_rows.len());
    for (user, item) in &train_rows {
        train.push(Interaction::new(users.remap(user)?, items.remap(item)?));
    }
    let mut test = remap_split(&test_rows, &users, &items, config.unknown_ids)?;

    if let Some(rule) = &config.rebalance {
        let item = items.remap(&rule.item)?;
        apply_rebalance(&mut train, &mut test, item, rule.count);
    }

    let corpus = match (&source.train_negative, &source.test_negative) {
        (Some(train_path), Some(test_path)) => {
            let train_pools =
                read_negative_pools(train_path, &users, &items, config.unknown_ids)?;
            let test_pools = read_negative_pools(test_path, &users, &items, config.unknown_ids)?;
            InteractionCorpus::load(train, test, train_pools, test_pools)?
        }
        (None, None) => InteractionCorpus::load_deriving(train, test)?,
        _ => {
            return Err(PipelineError::Configuration(
                "negative pools must be given for both splits or neither".to_string(),
            ))
        }
    };

    for (split, minimum) in [(Split::Train, INSPECT_MIN_TRAIN), (Split::Test, INSPECT_MIN_TEST)] {
        let sparse = corpus.inspect_sparse_users(split, minimum);
        if !sparse.is_empty() {
            debug!(
                %split,
                users = sparse.len(),
                minimum,
                "users below the interaction minimum"
            );
        }
    }
    info!(
        num_user = corpus.num_user(),
        num_item = corpus.num_item(),
        "corpus loaded"
    );
    Ok(LoadedCorpus {
        users,
        items,
        corpus,
    })
}

/// Where item feature vectors come from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// Raw images on disk, located through an item-metadata JSON whose
    /// `image_path` entries are resolved against `root`.
    Raw { meta: PathBuf, root: PathBuf },
    /// Precomputed vectors keyed by raw item id (JSON).
    Precomputed(PathBuf),
}

/// Feature source files per modality.
#[derive(Clone, Debug, Default)]
pub struct FeatureSource {
    pub image: Option<ImageSource>,
    /// Precomputed text vectors keyed by raw item id (JSON).
    pub text: Option<PathBuf>,
}

/// Build the feature store the configured modality requires, or `None` when
/// the pipeline carries no features.
pub fn build_features(
    items: &IndexMapper,
    source: &FeatureSource,
    modality: Modality,
) -> Result<Option<FeatureStore>, PipelineError> {
    if !modality.any() {
        return Ok(None);
    }
    let image = if modality.has_image {
        Some(build_image_store(items, source)?)
    } else {
        None
    };
    let text = if modality.has_text {
        let path = source.text.as_ref().ok_or_else(|| {
            PipelineError::Configuration("text modality requires a text feature file".to_string())
        })?;
        let table: HashMap<RawId, Vec<Feature>> = read_json(path)?;
        Some(FeatureStore::from_precomputed(Modality::TEXT, items, &table)?)
    } else {
        None
    };
    match (text, image) {
        (Some(text), Some(image)) => Ok(Some(FeatureStore::concat(&text, &image)?)),
        (Some(single), None) | (None, Some(single)) => Ok(Some(single)),
        (None, None) => unreachable!("modality.any() guarantees a source"),
    }
}

fn build_image_store(
    items: &IndexMapper,
    source: &FeatureSource,
) -> Result<FeatureStore, PipelineError> {
    match source.image.as_ref() {
        Some(ImageSource::Raw { meta, root }) => {
            let entries: HashMap<RawId, ItemMeta> = read_json(meta)?;
            let paths: HashMap<RawId, PathBuf> = entries
                .into_iter()
                .map(|(id, meta)| (id, root.join(meta.image_path)))
                .collect();
            FeatureStore::from_raw_images(items, &paths)
        }
        Some(ImageSource::Precomputed(path)) => {
            let table: HashMap<RawId, Vec<Feature>> = read_json(path)?;
            FeatureStore::from_precomputed(Modality::IMAGE, items, &table)
        }
        None => Err(PipelineError::Configuration(
            "image modality requires an image source".to_string(),
        )),
    }
}

fn read_interactions(path: &Path) -> Result<Vec<(RawId, RawId)>, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: InteractionRow = row?;
        rows.push((row.user, row.item));
    }
    Ok(rows)
}

fn read_index_table(path: &Path) -> Result<Vec<(RawId, usize)>, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: IndexRow = row?;
        rows.push((row.id, row.index));
    }
    Ok(rows)
}

fn remap_split(
    rows: &[(RawId, RawId)],
    users: &IndexMapper,
    items: &IndexMapper,
    policy: UnknownIdPolicy,
) -> Result<Vec<Interaction>, PipelineError> {
    let mut out = Vec::with_capacity(rows.len());
    for (user, item) in rows {
        match (users.get(user), items.get(item)) {
            (Some(user), Some(item)) => out.push(Interaction::new(user, item)),
            _ => match policy {
                UnknownIdPolicy::Fail => {
                    // Re-run remap to surface which space failed.
                    users.remap(user)?;
                    items.remap(item)?;
                }
                UnknownIdPolicy::Drop => {
                    warn!(user = %user, item = %item, "dropping row outside the trained index space");
                }
            },
        }
    }
    Ok(out)
}

fn read_negative_pools(
    path: &Path,
    users: &IndexMapper,
    items: &IndexMapper,
    policy: UnknownIdPolicy,
) -> Result<Vec<Vec<ItemIdx>>, PipelineError> {
    let raw: HashMap<RawId, Vec<RawId>> = read_json(path)?;
    let mut pools = vec![Vec::new(); users.len()];
    for (user, candidates) in raw {
        let Some(user) = users.get(&user) else {
            match policy {
                UnknownIdPolicy::Fail => {
                    return Err(PipelineError::UnknownIdentifier {
                        space: IdSpace::User,
                        id: user,
                    })
                }
                UnknownIdPolicy::Drop => {
                    warn!(user = %user, "dropping negative pool for unknown user");
                    continue;
                }
            }
        };
        let pool = &mut pools[user];
        pool.reserve(candidates.len());
        for item in candidates {
            match items.get(&item) {
                Some(item) => pool.push(item),
                None => match policy {
                    UnknownIdPolicy::Fail => {
                        return Err(PipelineError::UnknownIdentifier {
                            space: IdSpace::Item,
                            id: item,
                        })
                    }
                    UnknownIdPolicy::Drop => {
                        warn!(item = %item, "dropping unknown item from negative pool");
                    }
                },
            }
        }
    }
    Ok(pools)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| PipelineError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

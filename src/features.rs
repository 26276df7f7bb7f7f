use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rayon::prelude::*;
use tracing::info;

use crate::config::Modality;
use crate::constants::features::{
    IMAGE_CHANNELS, IMAGE_RESOLUTION, NORMALIZE_MEAN, NORMALIZE_STD,
};
use crate::errors::PipelineError;
use crate::index::IndexMapper;
use crate::types::{Feature, ItemIdx, RawId};

/// Per-item feature vectors stored densely by item index.
///
/// Built once from external sources keyed by raw item ID, reindexed into dense
/// order, then shared read-only across all dataset consumers for the process
/// lifetime. Every item in the ID space must have an entry; holes fail the
/// build with `MissingFeature` rather than surfacing as an indexing failure
/// mid-epoch.
#[derive(Clone, Debug)]
pub struct FeatureStore {
    modality: Modality,
    dim: usize,
    num_item: usize,
    data: Vec<Feature>,
}

impl FeatureStore {
    /// Build a store from precomputed vectors keyed by raw item ID.
    ///
    /// The first item's vector establishes the store dimension; every other
    /// vector must match it.
    pub fn from_precomputed(
        modality: Modality,
        items: &IndexMapper,
        table: &HashMap<RawId, Vec<Feature>>,
    ) -> Result<Self, PipelineError> {
        let dim = probe_dim(items, table)?;
        let mut data = Vec::with_capacity(items.len() * dim);
        for (raw, index) in items.iter() {
            let vector = table.get(raw).ok_or_else(|| PipelineError::MissingFeature {
                item: index,
                id: raw.to_string(),
            })?;
            if vector.len() != dim {
                return Err(PipelineError::FeatureDimension {
                    id: raw.to_string(),
                    found: vector.len(),
                    expected: dim,
                });
            }
            data.extend_from_slice(vector);
        }
        info!(num_item = items.len(), dim, "built precomputed feature store");
        Ok(Self {
            modality,
            dim,
            num_item: items.len(),
            data,
        })
    }

    /// Build an image store by decoding raw images from disk.
    ///
    /// Each image is resized to a fixed square resolution and channel-wise
    /// normalized into CHW layout, so the resulting vectors all share the
    /// shape `3 * resolution * resolution`.
    pub fn from_raw_images(
        items: &IndexMapper,
        paths: &HashMap<RawId, PathBuf>,
    ) -> Result<Self, PipelineError> {
        let entries: Vec<(ItemIdx, &str, &Path)> = items
            .iter()
            .map(|(raw, index)| {
                let path = paths.get(raw).ok_or_else(|| PipelineError::MissingFeature {
                    item: index,
                    id: raw.to_string(),
                })?;
                Ok((index, raw, path.as_path()))
            })
            .collect::<Result<_, PipelineError>>()?;

        let vectors: Vec<Vec<Feature>> = entries
            .par_iter()
            .map(|(_, _, path)| decode_image(path))
            .collect::<Result<_, PipelineError>>()?;

        let dim = IMAGE_CHANNELS * (IMAGE_RESOLUTION as usize) * (IMAGE_RESOLUTION as usize);
        let mut data = Vec::with_capacity(items.len() * dim);
        for vector in &vectors {
            data.extend_from_slice(vector);
        }
        info!(num_item = items.len(), dim, "built raw-image feature store");
        Ok(Self {
            modality: Modality::IMAGE,
            dim,
            num_item: items.len(),
            data,
        })
    }

    /// Concatenate text and image stores along the feature axis, text first.
    /// The combined dimension is `dim(text) + dim(image)`.
    pub fn concat(text: &FeatureStore, image: &FeatureStore) -> Result<Self, PipelineError> {
        if text.num_item != image.num_item {
            return Err(PipelineError::Configuration(format!(
                "text store covers {} items, image store {}",
                text.num_item, image.num_item
            )));
        }
        let dim = text.dim + image.dim;
        let mut data = Vec::with_capacity(text.num_item * dim);
        for item in 0..text.num_item {
            data.extend_from_slice(text.get(item));
            data.extend_from_slice(image.get(item));
        }
        Ok(Self {
            modality: Modality::BOTH,
            dim,
            num_item: text.num_item,
            data,
        })
    }

    /// The feature vector for a dense item index.
    pub fn get(&self, item: ItemIdx) -> &[Feature] {
        debug_assert!(item < self.num_item);
        &self.data[item * self.dim..(item + 1) * self.dim]
    }

    /// Flat concatenation of the vectors for `items`, in order.
    pub fn gather(&self, items: &[ItemIdx]) -> Vec<Feature> {
        let mut out = Vec::with_capacity(items.len() * self.dim);
        for &item in items {
            out.extend_from_slice(self.get(item));
        }
        out
    }

    /// Fixed dimensionality of every vector in the store.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of items covered; always the full ID space.
    pub fn len(&self) -> usize {
        self.num_item
    }

    /// True when the store covers no items.
    pub fn is_empty(&self) -> bool {
        self.num_item == 0
    }

    /// Which modality (or concatenation) the vectors carry.
    pub fn modality(&self) -> Modality {
        self.modality
    }
}

fn probe_dim(
    items: &IndexMapper,
    table: &HashMap<RawId, Vec<Feature>>,
) -> Result<usize, PipelineError> {
    let (raw, index) = items
        .iter()
        .next()
        .ok_or_else(|| PipelineError::Configuration("item index space is empty".to_string()))?;
    let dim = table
        .get(raw)
        .ok_or_else(|| PipelineError::MissingFeature {
            item: index,
            id: raw.to_string(),
        })?
        .len();
    if dim == 0 {
        return Err(PipelineError::Configuration(format!(
            "feature vector for '{raw}' is empty"
        )));
    }
    Ok(dim)
}

/// Decode one image into a normalized CHW vector: resize to
/// `IMAGE_RESOLUTION` square, scale pixels to `[0, 1]`, subtract the mean,
/// divide by the std.
fn decode_image(path: &Path) -> Result<Vec<Feature>, PipelineError> {
    let decoded = image::open(path).map_err(|source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let resized = decoded
        .resize_exact(IMAGE_RESOLUTION, IMAGE_RESOLUTION, FilterType::Triangle)
        .to_rgb8();
    let side = IMAGE_RESOLUTION as usize;
    let mut out = Vec::with_capacity(IMAGE_CHANNELS * side * side);
    for channel in 0..IMAGE_CHANNELS {
        for y in 0..IMAGE_RESOLUTION {
            for x in 0..IMAGE_RESOLUTION {
                let value = resized.get_pixel(x, y).0[channel] as f32 / 255.0;
                out.push((value - NORMALIZE_MEAN) / NORMALIZE_STD);
            }
        }
    }
    Ok(out)
}

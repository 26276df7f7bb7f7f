use std::fmt;

use indexmap::IndexMap;

use crate::errors::PipelineError;
use crate::types::RawId;

/// Which identifier space a mapper covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSpace {
    User,
    Item,
}

impl fmt::Display for IdSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSpace::User => write!(f, "user"),
            IdSpace::Item => write!(f, "item"),
        }
    }
}

/// Bijection between raw external identifiers and dense `[0, n)` indices.
///
/// Built once from training data (or an explicit index table) and immutable
/// afterward. Dense indices follow first-seen order, so the same input rows
/// always produce the same mapping.
#[derive(Clone, Debug)]
pub struct IndexMapper {
    space: IdSpace,
    forward: IndexMap<RawId, usize>,
}

impl IndexMapper {
    /// Build a mapper from raw ids in observation order, assigning each
    /// distinct id the next dense index.
    pub fn from_observations<I, S>(space: IdSpace, raw_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RawId>,
    {
        let mut forward = IndexMap::new();
        for raw in raw_ids {
            let next = forward.len();
            forward.entry(raw.into()).or_insert(next);
        }
        Self { space, forward }
    }

    /// Build a mapper from an explicit `(raw id, dense index)` table.
    ///
    /// The table must describe a bijection onto `[0, n)`; gaps, duplicates,
    /// and out-of-range indices are configuration errors.
    pub fn from_table(
        space: IdSpace,
        pairs: Vec<(RawId, usize)>,
    ) -> Result<Self, PipelineError> {
        let n = pairs.len();
        let mut ordered: Vec<Option<RawId>> = vec![None; n];
        for (raw, index) in pairs {
            if index >= n {
                return Err(PipelineError::Configuration(format!(
                    "{space} index table assigns index {index} with only {n} rows"
                )));
            }
            if ordered[index].replace(raw).is_some() {
                return Err(PipelineError::Configuration(format!(
                    "{space} index table assigns index {index} twice"
                )));
            }
        }
        let mut forward = IndexMap::with_capacity(n);
        for (index, slot) in ordered.into_iter().enumerate() {
            // Every slot is filled: n entries, all distinct, all < n.
            let raw = slot.expect("dense index table");
            if forward.insert(raw.clone(), index).is_some() {
                return Err(PipelineError::Configuration(format!(
                    "{space} index table maps id '{raw}' twice"
                )));
            }
        }
        Ok(Self { space, forward })
    }

    /// Number of mapped identifiers; equals `max(dense index) + 1`.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True when no identifiers are mapped.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Resolve a raw id to its dense index, failing with `UnknownIdentifier`
    /// for ids outside the trained space.
    pub fn remap(&self, raw: &str) -> Result<usize, PipelineError> {
        self.get(raw).ok_or_else(|| PipelineError::UnknownIdentifier {
            space: self.space,
            id: raw.to_string(),
        })
    }

    /// Resolve a raw id, returning `None` when unmapped.
    pub fn get(&self, raw: &str) -> Option<usize> {
        self.forward.get(raw).copied()
    }

    /// Reverse lookup: the raw id assigned to a dense index.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.forward
            .get_index(index)
            .map(|(raw, _)| raw.as_str())
    }

    /// Which identifier space this mapper covers.
    pub fn space(&self) -> IdSpace {
        self.space
    }

    /// Iterate `(raw id, dense index)` pairs in dense-index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.forward.iter().map(|(raw, &idx)| (raw.as_str(), idx))
    }
}

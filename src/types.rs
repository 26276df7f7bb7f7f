/// Dense user index assigned by the index mapper.
/// Valid range: `[0, num_user)`.
pub type UserIdx = usize;
/// Dense item index assigned by the index mapper.
/// Valid range: `[0, num_item)`.
pub type ItemIdx = usize;
/// Raw external identifier as it appears in source tables.
/// Examples: `A2JW67UYZ3HLQC`, `B00005N7P0`, `2405`
pub type RawId = String;
/// Position of a training example within the corpus train split.
pub type ExampleIdx = usize;
/// Zero-based epoch counter.
pub type Epoch = u64;
/// Zero-based distributed worker rank.
pub type Rank = usize;
/// Number of participating distributed workers.
pub type WorldSize = usize;
/// Scalar model output for a (user, candidate) pair.
pub type Score = f32;
/// Feature vector component type.
pub type Feature = f32;
/// Implicit relevance label: `1.0` for positives, `0.0` for negatives.
pub type Label = f32;

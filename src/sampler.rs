use rand::seq::IndexedRandom;
use rand::Rng;

use crate::constants::sampler::{EPOCH_SEED_OFFSET, WORKER_SEED_MULTIPLIER};
use crate::errors::PipelineError;
use crate::types::{Epoch, ItemIdx};

/// Draws negative items for a user from that user's candidate pool.
///
/// Every draw is a pure function of the pool and the RNG handed in; nothing is
/// cached across calls. Repeated draws for the same example intentionally
/// differ — the sampler is a Monte-Carlo approximation of the negative class
/// distribution, so sampling variance across epochs is expected.
#[derive(Clone, Copy, Debug)]
pub struct NegativeSampler {
    num_negatives: usize,
}

impl NegativeSampler {
    /// A sampler drawing `num_negatives` items per call.
    pub fn new(num_negatives: usize) -> Self {
        Self { num_negatives }
    }

    /// Number of negatives drawn per call.
    pub fn count(&self) -> usize {
        self.num_negatives
    }

    /// Draw without replacement. Fails with `InsufficientPool` when the pool
    /// holds fewer than `num_negatives` candidates; the caller must treat that
    /// as a misconfiguration, not retry with a smaller count.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        pool: &[ItemIdx],
        rng: &mut R,
    ) -> Result<Vec<ItemIdx>, PipelineError> {
        if self.num_negatives > pool.len() {
            return Err(PipelineError::InsufficientPool {
                requested: self.num_negatives,
                available: pool.len(),
            });
        }
        Ok(pool
            .choose_multiple(rng, self.num_negatives)
            .copied()
            .collect())
    }

    /// Draw with replacement; duplicates are permitted. Only an empty pool is
    /// an error.
    pub fn sample_with_replacement<R: Rng + ?Sized>(
        &self,
        pool: &[ItemIdx],
        rng: &mut R,
    ) -> Result<Vec<ItemIdx>, PipelineError> {
        if pool.is_empty() {
            return Err(PipelineError::InsufficientPool {
                requested: self.num_negatives,
                available: 0,
            });
        }
        Ok((0..self.num_negatives)
            .map(|_| pool[rng.random_range(0..pool.len())])
            .collect())
    }
}

/// Deterministic seed for a given epoch, shared by every rank so all ranks
/// agree on the epoch's shuffle order without communication.
pub fn epoch_seed(base: u64, epoch: Epoch) -> u64 {
    mix(base
        .wrapping_add(EPOCH_SEED_OFFSET)
        .wrapping_add(epoch.wrapping_mul(WORKER_SEED_MULTIPLIER)))
}

/// Independent seed for one worker's RNG stream within an epoch. Distinct
/// workers must never share a stream, or parallel loaders would produce
/// identical negatives.
pub fn worker_seed(base: u64, worker: u64, epoch: Epoch) -> u64 {
    mix(epoch_seed(base, epoch) ^ (worker.wrapping_add(1)).wrapping_mul(WORKER_SEED_MULTIPLIER))
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

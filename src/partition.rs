use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::PipelineError;
use crate::sampler::epoch_seed;
use crate::types::{Epoch, ExampleIdx, Rank, WorldSize};

/// Epoch-deterministic shuffle plus disjoint assignment of training-example
/// indices to distributed ranks.
///
/// Every rank derives the same shuffle from `seed + epoch`, so the partition
/// is agreed without communication and changes every epoch. Assignment is
/// strided over the shuffled order: partitions are pairwise disjoint, their
/// union is the full index set, and sizes differ by at most one when the
/// example count is not divisible by the world size.
#[derive(Clone, Copy, Debug)]
pub struct EpochPartitioner {
    num_examples: usize,
    world_size: WorldSize,
    base_seed: u64,
}

impl EpochPartitioner {
    /// A partitioner over `num_examples` indices across `world_size` ranks.
    pub fn new(
        num_examples: usize,
        world_size: WorldSize,
        base_seed: u64,
    ) -> Result<Self, PipelineError> {
        if world_size == 0 {
            return Err(PipelineError::Configuration(
                "world size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            num_examples,
            world_size,
            base_seed,
        })
    }

    /// Number of participating ranks.
    pub fn world_size(&self) -> WorldSize {
        self.world_size
    }

    /// Number of examples covered per epoch across all ranks.
    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    /// The example indices assigned to `rank` for `epoch`, in iteration order.
    pub fn partition(&self, epoch: Epoch, rank: Rank) -> Result<Vec<ExampleIdx>, PipelineError> {
        if rank >= self.world_size {
            return Err(PipelineError::Configuration(format!(
                "rank {rank} outside world of {}",
                self.world_size
            )));
        }
        let mut order: Vec<ExampleIdx> = (0..self.num_examples).collect();
        let mut rng = StdRng::seed_from_u64(epoch_seed(self.base_seed, epoch));
        order.shuffle(&mut rng);
        Ok(order
            .into_iter()
            .skip(rank)
            .step_by(self.world_size)
            .collect())
    }
}

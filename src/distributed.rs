use tracing::info;

use crate::constants::run::REPORT_RANK;
use crate::errors::PipelineError;
use crate::types::{Epoch, Rank, WorldSize};

/// Collective-communication surface the loops require from a distributed
/// backend. Single-process runs use [`LocalCommunicator`].
pub trait Communicator {
    /// This worker's rank in `[0, world_size)`.
    fn rank(&self) -> Rank;

    /// Number of participating workers.
    fn world_size(&self) -> WorldSize;

    /// Blocking sum all-reduce. Every rank must reach this call before any
    /// proceeds; a crashed or hung rank stalls the job, which is fatal — no
    /// per-rank timeout or rejoin is provided.
    fn all_reduce_sum(&self, value: f64) -> Result<f64, PipelineError>;

    /// Sum all-reduce divided by the world size.
    fn all_reduce_mean(&self, value: f64) -> Result<f64, PipelineError> {
        Ok(self.all_reduce_sum(value)? / self.world_size() as f64)
    }

    /// True on the single rank that owns reporting and checkpointing.
    fn is_report_rank(&self) -> bool {
        self.rank() == REPORT_RANK
    }
}

/// Identity communicator for single-process training.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalCommunicator;

impl Communicator for LocalCommunicator {
    fn rank(&self) -> Rank {
        0
    }

    fn world_size(&self) -> WorldSize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64, PipelineError> {
        Ok(value)
    }
}

/// Reporting boundary: the loops hand aggregated per-epoch scalars here, and
/// nowhere else — rank gating happens once at the call site, not inside
/// compute code.
pub trait Reporter {
    /// Record one named scalar for an epoch.
    fn scalar(&mut self, name: &str, epoch: Epoch, value: f64);
}

/// Reporter that discards every metric.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn scalar(&mut self, _name: &str, _epoch: Epoch, _value: f64) {}
}

/// Reporter that emits metrics through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn scalar(&mut self, name: &str, epoch: Epoch, value: f64) {
        info!(metric = name, epoch, value, "epoch metric");
    }
}

/// Checkpoint collaborator: persists model state under an epoch tag. The
/// pipeline mandates no format; it only gates invocation to the report rank.
pub trait Checkpointer<M: ?Sized> {
    /// Persist the model for `epoch`.
    fn save(&mut self, model: &M, epoch: Epoch) -> Result<(), PipelineError>;
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::collate::Collator;
use crate::config::PipelineConfig;
use crate::constants::run::{
    METRIC_HIT_RATIO, METRIC_HIT_RATIO_ALL, METRIC_NDCG, METRIC_TRAIN_LOSS,
};
use crate::dataset::TrainDataset;
use crate::distributed::{Checkpointer, Communicator, Reporter};
use crate::errors::PipelineError;
use crate::evaluation::EvalLoop;
use crate::partition::EpochPartitioner;
use crate::sampler::worker_seed;
use crate::scorer::{bce_with_logits, ExpandedBatch, TrainableScorer};
use crate::types::Epoch;

/// Epoch-level training driver.
///
/// Per epoch: partition the shuffled example indices for this rank, draw each
/// batch with a rank-and-epoch-seeded RNG, collate and expand it, hand it to
/// the model for one optimizer step, and accumulate the local loss. Only the
/// *reported* loss crosses ranks (a blocking mean all-reduce); gradients stay
/// local to each worker's batches.
pub struct TrainLoop<'a> {
    dataset: &'a TrainDataset<'a>,
    config: &'a PipelineConfig,
    collator: Collator,
    partitioner: EpochPartitioner,
}

impl<'a> TrainLoop<'a> {
    /// A loop over `dataset` driven by `config`.
    pub fn new(
        dataset: &'a TrainDataset<'a>,
        config: &'a PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if config.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        let partitioner = EpochPartitioner::new(dataset.len(), config.world_size, config.seed)?;
        Ok(Self {
            dataset,
            config,
            collator: Collator::new(dataset.corpus().num_item()),
            partitioner,
        })
    }

    /// The collator this loop batches with.
    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// The per-rank partitioner this loop iterates with.
    pub fn partitioner(&self) -> &EpochPartitioner {
        &self.partitioner
    }

    /// One epoch over this rank's partition; returns the local mean batch
    /// loss (before any cross-rank aggregation).
    pub fn run_epoch<M, C>(
        &self,
        model: &mut M,
        comm: &C,
        epoch: Epoch,
    ) -> Result<f64, PipelineError>
    where
        M: TrainableScorer,
        C: Communicator,
    {
        let indices = self.partitioner.partition(epoch, comm.rank())?;
        let mut rng = StdRng::seed_from_u64(worker_seed(
            self.config.seed,
            comm.rank() as u64,
            epoch,
        ));
        let mut total = 0.0_f64;
        let mut batches = 0_usize;
        for chunk in indices.chunks(self.config.batch_size) {
            let examples = chunk
                .iter()
                .map(|&index| self.dataset.get(index, &mut rng))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = self.collator.collate_train(&examples)?;
            let expanded = ExpandedBatch::from_train(&batch, self.dataset.features());
            let scores = model.fit_batch(&expanded.request(), expanded.labels())?;
            total += bce_with_logits(&scores, expanded.labels())?;
            batches += 1;
        }
        debug!(epoch, rank = comm.rank(), batches, "finished local epoch");
        Ok(total / batches.max(1) as f64)
    }

    /// The full run: every epoch trains, the reported loss is averaged across
    /// ranks, evaluation fires on the configured cadence, and reporting plus
    /// checkpointing happen once, on the report rank only.
    pub fn run<M, C, R>(
        &self,
        model: &mut M,
        comm: &C,
        reporter: &mut R,
        eval: Option<&EvalLoop<'_>>,
        mut checkpointer: Option<&mut dyn Checkpointer<M>>,
    ) -> Result<(), PipelineError>
    where
        M: TrainableScorer + Sync,
        C: Communicator,
        R: Reporter,
    {
        for epoch in 0..self.config.epochs as Epoch {
            let local = self.run_epoch(model, comm, epoch)?;
            let mean = comm.all_reduce_mean(local)?;
            if comm.is_report_rank() {
                reporter.scalar(METRIC_TRAIN_LOSS, epoch, mean);
            }

            let interval = self.config.eval_interval as Epoch;
            if interval == 0 || (epoch + 1) % interval != 0 {
                continue;
            }
            if let Some(eval) = eval {
                let metrics = eval.evaluate(model)?;
                if comm.is_report_rank() {
                    reporter.scalar(METRIC_HIT_RATIO, epoch, metrics.hit_ratio);
                    reporter.scalar(METRIC_HIT_RATIO_ALL, epoch, metrics.hit_ratio_all);
                    reporter.scalar(METRIC_NDCG, epoch, metrics.ndcg);
                }
            }
            if comm.is_report_rank() {
                if let Some(checkpointer) = checkpointer.as_deref_mut() {
                    checkpointer.save(model, epoch)?;
                }
            }
        }
        Ok(())
    }
}

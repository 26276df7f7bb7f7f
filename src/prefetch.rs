use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::errors::PipelineError;

/// Background workers that fill a bounded queue with produced batches.
///
/// Each worker owns its producer closure — and therefore its own RNG stream;
/// callers seed each worker independently (see
/// [`worker_seed`](crate::sampler::worker_seed)) so parallel workers never
/// draw identical negatives. A producer returns `None` when its share of the
/// epoch is exhausted; the queue yields `None` once every worker has finished
/// and the buffer is drained.
pub struct BatchPrefetcher<T> {
    receiver: Option<mpsc::Receiver<Result<T, PipelineError>>>,
    handles: Vec<thread::JoinHandle<()>>,
    stats: Arc<PrefetcherStats>,
}

/// Prefetcher runtime counters.
#[derive(Default)]
struct PrefetcherStats {
    queued: AtomicUsize,
    produced: AtomicUsize,
    errors: AtomicUsize,
}

impl<T: Send + 'static> BatchPrefetcher<T> {
    /// Spawn `workers` producer threads sharing one bounded queue of
    /// `capacity` batches. `make_producer` is called once per worker with the
    /// worker's index.
    pub fn spawn<F, P>(capacity: usize, workers: usize, make_producer: F) -> Self
    where
        F: Fn(usize) -> P,
        P: FnMut() -> Option<Result<T, PipelineError>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let stats = Arc::new(PrefetcherStats::default());
        let mut handles = Vec::with_capacity(workers.max(1));
        for worker in 0..workers.max(1) {
            let sender = sender.clone();
            let stats = Arc::clone(&stats);
            let mut producer = make_producer(worker);
            handles.push(thread::spawn(move || {
                while let Some(result) = producer() {
                    if result.is_err() {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                    if sender.send(result).is_err() {
                        return;
                    }
                    stats.queued.fetch_add(1, Ordering::Relaxed);
                    stats.produced.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        drop(sender);
        Self {
            receiver: Some(receiver),
            handles,
            stats,
        }
    }

    /// Block until the next batch is available; `None` once every worker has
    /// finished and the queue is drained.
    pub fn next(&self) -> Option<Result<T, PipelineError>> {
        let result = self.receiver.as_ref()?.recv().ok()?;
        self.stats
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                Some(value.saturating_sub(1))
            })
            .ok();
        Some(result)
    }

    /// Number of batches currently buffered.
    pub fn queue_len(&self) -> usize {
        self.stats.queued.load(Ordering::Relaxed)
    }

    /// Total batches produced across all workers.
    pub fn produced_count(&self) -> usize {
        self.stats.produced.load(Ordering::Relaxed)
    }

    /// Total errored productions across all workers.
    pub fn error_count(&self) -> usize {
        self.stats.errors.load(Ordering::Relaxed)
    }
}

impl<T> Drop for BatchPrefetcher<T> {
    fn drop(&mut self) {
        // Dropping the receiver unblocks any worker parked on a full queue.
        self.receiver.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

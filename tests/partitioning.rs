use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use interactions::{
    Communicator, EpochPartitioner, Interaction, InteractionCorpus, PipelineConfig, PipelineError,
    ScoreRequest, Scorer, TrainDataset, TrainLoop, TrainableScorer,
};

/// In-process stand-in for a two-rank collective: every rank deposits its
/// value, waits at the barrier, and reads back the sum.
struct PairCommunicator {
    rank: usize,
    world: usize,
    barrier: Arc<Barrier>,
    slots: Arc<Mutex<Vec<f64>>>,
}

impl Communicator for PairCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64, PipelineError> {
        {
            let mut slots = self.slots.lock().expect("slots");
            slots[self.rank] = value;
        }
        self.barrier.wait();
        let sum = self.slots.lock().expect("slots").iter().sum();
        // Second rendezvous so nobody overwrites a slot before all reads.
        self.barrier.wait();
        Ok(sum)
    }
}

/// Zero scorer that counts how many rows it was asked to fit.
struct CountingModel {
    rows: Arc<AtomicUsize>,
}

impl Scorer for CountingModel {
    fn score(&self, request: &ScoreRequest<'_>) -> Result<Vec<f32>, PipelineError> {
        Ok(vec![0.0; request.len()])
    }
}

impl TrainableScorer for CountingModel {
    fn fit_batch(
        &mut self,
        request: &ScoreRequest<'_>,
        _labels: &[f32],
    ) -> Result<Vec<f32>, PipelineError> {
        self.rows.fetch_add(request.len(), Ordering::Relaxed);
        self.score(request)
    }
}

fn four_example_corpus() -> InteractionCorpus {
    let train = vec![
        Interaction::new(0, 1),
        Interaction::new(0, 3),
        Interaction::new(1, 0),
        Interaction::new(1, 4),
    ];
    InteractionCorpus::load_deriving(train, Vec::new()).expect("corpus")
}

#[test]
fn four_examples_split_exactly_in_two_per_worker() {
    let partitioner = EpochPartitioner::new(4, 2, 9).expect("partitioner");
    for epoch in 0..5 {
        let first = partitioner.partition(epoch, 0).expect("rank 0");
        let second = partitioner.partition(epoch, 1).expect("rank 1");
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        let union: HashSet<usize> = first.iter().chain(&second).copied().collect();
        assert_eq!(union, (0..4).collect::<HashSet<_>>());
    }
}

#[test]
fn both_ranks_agree_on_the_reported_mean_loss() {
    let barrier = Arc::new(Barrier::new(2));
    let slots = Arc::new(Mutex::new(vec![0.0; 2]));
    let rows = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for rank in 0..2 {
        let barrier = Arc::clone(&barrier);
        let slots = Arc::clone(&slots);
        let rows = Arc::clone(&rows);
        handles.push(thread::spawn(move || -> (f64, f64) {
            let corpus = four_example_corpus();
            let config = PipelineConfig {
                seed: 11,
                batch_size: 2,
                num_negatives: 1,
                world_size: 2,
                ..PipelineConfig::default()
            };
            let dataset = TrainDataset::new(&corpus, None, config.num_negatives).expect("dataset");
            let train = TrainLoop::new(&dataset, &config).expect("loop");
            let comm = PairCommunicator {
                rank,
                world: 2,
                barrier,
                slots,
            };
            let mut model = CountingModel { rows };
            let local = train.run_epoch(&mut model, &comm, 0).expect("epoch");
            let mean = comm.all_reduce_mean(local).expect("all-reduce");
            (local, mean)
        }));
    }
    let results: Vec<(f64, f64)> = handles
        .into_iter()
        .map(|handle| handle.join().expect("rank thread"))
        .collect();

    // Zero logits: every local loss is ln 2, so the mean matches it and both
    // ranks read the same aggregate.
    assert!((results[0].1 - results[1].1).abs() < 1e-12);
    assert!((results[0].1 - std::f64::consts::LN_2).abs() < 1e-9);
    // 4 examples, each expanded to 1 positive + 1 negative, across both ranks.
    assert_eq!(rows.load(Ordering::Relaxed), 8);
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use interactions::{
    worker_seed, BatchPrefetcher, Collator, EpochPartitioner, Interaction, InteractionCorpus,
    PipelineError, TrainBatch, TrainDataset,
};

fn corpus() -> Arc<InteractionCorpus> {
    let train = vec![
        Interaction::new(0, 1),
        Interaction::new(0, 3),
        Interaction::new(1, 0),
        Interaction::new(1, 4),
        Interaction::new(2, 2),
        Interaction::new(2, 0),
    ];
    Arc::new(InteractionCorpus::load_deriving(train, Vec::new()).expect("corpus"))
}

#[test]
fn workers_drain_their_partitions_exactly_once() {
    let corpus = corpus();
    let workers = 2;
    let batch_size = 2;
    let partitioner = EpochPartitioner::new(corpus.train().len(), workers, 5).expect("partitioner");

    let prefetcher: BatchPrefetcher<TrainBatch> =
        BatchPrefetcher::spawn(4, workers, |worker| {
            let corpus = Arc::clone(&corpus);
            let indices = partitioner.partition(0, worker).expect("partition");
            let mut rng = StdRng::seed_from_u64(worker_seed(5, worker as u64, 0));
            let mut cursor = 0;
            move || {
                if cursor >= indices.len() {
                    return None;
                }
                let dataset = match TrainDataset::new(&corpus, None, 1) {
                    Ok(dataset) => dataset,
                    Err(err) => return Some(Err(err)),
                };
                let collator = Collator::new(corpus.num_item());
                let chunk = &indices[cursor..(cursor + batch_size).min(indices.len())];
                cursor += chunk.len();
                let examples: Result<Vec<_>, _> = chunk
                    .iter()
                    .map(|&index| dataset.get(index, &mut rng))
                    .collect();
                Some(examples.and_then(|examples| collator.collate_train(&examples)))
            }
        });

    let mut batches = Vec::new();
    while let Some(batch) = prefetcher.next() {
        batches.push(batch.expect("batch"));
    }
    // 6 examples, 3 per worker, batch size 2: two batches per worker.
    assert_eq!(batches.len(), 4);
    assert_eq!(prefetcher.produced_count(), 4);
    assert_eq!(prefetcher.error_count(), 0);
    let total: usize = batches.iter().map(TrainBatch::len).sum();
    assert_eq!(total, 6);
}

#[test]
fn producer_errors_surface_without_killing_the_queue() {
    let prefetcher: BatchPrefetcher<usize> = BatchPrefetcher::spawn(2, 1, |_worker| {
        let mut step = 0;
        move || {
            step += 1;
            match step {
                1 => Some(Ok(10)),
                2 => Some(Err(PipelineError::Configuration("boom".to_string()))),
                3 => Some(Ok(30)),
                _ => None,
            }
        }
    });

    let mut values = Vec::new();
    let mut errors = 0;
    while let Some(result) = prefetcher.next() {
        match result {
            Ok(value) => values.push(value),
            Err(_) => errors += 1,
        }
    }
    assert_eq!(values, vec![10, 30]);
    assert_eq!(errors, 1);
    assert_eq!(prefetcher.error_count(), 1);
}

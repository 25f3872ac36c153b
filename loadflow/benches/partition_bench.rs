//! Benchmarks for input partitioning.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loadflow::core::{CheckpointId, DestinationRecord};
use loadflow::partition::{
    ByPrimaryKeyInputPartitioner, ByStreamInputPartitioner, InputPartitioner,
    RoundRobinInputPartitioner,
};
use loadflow::testing::{stream, TestCatalog};
use serde_json::json;

fn sample_records() -> Vec<DestinationRecord> {
    (0..1_000)
        .map(|i| {
            DestinationRecord::new(
                stream("users"),
                json!({"id": i, "account": {"region": i % 7}}),
                CheckpointId(1),
            )
        })
        .collect()
}

fn partition_benchmark(c: &mut Criterion) {
    let records = sample_records();
    let catalog = TestCatalog::new().with_dedupe("users", &["id"]).build();

    let partitioners: Vec<(&str, Box<dyn InputPartitioner>)> = vec![
        ("round_robin", Box::new(RoundRobinInputPartitioner::new(100))),
        ("by_stream", Box::new(ByStreamInputPartitioner)),
        (
            "by_primary_key",
            Box::new(ByPrimaryKeyInputPartitioner::new(catalog).expect("valid catalog")),
        ),
    ];

    for (name, partitioner) in &partitioners {
        c.bench_function(name, |b| {
            b.iter(|| {
                for record in &records {
                    black_box(partitioner.get_partition(black_box(record), 16));
                }
            });
        });
    }
}

criterion_group!(benches, partition_benchmark);
criterion_main!(benches);

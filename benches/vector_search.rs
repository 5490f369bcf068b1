//! Benchmark: in-process cosine search over `VectorIndex`.
//!
//! The reference implementation has no native ANN backend, so every
//! embedding search exercises the brute-force cosine fallback in
//! `VectorIndex::search`. This measures how that fallback scales with corpus
//! size and dimensionality, and isolates the cost of `cosine_similarity`
//! itself from the surrounding index bookkeeping (filtering, sorting,
//! truncation).

use agent_memory_core::vector::{cosine_similarity, Source, SourceType, VectorFilter};
use agent_memory_core::VectorIndex;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn random_vector(dimensions: usize) -> Vec<f32> {
    (0..dimensions).map(|_| rand::random::<f32>() * 2.0 - 1.0).collect()
}

fn build_index(size: usize, dimensions: usize) -> VectorIndex {
    let index = VectorIndex::new();
    for i in 0..size {
        let source = Source { source_type: SourceType::System, user_id: None, participant_id: None };
        index
            .store("bench-space", format!("memory {i}"), Some(random_vector(dimensions)), 50, vec![], Some(source), None, None)
            .unwrap();
    }
    index
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("cosine_similarity");
    for dimensions in [128, 768, 1536].iter() {
        let a = random_vector(*dimensions);
        let b = random_vector(*dimensions);
        group.bench_with_input(BenchmarkId::new("dimensions", dimensions), dimensions, |bencher, _| {
            bencher.iter(|| black_box(cosine_similarity(black_box(&a), black_box(&b))));
        });
    }
    group.finish();
}

fn bench_index_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_index_search");
    group.measurement_time(Duration::from_secs(10));

    let dimensions = 128;
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [1_000, 10_000, 50_000].iter() {
        let index = build_index(*size, dimensions);
        let query = random_vector(dimensions);

        group.bench_with_input(BenchmarkId::new("corpus_size", size), size, |bencher, _| {
            bencher.iter(|| {
                runtime.block_on(async {
                    let results = index.search("bench-space", None, Some(&query), &VectorFilter::default(), 10).await.unwrap();
                    black_box(&results);
                })
            });
        });
    }

    group.finish();
}

fn bench_search_with_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_index_search_filtered");

    let dimensions = 128;
    let size = 10_000;
    let index = build_index(size, dimensions);
    let query = random_vector(dimensions);
    let runtime = tokio::runtime::Runtime::new().unwrap();

    // A filter that never matches still has to walk the whole candidate set,
    // since filtering happens before truncation — this measures that floor.
    let filter = VectorFilter { tags: vec!["nonexistent-tag".into()], ..Default::default() };

    group.bench_function("unfiltered_10k", |bencher| {
        bencher.iter(|| {
            runtime.block_on(async {
                let results = index.search("bench-space", None, Some(&query), &VectorFilter::default(), 10).await.unwrap();
                black_box(&results);
            })
        });
    });

    group.bench_function("filtered_no_match_10k", |bencher| {
        bencher.iter(|| {
            runtime.block_on(async {
                let results = index.search("bench-space", None, Some(&query), &filter, 10).await.unwrap();
                black_box(&results);
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cosine_similarity, bench_index_search, bench_search_with_filter);
criterion_main!(benches);

use std::hint::black_box;

use chem_search::{MatchResult, RankingMode, SearchStrategy, rank};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

/// Fingerprint hits with roughly four sub-index variants per component.
fn fingerprint_hits(count: usize) -> Vec<MatchResult> {
    (0..count)
        .map(|i| {
            let mut result = MatchResult::new(format!("C{:04}|{}", i / 4, i % 4));
            result.fp_type = Some(if i % 2 == 0 { "TREE" } else { "MACCS" }.to_string());
            result.fp_score = Some(((i * 7919) % 1000) as f64 / 1000.0);
            result
        })
        .collect()
}

fn graph_hits(count: usize) -> Vec<MatchResult> {
    (0..count)
        .map(|i| MatchResult::new(format!("G{:04}|{}", i / 3, i % 3)))
        .collect()
}

fn bench_rank_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_modes");

    for size in [100usize, 1_000, 10_000] {
        let fingerprint = fingerprint_hits(size);
        let graph = graph_hits(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(
            BenchmarkId::new("fingerprint_score_aware", size),
            &fingerprint,
            |b, hits| {
                b.iter(|| {
                    rank(
                        black_box(hits),
                        SearchStrategy::FingerprintSimilarity,
                        RankingMode::ScoreAware,
                    )
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("graph_identifier_only", size),
            &graph,
            |b, hits| {
                b.iter(|| {
                    rank(
                        black_box(hits),
                        SearchStrategy::GraphRelaxed,
                        RankingMode::IdentifierOnly,
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_rank_modes);
criterion_main!(benches);

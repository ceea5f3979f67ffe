//! Benchmarks for read file classification.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quasan::reads::{classify_extension, classify_strand};

const NAMES: [&str; 6] = [
    "STRAIN01_S1_L001_R1_001.fastq.gz",
    "STRAIN01_S1_L001_R2_001.fastq.gz",
    "STRAIN01_R1.fq",
    "STRAIN01R2.fastq",
    "movie.subreads.bam",
    "README.txt",
];

fn classify_benchmark(c: &mut Criterion) {
    c.bench_function("classify_extension", |b| {
        b.iter(|| {
            for name in NAMES {
                black_box(classify_extension(black_box(name)));
            }
        });
    });
    c.bench_function("classify_strand", |b| {
        b.iter(|| {
            for name in NAMES {
                black_box(classify_strand(black_box(name)));
            }
        });
    });
}

criterion_group!(benches, classify_benchmark);
criterion_main!(benches);

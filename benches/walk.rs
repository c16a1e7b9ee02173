//! Benchmarks for import passes over synthetic images.
//!
//! - Header chain only
//! - A full pass over a small image (a handful of modules)
//! - A full pass over a large image (hundreds of modules and thousands of thunks)
//! - A full pass with records streamed to a collecting reporter

extern crate impscope;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use impscope::{
    pe::{HeaderInfo, ImageBuilder},
    report::RecordLog,
    ImageMemory, InspectConfig, Inspector, MappedImage,
};
use std::hint::black_box;

fn build_image(modules: usize, thunks: usize) -> MappedImage {
    let mut builder = ImageBuilder::pe32_plus();
    for module in 0..modules {
        builder = builder.module(&format!("MODULE{module:04}.DLL"));
        for thunk in 0..thunks {
            builder = if thunk % 4 == 0 {
                builder.by_ordinal(thunk as u16)
            } else {
                builder.by_name(&format!("Function{module}_{thunk}"))
            };
        }
    }
    builder.build()
}

/// Benchmark reading and validating the header chain.
fn bench_header(c: &mut Criterion) {
    let image = build_image(4, 8);

    c.bench_function("header_read", |b| {
        b.iter(|| {
            let header = HeaderInfo::read(black_box(&image)).unwrap();
            black_box(header)
        });
    });
}

/// Benchmark complete snapshots over a small and a large image.
fn bench_snapshot(c: &mut Criterion) {
    for (name, modules, thunks) in [("small", 4, 8), ("large", 256, 32)] {
        let image = build_image(modules, thunks);
        let inspector = Inspector::new(&image, InspectConfig::default());

        let mut group = c.benchmark_group(format!("snapshot_{name}"));
        group.throughput(Throughput::Elements((modules * thunks) as u64));
        group.bench_function("snapshot", |b| {
            b.iter(|| {
                let snapshot = black_box(&inspector).snapshot().unwrap();
                black_box(snapshot)
            });
        });
        group.finish();

        println!("{name}: {} bytes of image", image.len());
    }
}

/// Benchmark a pass that streams every record into a reporter.
fn bench_reported_pass(c: &mut Criterion) {
    let image = build_image(64, 16);
    let inspector = Inspector::new(&image, InspectConfig::default());

    c.bench_function("pass_record_log", |b| {
        b.iter(|| {
            let mut log = RecordLog::default();
            inspector.pass(&mut log).unwrap();
            black_box(log)
        });
    });
}

criterion_group!(benches, bench_header, bench_snapshot, bench_reported_pass);
criterion_main!(benches);

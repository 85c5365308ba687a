//! Benchmark: parse the protocol header fixture, generate the dissector from a parsed
//! model, and the two together.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dissectgen::{generate, parse};
use std::path::PathBuf;

fn bench_generate(c: &mut Criterion) {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let header_path = manifest.join("tests/fixtures/communication.h");
    let source = std::fs::read_to_string(&header_path).expect("read header");
    let model = parse(&source).expect("parse header");
    let output = generate(&model).expect("generate");
    eprintln!(
        "generate: {} message(s), {} input bytes, {} output bytes",
        model.messages.len(),
        source.len(),
        output.len()
    );

    c.bench_function("parse_communication_h", |b| {
        b.iter(|| black_box(parse(black_box(&source)).expect("parse")));
    });

    c.bench_function("generate_communication_h", |b| {
        b.iter(|| black_box(generate(black_box(&model)).expect("generate")));
    });

    c.bench_function("parse_and_generate_communication_h", |b| {
        b.iter(|| {
            let model = parse(black_box(&source)).expect("parse");
            black_box(generate(&model).expect("generate"))
        });
    });
}

criterion_group!(benches, bench_generate);
criterion_main!(benches);

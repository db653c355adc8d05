//! Benchmarks for parsing and resume generation.
//!
//! Run with: cargo bench -p failfixer-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use failfixer_core::{
    GcodeParser, LayerMapper, ResumeConfig, ResumeGenerator, ResumeMode, Validator,
    DEFAULT_TOLERANCE_MM,
};
use std::hint::black_box;

/// Generate a sliced-looking file with `layers` layers of `moves` extrusions each
fn generate_gcode(layers: usize, moves: usize) -> String {
    let mut text = String::from(
        "; generated by bench\nM140 S60\nM104 S210\nG28\nG21\nG90\nM82\nM190 S60\nM109 S210\n",
    );
    let mut e = 0.0;
    for layer in 0..layers {
        let z = 0.2 * (layer + 1) as f64;
        text.push_str(&format!(";LAYER:{}\nG1 Z{:.2} F600\n", layer, z));
        for i in 0..moves {
            e += 0.05;
            let x = 10.0 + (i % 100) as f64;
            let y = 10.0 + (i / 100) as f64;
            text.push_str(&format!("G1 X{:.3} Y{:.3} E{:.5} ; infill\n", x, y, e));
        }
    }
    text
}

/// Benchmark parsing for different file sizes
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let sizes = [(50, 100, "small"), (200, 500, "medium"), (500, 2000, "large")];

    for (layers, moves, name) in sizes {
        let text = generate_gcode(layers, moves);
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::new("parse_str", name), &text, |b, text| {
            let parser = GcodeParser::new();
            b.iter(|| parser.parse_str(black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark layer lookup plus generation and validation
fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");

    let text = generate_gcode(200, 500);
    let doc = GcodeParser::new().parse_str(&text);
    let mapper = LayerMapper::new(&doc.layers, DEFAULT_TOLERANCE_MM).unwrap();
    let layer = mapper.by_layer_number(100).unwrap();

    for mode in [ResumeMode::InAir, ResumeMode::FromPlate] {
        let config = ResumeConfig::new(layer.layer.number, layer.layer.z_height, 60.0, 210.0)
            .mode(mode);

        group.bench_with_input(
            BenchmarkId::new("generate", mode.as_str()),
            &config,
            |b, config| {
                let generator = ResumeGenerator::new();
                b.iter(|| generator.generate(black_box(&doc), &layer, config));
            },
        );

        let lines = ResumeGenerator::new().generate(&doc, &layer, &config);
        group.bench_with_input(
            BenchmarkId::new("validate", mode.as_str()),
            &lines,
            |b, lines| {
                let validator = Validator::new();
                b.iter(|| {
                    validator.validate(
                        black_box(lines),
                        config.output_resume_z(),
                        config.safe_lift_mm,
                        mode,
                    )
                });
            },
        );
    }

    group.bench_function("by_z_height", |b| {
        b.iter(|| mapper.by_z_height(black_box(20.07)).unwrap());
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_parse, bench_generate
}
criterion_main!(benches);

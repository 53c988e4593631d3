use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ravendl::downloader::progress::parse_percent;
use ravendl::extractor::{project_value, JsonReassembler};
use serde_json::{json, Value};

fn metadata_with_formats(count: usize) -> Value {
    let formats: Vec<Value> = (0..count)
        .map(|i| {
            if i % 3 == 0 {
                json!({"format_id": format!("a{}", i), "vcodec": "none", "acodec": "opus",
                       "resolution": "audio only", "ext": "webm", "abr": 128.0,
                       "filesize": 3_145_728})
            } else {
                json!({"format_id": format!("v{}", i), "vcodec": "avc1.640028", "acodec": "none",
                       "resolution": "1920x1080", "ext": "mp4", "format_note": "1080p",
                       "filesize_approx": 52_428_800})
            }
        })
        .collect();
    json!({"id": "abc", "title": "Demo", "duration": 212.0, "formats": formats})
}

fn benchmark_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Format Projection");

    for count in [10usize, 50, 200] {
        let value = metadata_with_formats(count);
        group.bench_with_input(BenchmarkId::new("project_value", count), &value, |b, value| {
            b.iter(|| project_value(black_box(value)))
        });
    }

    group.finish();
}

fn benchmark_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stream Reassembly");

    let pretty = serde_json::to_string_pretty(&metadata_with_formats(50)).unwrap_or_default();
    let lines: Vec<String> = pretty.lines().map(|l| format!("{}\n", l)).collect();
    group.bench_function("pretty_printed_lines", |b| {
        b.iter(|| {
            let mut reassembler = JsonReassembler::new();
            let mut objects = 0;
            for line in &lines {
                if reassembler.push(black_box(line)).is_some() {
                    objects += 1;
                }
            }
            objects
        })
    });

    let compact = format!("{}\n", metadata_with_formats(50));
    group.bench_function("single_line", |b| {
        b.iter(|| JsonReassembler::new().push(black_box(&compact)))
    });

    group.finish();
}

fn benchmark_progress_lines(c: &mut Criterion) {
    let line = "[download]  42.7% of  118.34MiB at    2.91MiB/s ETA 00:23";
    c.bench_function("parse_percent", |b| b.iter(|| parse_percent(black_box(line))));
}

criterion_group!(
    benches,
    benchmark_projection,
    benchmark_reassembly,
    benchmark_progress_lines
);
criterion_main!(benches);

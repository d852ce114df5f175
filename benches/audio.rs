//! Micro-benchmarks for reference-mel extraction.
//!
//! Run with: `cargo bench --bench audio`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use qwen3_tts_finetune::audio::{decode_wav, save_wav, AudioBuffer, ReferenceMelExtractor};
use std::f32::consts::PI;
use std::hint::black_box;

/// 440 Hz sine at 24 kHz
fn sine_wave(duration_secs: f32) -> Vec<f32> {
    let n = (duration_secs * 24000.0) as usize;
    (0..n)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / 24000.0).sin())
        .collect()
}

fn bench_reference_mel(c: &mut Criterion) {
    let extractor = ReferenceMelExtractor::new();
    let mut group = c.benchmark_group("reference_mel");

    for duration in [0.5, 3.0, 10.0] {
        let audio = AudioBuffer::new(sine_wave(duration), 24000);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{duration}s")),
            &duration,
            |b, _| {
                b.iter(|| extractor.extract(black_box(&audio)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_decode_wav(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ref.wav");
    save_wav(&path, &sine_wave(3.0), 24000).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    c.bench_function("decode_wav_3s", |b| {
        b.iter(|| decode_wav(black_box(&bytes)).unwrap());
    });
}

criterion_group!(benches, bench_reference_mel, bench_decode_wav);
criterion_main!(benches);

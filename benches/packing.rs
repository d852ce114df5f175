//! Benchmarks for sequence packing and batch assembly.
//!
//! Run with: `cargo bench --bench packing`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use qwen3_tts_finetune::{
    assemble_batch, ControlTokens, PackedSequence, ReferenceMel, SequencePacker,
};
use std::hint::black_box;

/// Text of `text_len` tokens and `frames` x 16 codes
fn example(text_len: usize, frames: usize) -> (Vec<u32>, Vec<Vec<u32>>) {
    let text = (0..text_len as u32).map(|i| 1000 + i).collect();
    let codes = (0..frames as u32)
        .map(|f| (0..16).map(|g| (f * 7 + g) % 2048).collect())
        .collect();
    (text, codes)
}

fn bench_pack(c: &mut Criterion) {
    let packer = SequencePacker::new(ControlTokens::qwen3_tts_12hz());
    let mut group = c.benchmark_group("pack");

    // ~12.5 frames per second of audio
    for (text_len, frames) in [(16, 40), (64, 250), (256, 1000)] {
        let (text, codes) = example(text_len, frames);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("lt{text_len}_ca{frames}")),
            &frames,
            |b, _| {
                b.iter(|| packer.pack_frames(black_box(&text), black_box(&codes)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let packer = SequencePacker::new(ControlTokens::qwen3_tts_12hz());
    let mut group = c.benchmark_group("assemble_batch");

    for batch_size in [1, 8, 32] {
        let sequences: Vec<PackedSequence> = (0..batch_size)
            .map(|i| {
                let (text, codes) = example(20 + i * 3, 100 + i * 17);
                packer.pack_frames(&text, &codes).unwrap()
            })
            .collect();
        let mels: Vec<ReferenceMel> = (0..batch_size)
            .map(|_| ReferenceMel::from_frames(vec![vec![0.0; 128]; 280]).unwrap())
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, _| {
                b.iter(|| assemble_batch(black_box(&sequences), black_box(&mels)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pack, bench_assemble);
criterion_main!(benches);

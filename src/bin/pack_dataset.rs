//! CLI tool for packing a fine-tuning JSONL into safetensors batches
//!
//! Each input line needs `text`, `audio_codes` (frames x 16) and `ref_audio`
//! (a 24 kHz WAV path or base64 WAV). One `batch_XXXXX.safetensors` file is
//! written per batch, plus a `manifest.json` describing them.
//!
//! Usage:
//!     cargo run --features cli --bin pack_dataset -- --input train.jsonl --model test_data/model
//!     cargo run --features cli --bin pack_dataset -- --input train.jsonl --model test_data/model --batch-size 4 --output-dir packed

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use qwen3_tts_finetune::{profiling, ControlTokens, PackingConfig, TextTokenizer, TtsDataset};

/// Pack Qwen3-TTS training examples into padded tensor batches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training JSONL with pre-computed audio codes
    #[arg(short, long)]
    input: PathBuf,

    /// Model directory or HuggingFace ID providing config.json and the tokenizer
    #[arg(short, long, default_value = "test_data/model")]
    model: String,

    /// Tokenizer file or directory (defaults to --model)
    #[arg(long)]
    tokenizer: Option<String>,

    /// Output directory for batch files
    #[arg(short, long, default_value = "packed")]
    output_dir: PathBuf,

    /// Examples per batch
    #[arg(short, long, default_value_t = 8)]
    batch_size: usize,

    /// JSON file with packing limits (max_sequence_length, batch_margin)
    #[arg(long)]
    packing_config: Option<PathBuf>,

    /// Override the maximum packed sequence length
    #[arg(long)]
    max_seq_len: Option<usize>,

    /// Write a Chrome trace to this file (requires the `profiling` feature)
    #[arg(long)]
    trace: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BatchEntry {
    file: String,
    examples: usize,
    seq_len: usize,
    label_tokens: usize,
    ref_mel_frames: usize,
}

#[derive(Debug, Serialize)]
struct Manifest {
    source: String,
    batch_size: usize,
    max_sequence_length: usize,
    batch_margin: usize,
    total_examples: usize,
    batches: Vec<BatchEntry>,
}

fn validate_args(args: &Args) -> Result<()> {
    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be at least 1");
    }
    if args.max_seq_len == Some(0) {
        anyhow::bail!("--max-seq-len must be positive");
    }
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    Ok(())
}

fn load_packing_config(args: &Args) -> Result<PackingConfig> {
    let config = match &args.packing_config {
        Some(path) => PackingConfig::from_file(path)?,
        None => PackingConfig::default(),
    };
    Ok(match args.max_seq_len {
        Some(max) => config.with_max_sequence_length(max),
        None => config,
    })
}

fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    let path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _profiling_guard = profiling::init(args.trace.as_deref());
    validate_args(&args)?;

    let start = Instant::now();
    let config = load_packing_config(&args)?;
    let control = ControlTokens::from_pretrained(&args.model)?;
    let tokenizer =
        TextTokenizer::from_pretrained(args.tokenizer.as_deref().unwrap_or(&args.model))?;
    let dataset = TtsDataset::from_jsonl(&args.input, tokenizer, control, config.clone())?;

    if dataset.is_empty() {
        anyhow::bail!("No records in {}", args.input.display());
    }

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    println!(
        "Packing {} examples from {} in batches of {}",
        dataset.len(),
        args.input.display(),
        args.batch_size
    );

    let progress = ProgressBar::new(dataset.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} examples",
            )?
            .progress_chars("#>-"),
    );

    let mut entries = Vec::new();
    for (i, batch) in dataset.batches(args.batch_size).enumerate() {
        let batch = batch.with_context(|| format!("Failed to build batch {}", i))?;
        let file = format!("batch_{:05}.safetensors", i);
        batch.save(args.output_dir.join(&file))?;

        tracing::debug!(batch = i, seq_len = batch.seq_len(), "Wrote {}", file);
        progress.inc(batch.batch_size() as u64);
        entries.push(BatchEntry {
            file,
            examples: batch.batch_size(),
            seq_len: batch.seq_len(),
            label_tokens: batch.num_label_tokens(),
            ref_mel_frames: batch.ref_mels().n_frames(),
        });
    }
    progress.finish();

    let manifest = Manifest {
        source: args.input.display().to_string(),
        batch_size: args.batch_size,
        max_sequence_length: config.max_sequence_length,
        batch_margin: config.batch_margin,
        total_examples: dataset.len(),
        batches: entries,
    };
    write_manifest(&args.output_dir, &manifest)?;

    let longest = manifest.batches.iter().map(|b| b.seq_len).max().unwrap_or(0);
    let label_tokens: usize = manifest.batches.iter().map(|b| b.label_tokens).sum();
    println!("\nPacked {} batches in {:.2}s", manifest.batches.len(), start.elapsed().as_secs_f64());
    println!("  Examples:        {}", manifest.total_examples);
    println!("  Longest batch:   {} positions", longest);
    println!("  Label tokens:    {}", label_tokens);
    println!("  Output:          {}", args.output_dir.display());

    Ok(())
}

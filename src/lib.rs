//! # Qwen3-TTS fine-tuning
//!
//! Training-data preparation for [Qwen3-TTS](https://github.com/QwenLM/Qwen3-TTS)
//! talker fine-tuning: text plus pre-computed 16-codebook audio codes in,
//! padded two-channel training tensors out.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qwen3_tts_finetune::{ControlTokens, PackingConfig, TextTokenizer, TtsDataset};
//!
//! let tokenizer = TextTokenizer::from_pretrained("path/to/model")?;
//! let control = ControlTokens::from_pretrained("path/to/model")?;
//! let dataset = TtsDataset::from_jsonl("train.jsonl", tokenizer, control, PackingConfig::default())?;
//!
//! for (i, batch) in dataset.batches(8).enumerate() {
//!     batch?.save(format!("batch_{i:05}.safetensors"))?;
//! }
//! ```
//!
//! ## Sequence layout
//!
//! Each example becomes one sequence of length `T = 8 + Lt + Ca` with two
//! parallel channels, where `Lt` is the tokenized text length (chat prefix
//! included) and `Ca` the number of audio frames:
//!
//! 1. **Text channel**: chat prefix, four text pads, text bos, the utterance,
//!    text eos, then text pads to the end.
//! 2. **Codec channel**: zeros under the chat prefix, the nothink / think
//!    markers, a zero slot at position 6 that the trainer overwrites with the
//!    speaker embedding, codec pads under the text, then codec bos, the
//!    codebook-0 frames, and codec eos on the last position.
//!
//! Text and codec overlap only at the bos/pad boundary; the talker is trained
//! to predict codebook 0 over the frames and codec eos at `T - 1`, everything
//! else carries the ignore label `-100`.
//!
//! [`Batch::to_tensors`] produces the named tensors the training loop reads;
//! [`Batch::save`] writes them as safetensors.
//!
//! ## Reference audio
//!
//! Reference mels are 128-bin log-magnitude spectrograms of 24 kHz audio
//! (hop 256). Other sample rates are rejected rather than resampled.

pub mod audio;
pub mod config;
pub mod data;
pub mod error;
#[cfg(feature = "hub")]
pub mod hub;
pub mod profiling;
pub mod tokenizer;

/// Re-exports for convenience
pub use audio::{AudioBuffer, AudioInput, ReferenceMel, ReferenceMelExtractor};
pub use config::{codec_tokens, tts_tokens, ControlTokens, PackingConfig};
pub use data::{
    assemble_batch, load_jsonl, pack, Batch, BatchAssembler, ExampleFeatures, PackedSequence,
    SequenceLayout, SequencePacker, TrainingRecord, TtsDataset, IGNORE_INDEX, NUM_CODE_GROUPS,
};
pub use error::PackError;
#[cfg(feature = "hub")]
pub use hub::ModelFiles;
pub use tokenizer::TextTokenizer;

/// A sequence of codec frames, where each frame contains 16 codebook values
/// (1 semantic + 15 acoustic, formatted as `[semantic, acoustic_0..14]`).
pub type FrameCodes = Vec<Vec<u32>>;

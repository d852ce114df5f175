//! Training-example packing and batching.
//!
//! [`SequencePacker`] lays out one example as a two-channel sequence with its
//! masks and labels; [`BatchAssembler`] right-pads several of them into a
//! [`Batch`]. [`TtsDataset`] drives both from JSONL records.

mod batch;
mod dataset;
mod layout;
mod packer;
mod record;

pub use batch::{assemble_batch, Batch, BatchAssembler, BatchRow};
pub use dataset::{ExampleFeatures, TtsDataset};
pub use layout::{SequenceLayout, CODEC_EMBED_START, MIN_TEXT_TOKENS, PREFIX_LEN, SPEAKER_EMBED_POS};
pub use packer::{pack, PackedSequence, SequencePacker, IGNORE_INDEX, NUM_CODE_GROUPS};
pub use record::{load_jsonl, parse_jsonl, RefAudio, TrainingRecord};

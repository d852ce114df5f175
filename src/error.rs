//! Error type for packing and batching.
//!
//! Everything that can go wrong inside the packer or the batch assembler is
//! a [`PackError`]. The loaders around them (config files, tokenizer, audio,
//! JSONL) use `anyhow` and wrap these with context.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    /// Tokenized text is missing its three chat-control tokens or content.
    #[error("tokenized text has {len} tokens, need at least {min}")]
    TextTooShort { len: usize, min: usize },

    #[error("codec sequence is empty")]
    EmptyCodes,

    /// `codec0` and the full code matrix disagree on frame count.
    #[error("codebook-0 sequence has {codec0} frames but code matrix has {rows} rows")]
    CodeRowMismatch { codec0: usize, rows: usize },

    #[error("codec frame {frame} has {groups} codebooks, expected {expected}")]
    CodeGroupMismatch {
        frame: usize,
        groups: usize,
        expected: usize,
    },

    #[error("codec frame {frame}: codebook-0 value {expected} does not match matrix column 0 ({found})")]
    PrimaryCodeMismatch {
        frame: usize,
        expected: u32,
        found: u32,
    },

    #[error("cannot assemble an empty batch")]
    EmptyBatch,

    #[error("sequence {index} has length {len}, exceeding the maximum of {max}")]
    SequenceTooLong { index: usize, len: usize, max: usize },

    #[error("batch has {sequences} sequences but {ref_mels} reference mels")]
    RefMelCountMismatch { sequences: usize, ref_mels: usize },

    /// Reference clip too short for reflect padding, so it yields no mel frames.
    #[error("reference audio has {samples} samples, need at least {min}")]
    ReferenceTooShort { samples: usize, min: usize },

    #[error("reference mel of sequence {index} has no frames")]
    EmptyReferenceMel { index: usize },

    #[error("mel frame {frame} has {bins} bins, expected {expected}")]
    MelBinMismatch {
        frame: usize,
        bins: usize,
        expected: usize,
    },

    /// Model configuration lacks one of the control token IDs.
    #[error("control token `{0}` is missing from the model configuration")]
    MissingControlToken(String),

    #[error("reference audio must be sampled at {expected} Hz, got {found} Hz")]
    UnsupportedSampleRate { found: u32, expected: u32 },
}

impl PackError {
    /// Input data is malformed (bad lengths or shapes).
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::TextTooShort { .. }
                | Self::EmptyCodes
                | Self::CodeRowMismatch { .. }
                | Self::CodeGroupMismatch { .. }
                | Self::PrimaryCodeMismatch { .. }
                | Self::EmptyBatch
                | Self::SequenceTooLong { .. }
                | Self::RefMelCountMismatch { .. }
                | Self::ReferenceTooShort { .. }
                | Self::EmptyReferenceMel { .. }
                | Self::MelBinMismatch { .. }
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingControlToken(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::UnsupportedSampleRate { .. })
    }
}

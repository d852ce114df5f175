//! Batch assembler: right-pads packed sequences into dense training tensors.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use crate::audio::ReferenceMel;
use crate::config::PackingConfig;
use crate::error::PackError;

use super::packer::{PackedSequence, IGNORE_INDEX, NUM_CODE_GROUPS};

/// A padded minibatch.
///
/// Per-position buffers are row-major `[batch_size, seq_len, ...]`; row `i`
/// is input example `i`. Positions at or beyond an example's length are
/// zero (`false` for masks, [`IGNORE_INDEX`] for labels).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    batch_size: usize,
    seq_len: usize,
    lengths: Vec<usize>,
    /// `[N, T, 2]`: text channel, codec channel
    input_ids: Vec<u32>,
    /// `[N, T, 16]`
    codec_ids: Vec<u32>,
    text_embedding_mask: Vec<bool>,
    codec_embedding_mask: Vec<bool>,
    codec_mask: Vec<bool>,
    attention_mask: Vec<bool>,
    codec_0_labels: Vec<i64>,
    ref_mels: ReferenceMel,
    ref_mel_ranges: Vec<Range<usize>>,
}

/// Borrowed view of one batch row
#[derive(Debug, Clone, Copy)]
pub struct BatchRow<'a> {
    pub length: usize,
    pub input_ids: &'a [u32],
    pub codec_ids: &'a [u32],
    pub text_embedding_mask: &'a [bool],
    pub codec_embedding_mask: &'a [bool],
    pub codec_mask: &'a [bool],
    pub attention_mask: &'a [bool],
    pub codec_0_labels: &'a [i64],
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Padded length `T_max`
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Unpadded length of every row
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn input_ids(&self) -> &[u32] {
        &self.input_ids
    }

    pub fn codec_ids(&self) -> &[u32] {
        &self.codec_ids
    }

    pub fn text_embedding_mask(&self) -> &[bool] {
        &self.text_embedding_mask
    }

    pub fn codec_embedding_mask(&self) -> &[bool] {
        &self.codec_embedding_mask
    }

    pub fn codec_mask(&self) -> &[bool] {
        &self.codec_mask
    }

    pub fn attention_mask(&self) -> &[bool] {
        &self.attention_mask
    }

    pub fn codec_0_labels(&self) -> &[i64] {
        &self.codec_0_labels
    }

    /// All reference mels concatenated along the frame axis
    pub fn ref_mels(&self) -> &ReferenceMel {
        &self.ref_mels
    }

    /// Frame range of each example's reference inside [`ref_mels`](Self::ref_mels)
    pub fn ref_mel_ranges(&self) -> &[Range<usize>] {
        &self.ref_mel_ranges
    }

    /// Row `i` across every per-position buffer, including padding.
    /// `None` if `i` is not below [`batch_size`](Self::batch_size).
    pub fn row(&self, i: usize) -> Option<BatchRow<'_>> {
        if i >= self.batch_size {
            return None;
        }
        let t = self.seq_len;
        let span = i * t..(i + 1) * t;
        Some(BatchRow {
            length: self.lengths[i],
            input_ids: &self.input_ids[span.start * 2..span.end * 2],
            codec_ids: &self.codec_ids[span.start * NUM_CODE_GROUPS..span.end * NUM_CODE_GROUPS],
            text_embedding_mask: &self.text_embedding_mask[span.clone()],
            codec_embedding_mask: &self.codec_embedding_mask[span.clone()],
            codec_mask: &self.codec_mask[span.clone()],
            attention_mask: &self.attention_mask[span.clone()],
            codec_0_labels: &self.codec_0_labels[span],
        })
    }

    /// Number of label positions that contribute to the loss
    pub fn num_label_tokens(&self) -> usize {
        self.codec_0_labels
            .iter()
            .filter(|&&l| l != IGNORE_INDEX)
            .count()
    }

    /// Convert to named tensors in the layout the talker training loop reads.
    ///
    /// | name | dtype | shape |
    /// |---|---|---|
    /// | `input_ids` | i64 | `[N, T, 2]` |
    /// | `codec_ids` | i64 | `[N, T, 16]` |
    /// | `attention_mask` | i64 | `[N, T]` |
    /// | `text_embedding_mask` | u8 | `[N, T, 1]` |
    /// | `codec_embedding_mask` | u8 | `[N, T, 1]` |
    /// | `codec_mask` | u8 | `[N, T]` |
    /// | `codec_0_labels` | i64 | `[N, T]` |
    /// | `ref_mels` | f32 | `[F, 128]` |
    pub fn to_tensors(&self, device: &Device) -> Result<HashMap<String, Tensor>> {
        let (n, t) = (self.batch_size, self.seq_len);
        let ids = |v: &[u32]| v.iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
        let mask = |v: &[bool]| v.iter().map(|&m| u8::from(m)).collect::<Vec<_>>();

        let mut tensors = HashMap::new();
        tensors.insert(
            "input_ids".to_string(),
            Tensor::from_vec(ids(&self.input_ids), (n, t, 2), device)?,
        );
        tensors.insert(
            "codec_ids".to_string(),
            Tensor::from_vec(ids(&self.codec_ids), (n, t, NUM_CODE_GROUPS), device)?,
        );
        tensors.insert(
            "attention_mask".to_string(),
            Tensor::from_vec(
                self.attention_mask
                    .iter()
                    .map(|&m| i64::from(m))
                    .collect::<Vec<_>>(),
                (n, t),
                device,
            )?,
        );
        tensors.insert(
            "text_embedding_mask".to_string(),
            Tensor::from_vec(mask(&self.text_embedding_mask), (n, t, 1), device)?,
        );
        tensors.insert(
            "codec_embedding_mask".to_string(),
            Tensor::from_vec(mask(&self.codec_embedding_mask), (n, t, 1), device)?,
        );
        tensors.insert(
            "codec_mask".to_string(),
            Tensor::from_vec(mask(&self.codec_mask), (n, t), device)?,
        );
        tensors.insert(
            "codec_0_labels".to_string(),
            Tensor::from_vec(self.codec_0_labels.clone(), (n, t), device)?,
        );
        tensors.insert(
            "ref_mels".to_string(),
            Tensor::from_vec(
                self.ref_mels.as_slice().to_vec(),
                (self.ref_mels.n_frames(), self.ref_mels.n_mels()),
                device,
            )?,
        );
        Ok(tensors)
    }

    /// Write the tensors of [`to_tensors`](Self::to_tensors) to a safetensors file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tensors = self.to_tensors(&Device::Cpu)?;
        candle_core::safetensors::save(&tensors, path)
            .with_context(|| format!("Failed to write batch to {}", path.display()))
    }
}

/// Assemble with the default [`PackingConfig`]. See [`BatchAssembler::assemble`].
pub fn assemble_batch(
    sequences: &[PackedSequence],
    ref_mels: &[ReferenceMel],
) -> Result<Batch, PackError> {
    BatchAssembler::default().assemble(sequences, ref_mels)
}

/// Pads packed sequences to a common length
#[derive(Debug, Clone, Default)]
pub struct BatchAssembler {
    config: PackingConfig,
}

impl BatchAssembler {
    pub fn new(config: PackingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    /// Stack `sequences` into one batch padded to `max(T_i) + batch_margin`.
    ///
    /// `ref_mels[i]` belongs to `sequences[i]` and must have at least one
    /// frame. All inputs are validated before anything is allocated.
    pub fn assemble(
        &self,
        sequences: &[PackedSequence],
        ref_mels: &[ReferenceMel],
    ) -> Result<Batch, PackError> {
        if sequences.is_empty() {
            return Err(PackError::EmptyBatch);
        }
        if ref_mels.len() != sequences.len() {
            return Err(PackError::RefMelCountMismatch {
                sequences: sequences.len(),
                ref_mels: ref_mels.len(),
            });
        }
        if let Some(index) = ref_mels.iter().position(|m| m.n_frames() == 0) {
            return Err(PackError::EmptyReferenceMel { index });
        }
        let max = self.config.max_sequence_length;
        if let Some((index, seq)) = sequences.iter().enumerate().find(|(_, s)| s.len() > max) {
            return Err(PackError::SequenceTooLong {
                index,
                len: seq.len(),
                max,
            });
        }

        let n = sequences.len();
        let lengths: Vec<usize> = sequences.iter().map(PackedSequence::len).collect();
        let t = lengths.iter().copied().max().unwrap_or(0) + self.config.batch_margin;

        let mut input_ids = vec![0u32; n * t * 2];
        let mut codec_ids = vec![0u32; n * t * NUM_CODE_GROUPS];
        let mut text_embedding_mask = vec![false; n * t];
        let mut codec_embedding_mask = vec![false; n * t];
        let mut codec_mask = vec![false; n * t];
        let mut attention_mask = vec![false; n * t];
        let mut codec_0_labels = vec![IGNORE_INDEX; n * t];

        for (i, seq) in sequences.iter().enumerate() {
            let len = seq.len();
            let row = i * t..i * t + len;

            input_ids[row.start * 2..row.end * 2].copy_from_slice(&seq.input_ids());
            codec_ids[row.start * NUM_CODE_GROUPS..row.end * NUM_CODE_GROUPS]
                .copy_from_slice(seq.codec_ids());
            text_embedding_mask[row.clone()].copy_from_slice(seq.text_embedding_mask());
            codec_embedding_mask[row.clone()].copy_from_slice(seq.codec_embedding_mask());
            codec_mask[row.clone()].copy_from_slice(seq.codec_mask());
            attention_mask[row.clone()].copy_from_slice(seq.attention_mask());
            codec_0_labels[row].copy_from_slice(seq.codec_0_labels());
        }

        let (ref_mels, ref_mel_ranges) = ReferenceMel::concat(ref_mels);

        tracing::debug!(
            batch_size = n,
            seq_len = t,
            ref_mel_frames = ref_mels.n_frames(),
            "Assembled batch"
        );

        Ok(Batch {
            batch_size: n,
            seq_len: t,
            lengths,
            input_ids,
            codec_ids,
            text_embedding_mask,
            codec_embedding_mask,
            codec_mask,
            attention_mask,
            codec_0_labels,
            ref_mels,
            ref_mel_ranges,
        })
    }
}

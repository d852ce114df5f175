//! Record-to-batch pipeline: tokenize, extract reference mels, pack, pad.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::audio::{AudioInput, ReferenceMel, ReferenceMelExtractor};
use crate::config::{ControlTokens, PackingConfig};
use crate::tokenizer::TextTokenizer;
use crate::FrameCodes;

use super::batch::{Batch, BatchAssembler};
use super::packer::{PackedSequence, SequencePacker};
use super::record::{load_jsonl, TrainingRecord};

/// Per-example inputs of the packer, before layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleFeatures {
    /// Assistant-template token IDs, chat suffix trimmed
    pub text_ids: Vec<u32>,
    /// `[frames][16]`
    pub audio_codes: FrameCodes,
    pub ref_mel: ReferenceMel,
}

/// A fine-tuning dataset over JSONL records.
pub struct TtsDataset {
    records: Vec<TrainingRecord>,
    tokenizer: TextTokenizer,
    packer: SequencePacker,
    assembler: BatchAssembler,
    mel: ReferenceMelExtractor,
}

impl TtsDataset {
    pub fn new(
        records: Vec<TrainingRecord>,
        tokenizer: TextTokenizer,
        control: ControlTokens,
        config: PackingConfig,
    ) -> Self {
        Self {
            records,
            tokenizer,
            packer: SequencePacker::new(control),
            assembler: BatchAssembler::new(config),
            mel: ReferenceMelExtractor::new(),
        }
    }

    pub fn from_jsonl<P: AsRef<Path>>(
        path: P,
        tokenizer: TextTokenizer,
        control: ControlTokens,
        config: PackingConfig,
    ) -> Result<Self> {
        let records = load_jsonl(path)?;
        Ok(Self::new(records, tokenizer, control, config))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, idx: usize) -> Option<&TrainingRecord> {
        self.records.get(idx)
    }

    /// Tokenize the text and compute the reference mel of record `idx`.
    pub fn get(&self, idx: usize) -> Result<ExampleFeatures> {
        let record = self
            .records
            .get(idx)
            .ok_or_else(|| anyhow!("Record {} out of range ({} records)", idx, self.len()))?;

        let text_ids = self
            .tokenizer
            .encode_for_training(&record.text)
            .with_context(|| format!("Failed to tokenize record {}", idx))?;

        let reference = record
            .ref_audio
            .first()
            .ok_or_else(|| anyhow!("Record {} has an empty ref_audio list", idx))?;
        let audio = AudioInput::from_reference(reference)
            .and_then(|input| input.load())
            .with_context(|| format!("Failed to load reference audio of record {}", idx))?;
        let ref_mel = self
            .mel
            .extract(&audio)
            .with_context(|| format!("Failed to extract reference mel of record {}", idx))?;

        Ok(ExampleFeatures {
            text_ids,
            audio_codes: record.audio_codes.clone(),
            ref_mel,
        })
    }

    /// Pack each example and assemble them, in order, into one batch.
    pub fn collate(&self, features: &[ExampleFeatures]) -> Result<Batch> {
        let sequences = features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                self.packer
                    .pack_frames(&f.text_ids, &f.audio_codes)
                    .with_context(|| format!("Failed to pack example {} of batch", i))
            })
            .collect::<Result<Vec<PackedSequence>>>()?;
        let ref_mels: Vec<ReferenceMel> = features.iter().map(|f| f.ref_mel.clone()).collect();

        Ok(self.assembler.assemble(&sequences, &ref_mels)?)
    }

    /// Batch of the given record indices
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let features = indices
            .iter()
            .map(|&idx| self.get(idx))
            .collect::<Result<Vec<_>>>()?;
        self.collate(&features)
    }

    /// Consecutive batches of up to `batch_size` records in file order.
    /// A `batch_size` of 0 is treated as 1.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Result<Batch>> + '_ {
        let size = batch_size.max(1);
        let len = self.len();
        (0..len).step_by(size).map(move |start| {
            let indices: Vec<usize> = (start..(start + size).min(len)).collect();
            self.batch(&indices)
        })
    }
}

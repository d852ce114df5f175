//! Sequence packer: one (text, codes) example into a two-channel sequence.
//!
//! The text channel front-loads the utterance tokens and then idles on
//! text-pad; the codec channel idles on codec-pad until the text eos, then
//! emits codec bos, the codebook-0 frames and codec eos. Both channels share
//! the time axis, so codec content starts exactly where the text channel
//! has entered its pad tail.

use crate::config::ControlTokens;
use crate::error::PackError;

use super::layout::{SequenceLayout, CODEC_EMBED_START, SPEAKER_EMBED_POS};

/// Codebooks per codec frame (1 semantic + 15 acoustic)
pub const NUM_CODE_GROUPS: usize = 16;

/// Label value excluded from the codebook-0 loss
pub const IGNORE_INDEX: i64 = -100;

/// One fully laid-out training example prior to batch padding.
///
/// Every buffer has exactly [`len`](Self::len) positions; the codec-ID
/// matrix is row-major `[len, 16]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSequence {
    layout: SequenceLayout,
    text_channel: Vec<u32>,
    codec_channel: Vec<u32>,
    codec_ids: Vec<u32>,
    text_embedding_mask: Vec<bool>,
    codec_embedding_mask: Vec<bool>,
    codec_mask: Vec<bool>,
    attention_mask: Vec<bool>,
    codec_0_labels: Vec<i64>,
}

impl PackedSequence {
    pub fn layout(&self) -> SequenceLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.layout.total_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel A: text-vocabulary IDs
    pub fn text_channel(&self) -> &[u32] {
        &self.text_channel
    }

    /// Channel B: codec-vocabulary IDs; position 6 is a speaker-embedding placeholder
    pub fn codec_channel(&self) -> &[u32] {
        &self.codec_channel
    }

    /// Both channels interleaved as `[len, 2]`
    pub fn input_ids(&self) -> Vec<u32> {
        self.text_channel
            .iter()
            .zip(&self.codec_channel)
            .flat_map(|(&t, &c)| [t, c])
            .collect()
    }

    /// Full codec matrix, `[len, 16]` row-major
    pub fn codec_ids(&self) -> &[u32] {
        &self.codec_ids
    }

    pub fn codec_id_row(&self, pos: usize) -> &[u32] {
        &self.codec_ids[pos * NUM_CODE_GROUPS..(pos + 1) * NUM_CODE_GROUPS]
    }

    pub fn text_embedding_mask(&self) -> &[bool] {
        &self.text_embedding_mask
    }

    pub fn codec_embedding_mask(&self) -> &[bool] {
        &self.codec_embedding_mask
    }

    /// True exactly on the codebook-0 content positions
    pub fn codec_mask(&self) -> &[bool] {
        &self.codec_mask
    }

    pub fn attention_mask(&self) -> &[bool] {
        &self.attention_mask
    }

    pub fn codec_0_labels(&self) -> &[i64] {
        &self.codec_0_labels
    }
}

/// Pack one example. See [`SequencePacker::pack`].
pub fn pack(
    text_ids: &[u32],
    codec0: &[u32],
    codecs_full: &[Vec<u32>],
    control: &ControlTokens,
) -> Result<PackedSequence, PackError> {
    SequencePacker::new(*control).pack(text_ids, codec0, codecs_full)
}

/// Packs examples against a fixed control-token table.
#[derive(Debug, Clone)]
pub struct SequencePacker {
    control: ControlTokens,
}

impl SequencePacker {
    pub fn new(control: ControlTokens) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &ControlTokens {
        &self.control
    }

    /// Lay out one example.
    ///
    /// * `text_ids` - tokenized assistant template, chat suffix already trimmed
    /// * `codec0` - codebook-0 index per frame
    /// * `codecs_full` - `[frames][16]` code matrix whose column 0 is `codec0`
    ///
    /// Fails on text shorter than 4 tokens, empty codes, or a code matrix
    /// that does not match `codec0`.
    pub fn pack(
        &self,
        text_ids: &[u32],
        codec0: &[u32],
        codecs_full: &[Vec<u32>],
    ) -> Result<PackedSequence, PackError> {
        let layout = SequenceLayout::new(text_ids.len(), codec0.len())?;
        validate_codes(codec0, codecs_full)?;

        let c = &self.control;
        let len = layout.total_len();

        let mut text_channel = vec![0u32; len];
        text_channel[layout.chat_prefix()].copy_from_slice(&text_ids[layout.chat_prefix()]);
        text_channel[layout.text_pad_head()].fill(c.text_pad);
        text_channel[layout.text_bos()] = c.text_bos;
        text_channel[layout.text_content()].copy_from_slice(&text_ids[layout.chat_prefix().end..]);
        text_channel[layout.text_eos()] = c.text_eos;
        text_channel[layout.text_pad_tail()].fill(c.text_pad);

        let mut codec_channel = vec![0u32; len];
        codec_channel[CODEC_EMBED_START..SPEAKER_EMBED_POS].copy_from_slice(&[
            c.codec_nothink,
            c.codec_think_bos,
            c.codec_think_eos,
        ]);
        codec_channel[layout.codec_pad_run()].fill(c.codec_pad);
        codec_channel[layout.codec_bos()] = c.codec_bos;
        codec_channel[layout.codec_frames()].copy_from_slice(codec0);
        codec_channel[layout.codec_eos()] = c.codec_eos;

        let mut codec_ids = vec![0u32; len * NUM_CODE_GROUPS];
        for (pos, row) in layout.codec_frames().zip(codecs_full) {
            codec_ids[pos * NUM_CODE_GROUPS..(pos + 1) * NUM_CODE_GROUPS].copy_from_slice(row);
        }

        let mut codec_0_labels = vec![IGNORE_INDEX; len];
        for (label, &code) in codec_0_labels[layout.codec_frames()].iter_mut().zip(codec0) {
            *label = i64::from(code);
        }
        codec_0_labels[layout.codec_eos()] = i64::from(c.codec_eos);

        let frames = layout.codec_frames();
        let packed = PackedSequence {
            layout,
            text_channel,
            codec_channel,
            codec_ids,
            text_embedding_mask: vec![true; len],
            codec_embedding_mask: (0..len).map(|p| layout.codec_embedded(p)).collect(),
            codec_mask: (0..len).map(|p| frames.contains(&p)).collect(),
            attention_mask: vec![true; len],
            codec_0_labels,
        };

        tracing::debug!(
            text_len = layout.text_len(),
            codec_len = layout.codec_len(),
            total_len = len,
            "Packed training example"
        );
        Ok(packed)
    }

    /// Pack from the full `[frames][16]` matrix, taking codebook 0 from column 0.
    pub fn pack_frames(
        &self,
        text_ids: &[u32],
        codes: &[Vec<u32>],
    ) -> Result<PackedSequence, PackError> {
        let codec0 = codes
            .iter()
            .enumerate()
            .map(|(frame, row)| {
                row.first().copied().ok_or(PackError::CodeGroupMismatch {
                    frame,
                    groups: 0,
                    expected: NUM_CODE_GROUPS,
                })
            })
            .collect::<Result<Vec<u32>, _>>()?;
        self.pack(text_ids, &codec0, codes)
    }
}

fn validate_codes(codec0: &[u32], codecs_full: &[Vec<u32>]) -> Result<(), PackError> {
    if codecs_full.len() != codec0.len() {
        return Err(PackError::CodeRowMismatch {
            codec0: codec0.len(),
            rows: codecs_full.len(),
        });
    }
    for (frame, (row, &primary)) in codecs_full.iter().zip(codec0).enumerate() {
        if row.len() != NUM_CODE_GROUPS {
            return Err(PackError::CodeGroupMismatch {
                frame,
                groups: row.len(),
                expected: NUM_CODE_GROUPS,
            });
        }
        if row[0] != primary {
            return Err(PackError::PrimaryCodeMismatch {
                frame,
                expected: primary,
                found: row[0],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlTokens {
        ControlTokens {
            text_pad: 1,
            text_bos: 2,
            text_eos: 3,
            codec_pad: 11,
            codec_bos: 12,
            codec_eos: 13,
            codec_nothink: 14,
            codec_think_bos: 15,
            codec_think_eos: 16,
        }
    }

    /// Frames whose codebook g holds `codec0[t] * 100 + g`
    fn frames(codec0: &[u32]) -> Vec<Vec<u32>> {
        codec0
            .iter()
            .map(|&c| {
                (0..NUM_CODE_GROUPS as u32)
                    .map(|g| if g == 0 { c } else { c * 100 + g })
                    .collect()
            })
            .collect()
    }

    fn example() -> PackedSequence {
        let text = [100, 101, 102, 200, 201, 202, 203, 204, 205, 206];
        let codec0 = [50, 51, 52];
        pack(&text, &codec0, &frames(&codec0), &control()).unwrap()
    }

    #[test]
    fn test_text_channel_layout() {
        let packed = example();
        assert_eq!(packed.len(), 21);
        assert_eq!(
            packed.text_channel(),
            &[
                100, 101, 102, 1, 1, 1, 1, 2, 200, 201, 202, 203, 204, 205, 206, 3, 1, 1, 1, 1, 1
            ]
        );
    }

    #[test]
    fn test_codec_channel_layout() {
        let packed = example();
        assert_eq!(
            packed.codec_channel(),
            &[0, 0, 0, 14, 15, 16, 0, 11, 11, 11, 11, 11, 11, 11, 11, 11, 12, 50, 51, 52, 13]
        );
    }

    #[test]
    fn test_input_ids_interleaved() {
        let packed = example();
        let ids = packed.input_ids();
        assert_eq!(ids.len(), 42);
        assert_eq!(&ids[..4], &[100, 0, 101, 0]);
        assert_eq!(&ids[40..], &[1, 13]);
    }

    #[test]
    fn test_masks() {
        let packed = example();
        assert!(packed.text_embedding_mask().iter().all(|&m| m));
        assert!(packed.attention_mask().iter().all(|&m| m));

        let codec_embed: Vec<usize> = (0..21).filter(|&p| packed.codec_embedding_mask()[p]).collect();
        let expected: Vec<usize> = (3..21).filter(|&p| p != 6).collect();
        assert_eq!(codec_embed, expected);

        let frame_positions: Vec<usize> = (0..21).filter(|&p| packed.codec_mask()[p]).collect();
        assert_eq!(frame_positions, vec![17, 18, 19]);
    }

    #[test]
    fn test_labels() {
        let packed = example();
        let labels = packed.codec_0_labels();
        assert!(labels[..17].iter().all(|&l| l == IGNORE_INDEX));
        assert_eq!(&labels[17..], &[50, 51, 52, 13]);
    }

    #[test]
    fn test_codec_id_matrix() {
        let packed = example();
        assert_eq!(packed.codec_ids().len(), 21 * NUM_CODE_GROUPS);
        for pos in (0..17).chain(20..21) {
            assert!(packed.codec_id_row(pos).iter().all(|&v| v == 0), "pos {pos}");
        }
        assert_eq!(packed.codec_id_row(17)[0], 50);
        assert_eq!(packed.codec_id_row(18)[3], 5103);
        assert_eq!(packed.codec_id_row(19)[15], 5215);
    }

    #[test]
    fn test_minimal_example() {
        let codec0 = [7];
        let packed = pack(&[1, 2, 3, 4], &codec0, &frames(&codec0), &control()).unwrap();
        assert_eq!(packed.len(), 13);
        assert_eq!(packed.text_channel()[8], 4);
        assert_eq!(packed.text_channel()[9], 3);
        assert_eq!(packed.codec_channel()[10], 12);
        assert_eq!(packed.codec_channel()[11], 7);
        assert_eq!(packed.codec_channel()[12], 13);
    }

    #[test]
    fn test_properties_hold_for_many_shapes() {
        let c = control();
        for lt in 4..16usize {
            for ca in 1..16usize {
                let text: Vec<u32> = (0..lt as u32).map(|i| 1000 + i).collect();
                let codec0: Vec<u32> = (0..ca as u32).map(|i| 500 + i).collect();
                let packed = pack(&text, &codec0, &frames(&codec0), &c).unwrap();

                assert_eq!(packed.len(), 8 + lt + ca);
                assert_eq!(packed.codec_mask().iter().filter(|&&m| m).count(), ca);
                assert!(!packed.codec_embedding_mask()[6]);
                assert!(packed.codec_embedding_mask()[5]);

                let labelled: Vec<i64> = packed
                    .codec_0_labels()
                    .iter()
                    .copied()
                    .filter(|&l| l != IGNORE_INDEX)
                    .collect();
                let mut expected: Vec<i64> = codec0.iter().map(|&v| i64::from(v)).collect();
                expected.push(i64::from(c.codec_eos));
                assert_eq!(labelled, expected);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        assert_eq!(example(), example());
    }

    #[test]
    fn test_text_too_short() {
        let err = pack(&[1, 2, 3], &[5], &frames(&[5]), &control()).unwrap_err();
        assert_eq!(err, PackError::TextTooShort { len: 3, min: 4 });
    }

    #[test]
    fn test_empty_codes() {
        let err = pack(&[1, 2, 3, 4], &[], &[], &control()).unwrap_err();
        assert_eq!(err, PackError::EmptyCodes);
    }

    #[test]
    fn test_row_count_mismatch() {
        let err = pack(&[1, 2, 3, 4], &[5, 6], &frames(&[5]), &control()).unwrap_err();
        assert_eq!(err, PackError::CodeRowMismatch { codec0: 2, rows: 1 });
    }

    #[test]
    fn test_row_width_mismatch() {
        let mut codes = frames(&[5, 6]);
        codes[1].pop();
        let err = pack(&[1, 2, 3, 4], &[5, 6], &codes, &control()).unwrap_err();
        assert_eq!(
            err,
            PackError::CodeGroupMismatch {
                frame: 1,
                groups: 15,
                expected: 16
            }
        );
    }

    #[test]
    fn test_primary_column_mismatch() {
        let err = pack(&[1, 2, 3, 4], &[5, 6], &frames(&[5, 7]), &control()).unwrap_err();
        assert_eq!(
            err,
            PackError::PrimaryCodeMismatch {
                frame: 1,
                expected: 6,
                found: 7
            }
        );
    }

    #[test]
    fn test_pack_frames_uses_column_zero() {
        let packer = SequencePacker::new(control());
        let codes = frames(&[50, 51, 52]);
        let text = [100, 101, 102, 200, 201, 202, 203, 204, 205, 206];
        assert_eq!(packer.pack_frames(&text, &codes).unwrap(), example());

        let err = packer.pack_frames(&text, &[vec![]]).unwrap_err();
        assert!(matches!(err, PackError::CodeGroupMismatch { groups: 0, .. }));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PackedSequence>();
        assert_send_sync::<SequencePacker>();
    }
}

//! Position arithmetic of a packed training sequence.
//!
//! All channels, masks and labels of a [`PackedSequence`](super::PackedSequence)
//! are derived from one [`SequenceLayout`], so the offsets are computed in a
//! single place.
//!
//! ```text
//! pos    0..3      3..7      7     8..8+Lt-3    8+Lt-3   8+Lt-2     8+Lt-1 .. T-1   T-1
//! text   chat[0..3] pad       bos   content      eos      pad ...............................
//! codec  0          nothink think_bos think_eos SPK pad ... pad   bos   codec0[..]   eos
//! ```

use std::ops::Range;

use crate::error::PackError;
use crate::tokenizer::CHAT_PREFIX_TOKENS;

/// Fixed slots before the text content: 3 chat tokens, 4 pads, 1 bos.
pub const PREFIX_LEN: usize = 8;

/// Position reserved for the continuous speaker embedding
pub const SPEAKER_EMBED_POS: usize = 6;

/// First position of the codec channel that is embedded at all
pub const CODEC_EMBED_START: usize = 3;

/// Smallest accepted tokenized text: chat prefix plus one content token
pub const MIN_TEXT_TOKENS: usize = CHAT_PREFIX_TOKENS + 1;

/// Offsets for one example with `text_len` text tokens and `codec_len` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLayout {
    text_len: usize,
    codec_len: usize,
}

impl SequenceLayout {
    pub fn new(text_len: usize, codec_len: usize) -> Result<Self, PackError> {
        if text_len < MIN_TEXT_TOKENS {
            return Err(PackError::TextTooShort {
                len: text_len,
                min: MIN_TEXT_TOKENS,
            });
        }
        if codec_len == 0 {
            return Err(PackError::EmptyCodes);
        }
        Ok(Self {
            text_len,
            codec_len,
        })
    }

    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn codec_len(&self) -> usize {
        self.codec_len
    }

    /// `T = 8 + Lt + Ca`
    pub fn total_len(&self) -> usize {
        PREFIX_LEN + self.text_len + self.codec_len
    }

    pub fn chat_prefix(&self) -> Range<usize> {
        0..CHAT_PREFIX_TOKENS
    }

    /// Text pads between the chat prefix and text bos
    pub fn text_pad_head(&self) -> Range<usize> {
        CHAT_PREFIX_TOKENS..PREFIX_LEN - 1
    }

    pub fn text_bos(&self) -> usize {
        PREFIX_LEN - 1
    }

    /// Utterance tokens, i.e. `text_ids[3..]`
    pub fn text_content(&self) -> Range<usize> {
        PREFIX_LEN..self.text_eos()
    }

    pub fn text_eos(&self) -> usize {
        PREFIX_LEN + self.text_len - CHAT_PREFIX_TOKENS
    }

    /// Text pads from after text eos to the end of the sequence
    pub fn text_pad_tail(&self) -> Range<usize> {
        self.text_eos() + 1..self.total_len()
    }

    /// Codec pads from position 7 through the text eos position
    pub fn codec_pad_run(&self) -> Range<usize> {
        PREFIX_LEN - 1..self.codec_bos()
    }

    pub fn codec_bos(&self) -> usize {
        self.text_eos() + 1
    }

    /// Positions holding codebook-0 content
    pub fn codec_frames(&self) -> Range<usize> {
        let start = self.codec_bos() + 1;
        start..start + self.codec_len
    }

    /// Always the last position, `T - 1`
    pub fn codec_eos(&self) -> usize {
        self.codec_frames().end
    }

    /// Whether the codec channel at `pos` goes through token embedding
    pub fn codec_embedded(&self, pos: usize) -> bool {
        pos >= CODEC_EMBED_START && pos < self.total_len() && pos != SPEAKER_EMBED_POS
    }
}

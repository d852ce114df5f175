//! Control-token table and packing configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PackError;

/// TTS special token IDs in the text vocabulary (12Hz release)
pub mod tts_tokens {
    pub const TTS_PAD: u32 = 151671;
    pub const TTS_BOS: u32 = 151672;
    pub const TTS_EOS: u32 = 151673;
}

/// Codec special token IDs in the codec vocabulary (12Hz release)
pub mod codec_tokens {
    pub const CODEC_PAD: u32 = 2148;
    pub const CODEC_BOS: u32 = 2149;
    pub const CODEC_EOS: u32 = 2150;
    pub const CODEC_NOTHINK: u32 = 2155;
    pub const CODEC_THINK_BOS: u32 = 2156;
    pub const CODEC_THINK_EOS: u32 = 2157;
}

/// Control token IDs consumed by the sequence packer.
///
/// Built once per model configuration and passed explicitly to the packer.
/// Text-side IDs live in the text vocabulary; codec-side IDs live in the
/// codec vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTokens {
    pub text_pad: u32,
    pub text_bos: u32,
    pub text_eos: u32,
    pub codec_pad: u32,
    pub codec_bos: u32,
    pub codec_eos: u32,
    pub codec_nothink: u32,
    pub codec_think_bos: u32,
    pub codec_think_eos: u32,
}

impl ControlTokens {
    /// Token table of the released Qwen3-TTS 12Hz checkpoints.
    pub fn qwen3_tts_12hz() -> Self {
        Self {
            text_pad: tts_tokens::TTS_PAD,
            text_bos: tts_tokens::TTS_BOS,
            text_eos: tts_tokens::TTS_EOS,
            codec_pad: codec_tokens::CODEC_PAD,
            codec_bos: codec_tokens::CODEC_BOS,
            codec_eos: codec_tokens::CODEC_EOS,
            codec_nothink: codec_tokens::CODEC_NOTHINK,
            codec_think_bos: codec_tokens::CODEC_THINK_BOS,
            codec_think_eos: codec_tokens::CODEC_THINK_EOS,
        }
    }

    /// Extract the table from a parsed HuggingFace `config.json`.
    ///
    /// Text IDs are read from the top level (`tts_pad_token_id`, ...), codec
    /// IDs from `talker_config`. Every field is required.
    pub fn from_model_config(v: &serde_json::Value) -> Result<Self, PackError> {
        let t = &v["talker_config"];

        Ok(Self {
            text_pad: required_id(v, "tts_pad_token_id")?,
            text_bos: required_id(v, "tts_bos_token_id")?,
            text_eos: required_id(v, "tts_eos_token_id")?,
            codec_pad: required_id(t, "codec_pad_id")?,
            codec_bos: required_id(t, "codec_bos_id")?,
            codec_eos: required_id(t, "codec_eos_token_id")?,
            codec_nothink: required_id(t, "codec_nothink_id")?,
            codec_think_bos: required_id(t, "codec_think_bos_id")?,
            codec_think_eos: required_id(t, "codec_think_eos_id")?,
        })
    }

    /// Load the table from a model `config.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let v: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        let tokens = Self::from_model_config(&v)
            .with_context(|| format!("Incomplete control tokens in {}", path.display()))?;
        tracing::info!(
            text_pad = tokens.text_pad,
            codec_bos = tokens.codec_bos,
            codec_eos = tokens.codec_eos,
            "Loaded control tokens from {}",
            path.display()
        );
        Ok(tokens)
    }

    /// Load from a model directory or HuggingFace model ID
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let config_path = Path::new(model_id).join("config.json");
        if config_path.exists() {
            return Self::from_file(&config_path);
        }

        #[cfg(feature = "hub")]
        {
            let config_file = crate::hub::download_config(model_id)?;
            Self::from_file(&config_file)
        }

        #[cfg(not(feature = "hub"))]
        anyhow::bail!(
            "No config.json in '{}' and the `hub` feature is disabled",
            model_id
        )
    }
}

fn required_id(v: &serde_json::Value, key: &str) -> Result<u32, PackError> {
    v[key]
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| PackError::MissingControlToken(key.to_string()))
}

/// Limits applied by the batch assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingConfig {
    /// Longest packed sequence accepted into a batch
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,

    /// Extra padded positions added after the longest sequence of a batch
    #[serde(default = "default_batch_margin")]
    pub batch_margin: usize,
}

// Talker max_position_embeddings
fn default_max_sequence_length() -> usize {
    32768
}

fn default_batch_margin() -> usize {
    8
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: default_max_sequence_length(),
            batch_margin: default_batch_margin(),
        }
    }
}

impl PackingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read packing config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse packing config from {}", path.display()))
    }

    pub fn with_max_sequence_length(mut self, max: usize) -> Self {
        self.max_sequence_length = max;
        self
    }
}

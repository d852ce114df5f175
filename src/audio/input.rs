//! Reference-audio inputs as they appear in training records.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine as _;
use std::path::{Path, PathBuf};

use super::io::{decode_wav, load_wav, AudioBuffer};

/// One reference-audio input, normalized to `(waveform, rate)` by [`AudioInput::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    /// Path to a WAV file
    Path(PathBuf),
    /// Base64-encoded WAV file, with or without a `data:` URI prefix
    Base64(String),
    /// Waveform already in memory; a rate is mandatory
    Waveform { samples: Vec<f32>, sample_rate: u32 },
}

impl AudioInput {
    /// Classify a string reference from a training record.
    ///
    /// `data:` URIs and strings that are not an existing file but decode as
    /// base64 are treated as inline audio; everything else is a path.
    pub fn from_reference(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            bail!(
                "Remote reference audio is not supported, download it first: {}",
                trimmed
            );
        }
        if trimmed.starts_with("data:") {
            return Ok(Self::Base64(trimmed.to_string()));
        }

        let path = Path::new(trimmed);
        if path.exists() || looks_like_path(trimmed) {
            return Ok(Self::Path(path.to_path_buf()));
        }
        Ok(Self::Base64(trimmed.to_string()))
    }

    /// Decode into a mono buffer at the input's native rate
    pub fn load(&self) -> Result<AudioBuffer> {
        match self {
            Self::Path(path) => load_wav(path),
            Self::Base64(data) => {
                let payload = match data.split_once("base64,") {
                    Some((_, payload)) if data.starts_with("data:") => payload,
                    _ => data.as_str(),
                };
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .map_err(|e| anyhow!("Reference audio is neither a file nor base64: {}", e))?;
                decode_wav(&bytes).context("Failed to decode base64 reference audio")
            }
            Self::Waveform {
                samples,
                sample_rate,
            } => {
                if *sample_rate == 0 {
                    bail!("Waveform input needs a sample rate");
                }
                Ok(AudioBuffer::new(samples.clone(), *sample_rate))
            }
        }
    }
}

impl From<AudioBuffer> for AudioInput {
    fn from(audio: AudioBuffer) -> Self {
        Self::Waveform {
            samples: audio.samples,
            sample_rate: audio.sample_rate,
        }
    }
}

fn looks_like_path(s: &str) -> bool {
    s.contains(std::path::MAIN_SEPARATOR) || s.to_ascii_lowercase().ends_with(".wav")
}

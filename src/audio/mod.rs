//! Reference-audio handling for training data
//!
//! This module provides:
//! - WAV decoding from files and in-memory bytes
//! - Normalization of reference-audio inputs (path, base64, waveform)
//! - Log-mel spectrogram extraction for the speaker encoder

mod input;
mod io;
mod mel;

pub use input::AudioInput;
pub use io::{decode_wav, load_wav, save_wav, AudioBuffer};
pub use mel::{MelConfig, MelSpectrogram, ReferenceMel, ReferenceMelExtractor};

/// The only sample rate accepted for reference mels
pub const SAMPLE_RATE: u32 = 24000;

/// Number of mel bands in a reference mel
pub const N_MELS: usize = 128;

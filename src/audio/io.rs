//! WAV decoding into mono float buffers.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read};
use std::path::Path;

/// Mono waveform plus its native sample rate.
///
/// Samples are 32-bit floats in \[-1.0, 1.0\]. No resampling ever happens
/// here; the mel extractor decides whether the rate is acceptable.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load a WAV file, averaging channels down to mono
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    read_mono(reader).with_context(|| format!("Failed to decode WAV file: {}", path.display()))
}

/// Decode an in-memory WAV file, averaging channels down to mono
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV header")?;
    read_mono(reader)
}

fn read_mono<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono = if channels > 1 {
        tracing::warn!(channels, "Down-mixing multichannel reference audio to mono");
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok(AudioBuffer::new(mono, spec.sample_rate))
}

/// Write mono samples as 16-bit PCM
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stereo_wav_bytes(frames: &[(i16, i16)], sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &(l, r) in frames {
                writer.write_sample(l).unwrap();
                writer.write_sample(r).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 48000], 24000);
        assert!((buffer.duration() - 2.0).abs() < 1e-6);
        assert_eq!(buffer.len(), 48000);
        assert!(!buffer.is_empty());
        assert!(AudioBuffer::new(vec![], 24000).is_empty());
    }

    #[test]
    fn test_save_and_load_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ref.wav");

        let samples = vec![0.1, 0.2, -0.3, 0.4, -0.5];
        save_wav(&path, &samples, 24000).unwrap();

        let loaded = load_wav(&path).unwrap();
        assert_eq!(loaded.sample_rate, 24000);
        assert_eq!(loaded.len(), 5);
        for (a, b) in samples.iter().zip(loaded.samples.iter()) {
            assert!((a - b).abs() < 1e-4, "sample mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn test_decode_stereo_downmix() {
        let bytes = stereo_wav_bytes(&[(16384, 0), (-16384, -16384)], 22050);
        let audio = decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.len(), 2);
        assert!((audio.samples[0] - 0.25).abs() < 1e-4);
        assert!((audio.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_wav(b"definitely not a wav").is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(load_wav("/nonexistent/path/to/file.wav").is_err());
    }
}

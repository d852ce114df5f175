//! Mel-spectrogram computation
//!
//! Follows librosa's Slaney filterbank and the speaker-encoder front end of
//! Qwen3-TTS: reflect padding of `(n_fft - hop) / 2`, magnitude spectrum,
//! `ln(max(x, 1e-5))` compression.

use num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;
use std::ops::Range;

use super::{AudioBuffer, N_MELS, SAMPLE_RATE};
use crate::error::PackError;

/// Configuration for mel spectrogram computation
#[derive(Debug, Clone)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Window length (defaults to n_fft)
    pub win_length: Option<usize>,
    pub n_mels: usize,
    pub fmin: f32,
    /// Upper filterbank edge (defaults to sample_rate / 2)
    pub fmax: Option<f32>,
}

impl Default for MelConfig {
    /// Reference-mel front end: 1024-point FFT, hop 256, 128 bands, 0-12 kHz.
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            n_fft: 1024,
            hop_length: 256,
            win_length: Some(1024),
            n_mels: N_MELS,
            fmin: 0.0,
            fmax: Some(12000.0),
        }
    }
}

/// Mel-spectrogram extractor with a precomputed filterbank and window
pub struct MelSpectrogram {
    config: MelConfig,
    mel_basis: Vec<Vec<f32>>,
    window: Vec<f32>,
}

impl MelSpectrogram {
    pub fn new(config: MelConfig) -> Self {
        let win_length = config.win_length.unwrap_or(config.n_fft);
        let fmax = config.fmax.unwrap_or(config.sample_rate as f32 / 2.0);

        let mel_basis = Self::create_mel_filterbank(
            config.sample_rate,
            config.n_fft,
            config.n_mels,
            config.fmin,
            fmax,
        );
        let window = Self::hann_window(win_length);

        Self {
            config,
            mel_basis,
            window,
        }
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    /// Log-magnitude mel spectrogram, `[n_frames][n_mels]`.
    pub fn compute_log_magnitude(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mag_spec: Vec<Vec<f32>> = self
            .stft(samples)
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|c| (c.re * c.re + c.im * c.im + 1e-9).sqrt())
                    .collect()
            })
            .collect();

        self.apply_mel_filterbank(&mag_spec)
            .into_iter()
            .map(|frame| frame.into_iter().map(|v| v.max(1e-5).ln()).collect())
            .collect()
    }

    fn stft(&self, samples: &[f32]) -> Vec<Vec<Complex<f32>>> {
        let n_fft = self.config.n_fft;
        let hop_length = self.config.hop_length;
        let win_length = self.window.len();
        if samples.is_empty() {
            return Vec::new();
        }

        // center=False STFT after manual reflect padding
        let pad_length = (n_fft - hop_length) / 2;
        let mut padded = Vec::with_capacity(samples.len() + 2 * pad_length);
        for i in (1..=pad_length).rev() {
            padded.push(samples[i.min(samples.len() - 1)]);
        }
        padded.extend_from_slice(samples);
        for i in 0..pad_length {
            let idx = samples.len().checked_sub(2 + i).unwrap_or(0);
            padded.push(samples[idx]);
        }

        if padded.len() < n_fft {
            return Vec::new();
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);

        // Center the window inside the FFT frame when it is shorter than n_fft
        let win_offset = (n_fft - win_length.min(n_fft)) / 2;
        let n_frames = (padded.len() - n_fft) / hop_length + 1;

        (0..n_frames)
            .map(|i| {
                let start = i * hop_length;
                let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                    .map(|j| {
                        let sample = match j.checked_sub(win_offset) {
                            Some(w) if w < win_length => padded[start + j] * self.window[w],
                            _ => 0.0,
                        };
                        Complex::new(sample, 0.0)
                    })
                    .collect();
                fft.process(&mut buffer);
                buffer.truncate(n_fft / 2 + 1);
                buffer
            })
            .collect()
    }

    fn apply_mel_filterbank(&self, spec: &[Vec<f32>]) -> Vec<Vec<f32>> {
        spec.iter()
            .map(|frame| {
                self.mel_basis
                    .iter()
                    .map(|filter| filter.iter().zip(frame.iter()).map(|(f, p)| f * p).sum())
                    .collect()
            })
            .collect()
    }

    /// Hz to mel, Slaney scale (librosa `htk=False`)
    fn hz_to_mel(f: f32) -> f32 {
        const F_SP: f32 = 200.0 / 3.0;
        const MIN_LOG_HZ: f32 = 1000.0;
        const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
        const LOGSTEP: f32 = 0.068_751_74; // ln(6.4) / 27

        if f < MIN_LOG_HZ {
            f / F_SP
        } else {
            MIN_LOG_MEL + (f / MIN_LOG_HZ).ln() / LOGSTEP
        }
    }

    fn mel_to_hz(m: f32) -> f32 {
        const F_SP: f32 = 200.0 / 3.0;
        const MIN_LOG_HZ: f32 = 1000.0;
        const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
        const LOGSTEP: f32 = 0.068_751_74;

        if m < MIN_LOG_MEL {
            m * F_SP
        } else {
            MIN_LOG_HZ * ((m - MIN_LOG_MEL) * LOGSTEP).exp()
        }
    }

    /// Triangular filterbank with Slaney area normalization
    /// (`librosa.filters.mel(..., norm="slaney")`).
    fn create_mel_filterbank(
        sample_rate: u32,
        n_fft: usize,
        n_mels: usize,
        fmin: f32,
        fmax: f32,
    ) -> Vec<Vec<f32>> {
        let n_freqs = n_fft / 2 + 1;

        let mel_min = Self::hz_to_mel(fmin);
        let mel_max = Self::hz_to_mel(fmax);
        let hz_points: Vec<f32> = (0..=n_mels + 1)
            .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
            .map(Self::mel_to_hz)
            .collect();

        let fft_freqs: Vec<f32> = (0..n_freqs)
            .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
            .collect();

        let mut filterbank = vec![vec![0.0f32; n_freqs]; n_mels];
        for (i, filter) in filterbank.iter_mut().enumerate() {
            let (lower, center, upper) = (hz_points[i], hz_points[i + 1], hz_points[i + 2]);

            for (j, &freq) in fft_freqs.iter().enumerate() {
                if freq >= lower && freq <= center && center > lower {
                    filter[j] = (freq - lower) / (center - lower);
                } else if freq > center && freq <= upper && upper > center {
                    filter[j] = (upper - freq) / (upper - center);
                }
            }

            if upper > lower {
                let enorm = 2.0 / (upper - lower);
                filter.iter_mut().for_each(|v| *v *= enorm);
            }
        }

        filterbank
    }

    fn hann_window(length: usize) -> Vec<f32> {
        (0..length)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / length as f32).cos()))
            .collect()
    }
}

/// Reference-voice spectrogram, row-major `[n_frames, 128]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceMel {
    data: Vec<f32>,
    n_frames: usize,
}

impl ReferenceMel {
    /// Build from per-frame rows; every row must have 128 bins.
    pub fn from_frames(frames: Vec<Vec<f32>>) -> Result<Self, PackError> {
        let n_frames = frames.len();
        let mut data = Vec::with_capacity(n_frames * N_MELS);
        for (frame, row) in frames.into_iter().enumerate() {
            if row.len() != N_MELS {
                return Err(PackError::MelBinMismatch {
                    frame,
                    bins: row.len(),
                    expected: N_MELS,
                });
            }
            data.extend(row);
        }
        Ok(Self { data, n_frames })
    }

    /// Concatenate along the frame axis, returning each input's frame range.
    pub fn concat(mels: &[ReferenceMel]) -> (Self, Vec<Range<usize>>) {
        let total: usize = mels.iter().map(|m| m.n_frames).sum();
        let mut data = Vec::with_capacity(total * N_MELS);
        let mut ranges = Vec::with_capacity(mels.len());
        let mut offset = 0;
        for mel in mels {
            data.extend_from_slice(&mel.data);
            ranges.push(offset..offset + mel.n_frames);
            offset += mel.n_frames;
        }
        (
            Self {
                data,
                n_frames: total,
            },
            ranges,
        )
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn n_mels(&self) -> usize {
        N_MELS
    }

    /// Flat row-major values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        self.data.chunks_exact(N_MELS).nth(index)
    }

    /// Flat values of the frames in `range`, or `None` if it is out of bounds
    pub fn frames(&self, range: Range<usize>) -> Option<&[f32]> {
        if range.start > range.end || range.end > self.n_frames {
            return None;
        }
        Some(&self.data[range.start * N_MELS..range.end * N_MELS])
    }
}

/// The ReferenceMelSource: 24 kHz audio in, `[frames, 128]` log-mel out.
pub struct ReferenceMelExtractor {
    mel: MelSpectrogram,
}

impl Default for ReferenceMelExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceMelExtractor {
    pub fn new() -> Self {
        Self {
            mel: MelSpectrogram::new(MelConfig::default()),
        }
    }

    /// Shortest clip the reflect padding accepts: one sample more than the pad.
    pub fn min_samples(&self) -> usize {
        let config = self.mel.config();
        (config.n_fft - config.hop_length) / 2 + 1
    }

    /// Extract the reference mel; any rate other than 24 kHz is rejected,
    /// never resampled. The result always has at least one frame.
    pub fn extract(&self, audio: &AudioBuffer) -> Result<ReferenceMel, PackError> {
        if audio.sample_rate != SAMPLE_RATE {
            return Err(PackError::UnsupportedSampleRate {
                found: audio.sample_rate,
                expected: SAMPLE_RATE,
            });
        }
        let min = self.min_samples();
        if audio.len() < min {
            return Err(PackError::ReferenceTooShort {
                samples: audio.len(),
                min,
            });
        }
        ReferenceMel::from_frames(self.mel.compute_log_magnitude(&audio.samples))
    }
}

//! Whole-utterance encoding for buffered output

use bytes::Bytes;
use hound::{WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

use super::mulaw;
use crate::error::Result;

/// Supported clip formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// WAV container, 16-bit PCM
    Wav,
    /// Headerless mu-law bytes
    Mulaw,
    /// Headerless little-endian PCM16
    RawI16,
}

impl AudioFormat {
    /// Name used in the wire envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mulaw => "mulaw",
            AudioFormat::RawI16 => "pcm_s16le",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mulaw => "audio/basic",
            AudioFormat::RawI16 => "application/octet-stream",
        }
    }
}

/// Encoder for mono 16-bit samples
pub struct AudioEncoder {
    sample_rate: u32,
}

impl AudioEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Encode samples to the specified format
    pub fn encode(&self, samples: &[i16], format: AudioFormat) -> Result<AudioClip> {
        let data = match format {
            AudioFormat::Wav => self.encode_wav(samples)?,
            AudioFormat::Mulaw => samples.iter().map(|&s| mulaw::encode(s)).collect(),
            AudioFormat::RawI16 => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        };
        Ok(AudioClip::new(
            data.into(),
            format,
            samples.len(),
            self.sample_rate,
        ))
    }

    fn encode_wav(&self, samples: &[i16]) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buffer, spec)?;
            for &sample in samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        debug!(
            "Encoded {} samples to WAV ({} bytes)",
            samples.len(),
            buffer.get_ref().len()
        );
        Ok(buffer.into_inner())
    }
}

/// A complete utterance produced in whole-buffer mode
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub data: Bytes,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub duration_ms: f32,
}

impl AudioClip {
    pub fn new(data: Bytes, format: AudioFormat, sample_count: usize, sample_rate: u32) -> Self {
        let duration_ms = (sample_count as f32 / sample_rate as f32) * 1000.0;
        Self {
            data,
            format,
            sample_rate,
            sample_count,
            duration_ms,
        }
    }
}

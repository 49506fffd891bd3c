//! In-process tone engine
//!
//! Renders one short sine tone per character (silence for whitespace).
//! It needs no model and is fully deterministic, which makes it the engine
//! of choice for local runs and tests.

use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tracing::debug;

use super::{ChunkStream, RawChunk, SpeechEngine, SynthesisRequest};
use crate::error::Result;
use crate::ORIGIN_SAMPLE_RATE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneSettings {
    /// Samples per emitted chunk
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// Tone length per character
    #[serde(default = "default_ms_per_char")]
    pub ms_per_char: u32,

    /// Peak amplitude in [0, 1]
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            chunk_samples: default_chunk_samples(),
            ms_per_char: default_ms_per_char(),
            amplitude: default_amplitude(),
        }
    }
}

fn default_chunk_samples() -> usize {
    1200
}

fn default_ms_per_char() -> u32 {
    60
}

fn default_amplitude() -> f32 {
    0.3
}

pub struct ToneEngine {
    settings: ToneSettings,
}

impl ToneEngine {
    pub fn new(settings: ToneSettings) -> Self {
        Self { settings }
    }

    fn samples_per_char(&self) -> usize {
        (ORIGIN_SAMPLE_RATE as usize * self.settings.ms_per_char as usize) / 1000
    }
}

impl Default for ToneEngine {
    fn default() -> Self {
        Self::new(ToneSettings::default())
    }
}

impl SpeechEngine for ToneEngine {
    fn name(&self) -> &str {
        "tone"
    }

    fn sample_rate(&self) -> u32 {
        ORIGIN_SAMPLE_RATE
    }

    fn synthesize(&self, request: SynthesisRequest) -> ChunkStream {
        let chunk_samples = self.settings.chunk_samples.max(1);
        let per_char = self.samples_per_char();
        let amplitude = self.settings.amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

        debug!(
            "Tone synthesis: {} chars, voice {}",
            request.text.chars().count(),
            request.voice
        );

        Box::pin(render(request.text, chunk_samples, per_char, amplitude))
    }
}

fn render(
    text: String,
    chunk_samples: usize,
    per_char: usize,
    amplitude: f32,
) -> impl Stream<Item = Result<RawChunk>> {
    stream! {
        let mut chunk: RawChunk = Vec::with_capacity(chunk_samples);
        let mut index = 0usize;

        for c in text.chars() {
            let freq = 220.0 + (c as u32 % 100) as f32 * 5.0;
            for _ in 0..per_char {
                let sample = if c.is_whitespace() {
                    0.0
                } else {
                    let time = index as f32 / ORIGIN_SAMPLE_RATE as f32;
                    (2.0 * PI * freq * time).sin() * amplitude
                };
                chunk.push(sample as i16);
                index += 1;

                if chunk.len() == chunk_samples {
                    yield Ok(std::mem::replace(
                        &mut chunk,
                        Vec::with_capacity(chunk_samples),
                    ));
                }
            }
        }

        if !chunk.is_empty() {
            yield Ok(chunk);
        }
    }
}

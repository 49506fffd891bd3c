//! Integer-ratio decimation with an anti-aliasing FIR stage
//!
//! The converter itself is immutable; everything that must survive a chunk
//! boundary (the filter delay line and the decimation phase) lives in
//! [`ConversionState`], which the caller threads from one call to the next.
//! Outputs are taken at global input positions `0, R, 2R, ...`, so the
//! output is identical however the input was split into chunks.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::error::{Error, Result};
use crate::{ORIGIN_SAMPLE_RATE, TARGET_SAMPLE_RATE};

/// Fixed-point precision of the filter coefficients.
const COEFF_SHIFT: u32 = 15;
const COEFF_ONE: i32 = 1 << COEFF_SHIFT;

/// Passband edge as a fraction of the target Nyquist frequency.
const CUTOFF_SCALE: f64 = 0.9;

/// Configuration for the rate converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Input sample rate (default: 24000 Hz)
    pub origin_rate: u32,
    /// Output sample rate (default: 8000 Hz)
    pub target_rate: u32,
    /// Low-pass filter length (default: 48)
    pub taps: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            origin_rate: ORIGIN_SAMPLE_RATE,
            target_rate: TARGET_SAMPLE_RATE,
            taps: 48,
        }
    }
}

impl ResampleConfig {
    /// Decimation factor, 0 when `target_rate` is 0
    pub fn ratio(&self) -> usize {
        self.origin_rate.checked_div(self.target_rate).unwrap_or(0) as usize
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.origin_rate == 0 || self.target_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }
        if self.origin_rate % self.target_rate != 0 {
            return Err(Error::Config(format!(
                "origin rate {} is not an integer multiple of target rate {}",
                self.origin_rate, self.target_rate
            )));
        }
        if self.taps < 2 * self.ratio() {
            return Err(Error::Config(format!(
                "filter needs at least {} taps for ratio {}, got {}",
                2 * self.ratio(),
                self.ratio(),
                self.taps
            )));
        }
        Ok(())
    }
}

/// Carry-over between [`RateConverter::convert`] calls.
///
/// Opaque to callers. It is stamped with the ratio and filter length of the
/// converter that created it so a state cannot be fed to a different one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionState {
    ratio: usize,
    taps: usize,
    /// Last `taps - 1` input samples, oldest first.
    history: Vec<i16>,
    /// Input samples still to skip before the next output position.
    phase: usize,
}

impl ConversionState {
    /// Input samples to skip before the next output sample.
    pub fn phase(&self) -> usize {
        self.phase
    }
}

/// Downsampler from the origin rate to the target rate
#[derive(Debug, Clone)]
pub struct RateConverter {
    config: ResampleConfig,
    coeffs: Vec<i32>,
}

impl RateConverter {
    /// Create a converter, designing its low-pass filter
    pub fn new(config: ResampleConfig) -> Result<Self> {
        config.validate()?;
        let coeffs = design_lowpass(config.taps, config.ratio());
        debug!(
            "Rate converter {} Hz -> {} Hz, {} taps",
            config.origin_rate, config.target_rate, config.taps
        );
        Ok(Self { config, coeffs })
    }

    /// 24 kHz -> 8 kHz converter
    pub fn telephony() -> Result<Self> {
        Self::new(ResampleConfig::default())
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    pub fn ratio(&self) -> usize {
        self.config.ratio()
    }

    /// Fresh state for the start of a stream: silent delay line, phase 0.
    pub fn initial_state(&self) -> ConversionState {
        ConversionState {
            ratio: self.ratio(),
            taps: self.config.taps,
            history: vec![0; self.config.taps - 1],
            phase: 0,
        }
    }

    /// Downsample one chunk, consuming and returning the carried state.
    pub fn convert(
        &self,
        chunk: &[i16],
        state: ConversionState,
    ) -> Result<(Vec<i16>, ConversionState)> {
        self.check_state(&state)?;

        let ratio = self.ratio();
        let keep = self.config.taps - 1;
        let ConversionState {
            mut history,
            phase,
            ..
        } = state;

        // history becomes the working window: delay line followed by the chunk
        history.extend_from_slice(chunk);

        let mut output = Vec::with_capacity(chunk.len() / ratio + 1);
        let mut pos = keep + phase;
        while pos < history.len() {
            output.push(self.filter_at(&history, pos));
            pos += ratio;
        }

        let next_phase = pos - history.len();
        let consumed = history.len() - keep;
        history.drain(..consumed);

        Ok((
            output,
            ConversionState {
                ratio,
                taps: self.config.taps,
                history,
                phase: next_phase,
            },
        ))
    }

    fn check_state(&self, state: &ConversionState) -> Result<()> {
        if state.ratio != self.ratio() || state.taps != self.config.taps {
            return Err(Error::InvalidState(format!(
                "conversion state for ratio {} / {} taps given to converter with ratio {} / {} taps",
                state.ratio,
                state.taps,
                self.ratio(),
                self.config.taps
            )));
        }
        if state.history.len() != self.config.taps - 1 || state.phase >= state.ratio {
            return Err(Error::InvalidState(format!(
                "malformed conversion state (delay line {}, phase {})",
                state.history.len(),
                state.phase
            )));
        }
        Ok(())
    }

    /// Filter output centred on `window[pos]`, looking back `taps - 1` samples.
    fn filter_at(&self, window: &[i16], pos: usize) -> i16 {
        let acc: i64 = self
            .coeffs
            .iter()
            .enumerate()
            .map(|(k, &c)| c as i64 * window[pos - k] as i64)
            .sum();
        let rounded = (acc + (1 << (COEFF_SHIFT - 1))) >> COEFF_SHIFT;
        rounded.clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }
}

/// Blackman-windowed sinc low-pass, quantized to Q15 with unity DC gain.
fn design_lowpass(taps: usize, ratio: usize) -> Vec<i32> {
    let cutoff = CUTOFF_SCALE * 0.5 / ratio as f64;
    let span = (taps - 1) as f64;

    let ideal: Vec<f64> = (0..taps)
        .map(|n| {
            let x = n as f64 - span / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let phase = 2.0 * PI * n as f64 / span;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            sinc * window
        })
        .collect();

    let gain: f64 = ideal.iter().sum();
    let mut coeffs: Vec<i32> = ideal
        .iter()
        .map(|c| (c / gain * COEFF_ONE as f64).round() as i32)
        .collect();

    // Put the rounding residue on the centre tap so DC passes exactly.
    let residue = COEFF_ONE - coeffs.iter().sum::<i32>();
    coeffs[taps / 2] += residue;
    coeffs
}

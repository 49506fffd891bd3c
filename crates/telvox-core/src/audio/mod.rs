//! Audio processing stages for the telephony pipeline

mod encoder;
mod framer;
pub mod mulaw;
mod resample;

pub use encoder::{AudioClip, AudioEncoder, AudioFormat};
pub use framer::{Frame, FrameAssembler};
pub use resample::{ConversionState, RateConverter, ResampleConfig};

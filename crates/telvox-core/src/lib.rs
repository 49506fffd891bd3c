//! Telvox Core - streaming text-to-speech transcoding for telephony
//!
//! A synthesis engine produces 16-bit mono PCM at 24 kHz in chunks of
//! whatever size it likes. This crate turns that live sequence into 20 ms
//! mu-law frames at 8 kHz (160 bytes each), the unit voice-call transports
//! expect, and wraps the run in a small event protocol.
//!
//! # Architecture
//!
//! - [`audio::RateConverter`]: FIR decimator 24 kHz -> 8 kHz with carried state
//! - [`audio::mulaw`]: G.711 mu-law companding
//! - [`audio::FrameAssembler`]: fixed-size framing with silence padding
//! - [`pipeline::TranscodePipeline`]: the three composed over a chunk stream
//! - [`worker::Worker`]: engine handle plus pipeline profile, one per process
//!
//! # Example
//!
//! ```ignore
//! use telvox_core::{JobRequest, Worker, WorkerConfig};
//! use futures::StreamExt;
//!
//! let worker = Worker::start(&WorkerConfig::default()).await?;
//! let mut events = worker.handle(JobRequest::new("Hello there"));
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod worker;

pub use audio::{AudioClip, AudioFormat, Frame, FrameAssembler, RateConverter};
pub use config::{EngineSettings, ServerConfig, WorkerConfig};
pub use engine::{ChunkStream, RawChunk, SpeechEngine, SynthesisRequest};
pub use error::{Error, Result};
pub use job::{JobInput, JobRequest};
pub use pipeline::{EventStream, OutputEvent, OutputMode, PipelineProfile, TranscodePipeline};
pub use worker::Worker;

/// Sample rate the synthesis engine produces (Hz).
pub const ORIGIN_SAMPLE_RATE: u32 = 24_000;

/// Sample rate of telephony output (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 8_000;

/// Bytes in one 20 ms mu-law frame at the target rate.
pub const FRAME_SIZE: usize = 160;

//! Synthesis engine abstraction
//!
//! An engine turns text into a lazy stream of PCM16 mono chunks at
//! [`ORIGIN_SAMPLE_RATE`](crate::ORIGIN_SAMPLE_RATE). Chunk sizes are the
//! engine's choice; the pipeline makes no assumption about them.

mod daemon;
mod tone;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use daemon::{DaemonEngine, DaemonSettings};
pub use tone::{ToneEngine, ToneSettings};

use crate::config::EngineSettings;
use crate::error::Result;

/// Signed 16-bit mono samples at the origin rate, in emission order.
pub type RawChunk = Vec<i16>;

/// Lazy, finite sequence of chunks; ends on exhaustion or on the first error.
pub type ChunkStream = BoxStream<'static, Result<RawChunk>>;

/// What to say and with which voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
}

/// A text-to-speech backend
pub trait SpeechEngine: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Rate of the produced PCM
    fn sample_rate(&self) -> u32;

    /// Bring the backend up (load models, start helper processes).
    fn prepare(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Release whatever `prepare` acquired.
    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Start synthesizing. Nothing happens until the stream is polled.
    fn synthesize(&self, request: SynthesisRequest) -> ChunkStream;
}

/// Build the engine described by the settings
pub fn from_settings(settings: &EngineSettings) -> Arc<dyn SpeechEngine> {
    match settings {
        EngineSettings::Daemon(daemon) => Arc::new(DaemonEngine::new(daemon.clone())),
        EngineSettings::Tone(tone) => Arc::new(ToneEngine::new(tone.clone())),
    }
}

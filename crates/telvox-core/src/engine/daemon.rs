//! Bridge to a persistent synthesis daemon
//!
//! The model runs in a separate Python process (Orpheus) that listens on a
//! Unix socket. Every message in either direction is a 4-byte big-endian
//! length followed by a JSON document. A `generate` request is answered by
//! any number of `{"audio_base64": ...}` messages carrying little-endian
//! PCM16, then `{"status": "done"}` or `{"error": ...}`.

use async_stream::try_stream;
use base64::Engine as _;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ChunkStream, RawChunk, SpeechEngine, SynthesisRequest};
use crate::error::{Error, Result};
use crate::ORIGIN_SAMPLE_RATE;

/// Largest message accepted from the daemon
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Daemon connection and launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Script started by `prepare` when nothing answers on the socket
    #[serde(default)]
    pub script_path: Option<PathBuf>,

    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Per-message read timeout once generation has started
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            script_path: None,
            python_cmd: default_python_cmd(),
            model_name: default_model_name(),
            startup_timeout_secs: default_startup_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("telvox_orpheus_daemon.sock")
}

fn default_python_cmd() -> String {
    "python3".to_string()
}

fn default_model_name() -> String {
    "canopylabs/orpheus-tts-0.1-finetune-prod".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_read_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Serialize)]
struct DaemonRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

impl<'a> DaemonRequest<'a> {
    fn command(command: &'a str) -> Self {
        Self {
            command,
            text: None,
            voice: None,
            model: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DaemonMessage {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl DaemonMessage {
    fn into_result(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(Error::Engine(error)),
            None => Ok(self),
        }
    }
}

/// Engine backed by the synthesis daemon
pub struct DaemonEngine {
    settings: Arc<DaemonSettings>,
    process: Mutex<Option<Child>>,
}

impl DaemonEngine {
    pub fn new(settings: DaemonSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            process: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    async fn is_responding(&self) -> bool {
        if !self.settings.socket_path.exists() {
            return false;
        }
        match UnixStream::connect(&self.settings.socket_path).await {
            Ok(mut stream) => {
                let check = DaemonRequest::command("check");
                match exchange(&mut stream, &check).await {
                    Ok(reply) => reply.error.is_none(),
                    Err(e) => {
                        debug!("Daemon check failed: {}", e);
                        false
                    }
                }
            }
            Err(_) => false,
        }
    }

    async fn ensure_running(&self) -> Result<()> {
        if self.is_responding().await {
            debug!("Synthesis daemon already running");
            return Ok(());
        }

        let script = self.settings.script_path.clone().ok_or_else(|| {
            Error::Engine(format!(
                "no daemon listening on {:?} and no script_path configured",
                self.settings.socket_path
            ))
        })?;

        info!("Starting synthesis daemon {:?}", script);
        let child = Command::new(&self.settings.python_cmd)
            .arg(&script)
            .arg("--socket")
            .arg(&self.settings.socket_path)
            .arg("--model")
            .arg(&self.settings.model_name)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Engine(format!("failed to start synthesis daemon: {}", e)))?;
        *self.process.lock().await = Some(child);

        // Model loading dominates startup; poll until the socket answers.
        let attempts = self.settings.startup_timeout_secs * 10;
        for i in 0..attempts {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.is_responding().await {
                info!("Synthesis daemon ready");
                return Ok(());
            }
            if i % 50 == 0 {
                debug!("Waiting for synthesis daemon... ({}s)", i / 10);
            }
        }

        Err(Error::Engine(format!(
            "synthesis daemon did not answer within {} seconds",
            self.settings.startup_timeout_secs
        )))
    }
}

impl SpeechEngine for DaemonEngine {
    fn name(&self) -> &str {
        "orpheus-daemon"
    }

    fn sample_rate(&self) -> u32 {
        ORIGIN_SAMPLE_RATE
    }

    fn prepare(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.ensure_running())
    }

    /// Ask a running daemon to exit and reap the child we started, if any.
    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Ok(mut stream) = UnixStream::connect(&self.settings.socket_path).await {
                let request = DaemonRequest::command("shutdown");
                if let Err(e) = exchange(&mut stream, &request).await {
                    warn!("Daemon shutdown request failed: {}", e);
                }
            }

            if let Some(mut child) = self.process.lock().await.take() {
                let _ = child.kill().await;
            }
            Ok(())
        })
    }

    fn synthesize(&self, request: SynthesisRequest) -> ChunkStream {
        Box::pin(generate(self.settings.clone(), request))
    }
}

fn generate(
    settings: Arc<DaemonSettings>,
    request: SynthesisRequest,
) -> impl futures::Stream<Item = Result<RawChunk>> {
    try_stream! {
        let mut stream = UnixStream::connect(&settings.socket_path)
            .await
            .map_err(|e| Error::Engine(format!("failed to connect to synthesis daemon: {}", e)))?;

        let outgoing = DaemonRequest {
            command: "generate",
            text: Some(&request.text),
            voice: Some(&request.voice),
            model: Some(&settings.model_name),
        };
        write_message(&mut stream, &outgoing).await?;

        let timeout = Duration::from_secs(settings.read_timeout_secs);
        let mut carry: Option<u8> = None;
        let mut index = 0usize;

        loop {
            let message = tokio::time::timeout(timeout, read_message(&mut stream))
                .await
                .map_err(|_| Error::Engine("timed out waiting for synthesis daemon".to_string()))??;

            let message = message.into_result()?;

            if let Some(audio) = message.audio_base64 {
                let bytes = base64::engine::general_purpose::STANDARD.decode(audio)?;
                let chunk = pcm_from_le_bytes(&bytes, &mut carry);
                debug!("Chunk #{}: {} bytes raw, {} samples", index, bytes.len(), chunk.len());
                index += 1;
                if !chunk.is_empty() {
                    yield chunk;
                }
            }

            if message.status.as_deref() == Some("done") {
                if carry.is_some() {
                    warn!("Dropping dangling half sample at end of stream");
                }
                break;
            }
        }
    }
}

/// Decode little-endian PCM16, carrying an odd trailing byte to the next call.
fn pcm_from_le_bytes(bytes: &[u8], carry: &mut Option<u8>) -> RawChunk {
    let mut samples = Vec::with_capacity((bytes.len() + 1) / 2);
    let mut rest = bytes;

    if let Some(low) = carry.take() {
        match rest.split_first() {
            Some((&high, tail)) => {
                samples.push(i16::from_le_bytes([low, high]));
                rest = tail;
            }
            None => {
                *carry = Some(low);
                return samples;
            }
        }
    }

    let mut pairs = rest.chunks_exact(2);
    samples.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
    if let [odd] = pairs.remainder() {
        *carry = Some(*odd);
    }
    samples
}

async fn write_message<T: Serialize>(stream: &mut UnixStream, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    let length = (body.len() as u32).to_be_bytes();
    stream
        .write_all(&length)
        .await
        .map_err(|e| Error::Engine(format!("failed to write to synthesis daemon: {}", e)))?;
    stream
        .write_all(&body)
        .await
        .map_err(|e| Error::Engine(format!("failed to write to synthesis daemon: {}", e)))?;
    Ok(())
}

async fn read_message(stream: &mut UnixStream) -> Result<DaemonMessage> {
    let mut length_buf = [0u8; 4];
    stream.read_exact(&mut length_buf).await.map_err(|e| {
        Error::Engine(format!("synthesis daemon closed the stream: {}", e))
    })?;
    let length = u32::from_be_bytes(length_buf) as usize;
    if length > MAX_MESSAGE_BYTES {
        return Err(Error::Engine(format!(
            "daemon message of {} bytes exceeds limit",
            length
        )));
    }

    let mut body = vec![0u8; length];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::Engine(format!("truncated daemon message: {}", e)))?;

    serde_json::from_slice(&body)
        .map_err(|e| Error::Engine(format!("invalid daemon message: {}", e)))
}

async fn exchange<T: Serialize>(stream: &mut UnixStream, request: &T) -> Result<DaemonMessage> {
    write_message(stream, request).await?;
    read_message(stream).await
}

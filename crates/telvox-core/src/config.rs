//! Configuration types for the telvox worker

use serde::{Deserialize, Serialize};

use crate::engine::{DaemonSettings, ToneSettings};
use crate::pipeline::PipelineProfile;

/// Main worker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Synthesis backend
    #[serde(default)]
    pub engine: EngineSettings,

    /// Transcoding capabilities (resample, encode, output mode)
    #[serde(default)]
    pub pipeline: PipelineProfile,

    /// HTTP endpoint
    #[serde(default)]
    pub server: ServerConfig,
}

/// Which synthesis engine to drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSettings {
    /// Out-of-process Orpheus daemon over a Unix socket
    Daemon(DaemonSettings),
    /// Deterministic in-process tone generator
    Tone(ToneSettings),
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::Daemon(DaemonSettings::default())
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_enabled() -> bool {
    true
}

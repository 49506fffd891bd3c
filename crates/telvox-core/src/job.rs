//! Job payloads delivered by the serverless platform

use serde::{Deserialize, Serialize};

use crate::engine::SynthesisRequest;
use crate::error::{Error, Result};

/// Reason reported when a job carries nothing to say
pub const MISSING_TEXT: &str = "No text provided";

/// One unit of work: `{"id": "...", "input": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default = "new_job_id")]
    pub id: String,

    #[serde(default)]
    pub input: JobInput,
}

impl JobRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: new_job_id(),
            input: JobInput {
                text: Some(text.into()),
                voice: default_voice(),
            },
        }
    }
}

/// Job input; `text` is the only required field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(default, alias = "prompt")]
    pub text: Option<String>,

    #[serde(default = "default_voice", alias = "speaker")]
    pub voice: String,
}

impl Default for JobInput {
    fn default() -> Self {
        Self {
            text: None,
            voice: default_voice(),
        }
    }
}

impl JobInput {
    /// Turn the input into an engine request, rejecting missing or blank text.
    pub fn validate(&self) -> Result<SynthesisRequest> {
        match self.text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(SynthesisRequest {
                text: text.to_string(),
                voice: self.voice.clone(),
            }),
            _ => Err(Error::InvalidInput(MISSING_TEXT.to_string())),
        }
    }
}

fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_voice() -> String {
    "tara".to_string()
}

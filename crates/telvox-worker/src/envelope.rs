//! JSON envelopes sent to the job platform

use base64::Engine;
use serde::Serialize;
use telvox_core::OutputEvent;

const COMPLETED_MESSAGE: &str = "Text-to-speech conversion completed";

/// Wire form of one [`OutputEvent`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    Processing {
        audio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    },
    Completed {
        message: String,
    },
    Error {
        error: String,
    },
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Envelope::Processing { .. } => "processing",
            Envelope::Completed { .. } => "completed",
            Envelope::Error { .. } => "error",
        }
    }
}

impl From<OutputEvent> for Envelope {
    fn from(event: OutputEvent) -> Self {
        let b64 = &base64::engine::general_purpose::STANDARD;
        match event {
            OutputEvent::Processing(frame) => Envelope::Processing {
                audio: b64.encode(frame.as_bytes()),
                format: None,
                sample_rate: None,
            },
            OutputEvent::Clip(clip) => Envelope::Processing {
                audio: b64.encode(&clip.data),
                format: Some(clip.format.as_str()),
                sample_rate: Some(clip.sample_rate),
            },
            OutputEvent::Completed => Envelope::Completed {
                message: COMPLETED_MESSAGE.to_string(),
            },
            OutputEvent::Error(reason) => Envelope::Error { error: reason },
        }
    }
}

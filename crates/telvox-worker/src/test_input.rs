//! One-shot job given on the command line
//!
//! The job is parsed and validated before the engine is brought up, so a
//! malformed or empty job is answered without touching the model.

use std::io::Write;
use telvox_core::{JobRequest, OutputEvent, Worker, WorkerConfig};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::envelope::Envelope;

pub const INVALID_JSON: &str = "Error: Invalid JSON in test_input";

/// Run `input` as a job and write one line per envelope to `out`.
pub async fn run<W: Write>(config: &WorkerConfig, input: &str, out: &mut W) -> anyhow::Result<()> {
    let job: JobRequest = match serde_json::from_str(input) {
        Ok(job) => job,
        Err(e) => {
            debug!("Rejected test input: {}", e);
            writeln!(out, "{}", INVALID_JSON)?;
            return Ok(());
        }
    };

    if let Err(e) = job.input.validate() {
        debug!("Job {} rejected before engine start: {}", job.id, e);
        let envelope = Envelope::from(OutputEvent::Error(e.to_string()));
        writeln!(out, "{}", serde_json::to_string(&envelope)?)?;
        return Ok(());
    }

    let worker = Worker::start(config).await?;
    let mut events = worker.handle(job);
    while let Some(event) = events.next().await {
        let envelope = Envelope::from(event);
        debug!("Emit status: {}", envelope.status());
        writeln!(out, "{}", serde_json::to_string(&envelope)?)?;
    }
    worker.shutdown().await?;
    Ok(())
}

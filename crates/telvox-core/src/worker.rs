//! Per-process worker context
//!
//! Owns the engine handle and the pipeline profile. It is built once when
//! the process starts and shared by reference with every job; each job gets
//! its own pipeline run.

use futures::stream;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::engine::{self, SpeechEngine};
use crate::error::{Error, Result};
use crate::job::JobRequest;
use crate::pipeline::{EventStream, OutputEvent, PipelineProfile, TranscodePipeline};
use crate::ORIGIN_SAMPLE_RATE;

pub struct Worker {
    engine: Arc<dyn SpeechEngine>,
    pipeline: TranscodePipeline,
}

impl Worker {
    /// Build the configured engine and bring it up.
    pub async fn start(config: &WorkerConfig) -> Result<Self> {
        let worker = Self::with_engine(engine::from_settings(&config.engine), config.pipeline.clone())?;
        info!("Preparing {} engine", worker.engine.name());
        worker.engine.prepare().await?;
        Ok(worker)
    }

    /// Wrap an engine that is already usable.
    pub fn with_engine(engine: Arc<dyn SpeechEngine>, profile: PipelineProfile) -> Result<Self> {
        if engine.sample_rate() != ORIGIN_SAMPLE_RATE {
            return Err(Error::Config(format!(
                "engine {} produces {} Hz, pipeline expects {} Hz",
                engine.name(),
                engine.sample_rate(),
                ORIGIN_SAMPLE_RATE
            )));
        }
        Ok(Self {
            engine,
            pipeline: TranscodePipeline::new(profile)?,
        })
    }

    pub fn engine(&self) -> &dyn SpeechEngine {
        self.engine.as_ref()
    }

    pub fn profile(&self) -> &PipelineProfile {
        self.pipeline.profile()
    }

    /// Run one job. Invalid input yields a single `Error` event and the
    /// engine is never called.
    pub fn handle(&self, job: JobRequest) -> EventStream {
        let request = match job.input.validate() {
            Ok(request) => request,
            Err(e) => {
                warn!("Job {} rejected: {}", job.id, e);
                return Box::pin(stream::once(async move { OutputEvent::Error(e.to_string()) }));
            }
        };

        info!(
            "Job {}: {} chars, voice {}",
            job.id,
            request.text.chars().count(),
            request.voice
        );
        self.pipeline.run(self.engine.synthesize(request))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.engine.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ChunkStream, SynthesisRequest, ToneEngine};
    use crate::job::JobInput;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and replays a fixed script of chunks.
    struct ScriptedEngine {
        calls: AtomicUsize,
        rate: u32,
        fail_after: Option<usize>,
    }

    impl ScriptedEngine {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rate: ORIGIN_SAMPLE_RATE,
                fail_after,
            }
        }
    }

    impl SpeechEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn synthesize(&self, _request: SynthesisRequest) -> ChunkStream {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut items: Vec<Result<Vec<i16>>> = vec![Ok(vec![0; 480]), Ok(vec![0; 480])];
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(Error::Engine("model crashed".to_string())));
            }
            Box::pin(stream::iter(items))
        }
    }

    fn job(text: Option<&str>) -> JobRequest {
        JobRequest {
            id: "test".to_string(),
            input: JobInput {
                text: text.map(String::from),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_missing_text_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::new(None));
        let worker = Worker::with_engine(engine.clone(), PipelineProfile::telephony()).unwrap();

        let events: Vec<_> = worker.handle(job(None)).collect().await;
        assert_eq!(events, vec![OutputEvent::Error("No text provided".to_string())]);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_job_streams_frames_then_completes() {
        let worker =
            Worker::with_engine(Arc::new(ScriptedEngine::new(None)), PipelineProfile::telephony())
                .unwrap();

        let events: Vec<_> = worker.handle(job(Some("hello"))).collect().await;
        assert_eq!(events.len(), 3);
        assert!(events[..2]
            .iter()
            .all(|e| matches!(e, OutputEvent::Processing(f) if f.as_bytes().iter().all(|&b| b == 0xFF))));
        assert_eq!(events[2], OutputEvent::Completed);
    }

    #[tokio::test]
    async fn test_engine_failure_is_terminal() {
        let worker = Worker::with_engine(
            Arc::new(ScriptedEngine::new(Some(1))),
            PipelineProfile::telephony(),
        )
        .unwrap();

        let events: Vec<_> = worker.handle(job(Some("hello"))).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OutputEvent::Processing(_)));
        assert_eq!(events[1], OutputEvent::Error("Engine error: model crashed".to_string()));
    }

    #[test]
    fn test_rejects_engine_at_wrong_rate() {
        let mut engine = ScriptedEngine::new(None);
        engine.rate = 22_050;
        let result = Worker::with_engine(Arc::new(engine), PipelineProfile::telephony());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_profile_with_short_filter() {
        let profile = PipelineProfile {
            filter_taps: 4,
            ..PipelineProfile::telephony()
        };
        let result = Worker::with_engine(Arc::new(ToneEngine::default()), profile);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_start_with_tone_engine() {
        let config: WorkerConfig =
            serde_json::from_value(serde_json::json!({ "engine": { "kind": "tone" } })).unwrap();
        let worker = Worker::start(&config).await.unwrap();
        assert_eq!(worker.engine().name(), "tone");

        let events: Vec<_> = worker.handle(JobRequest::new("ok")).collect().await;
        assert_eq!(events.last(), Some(&OutputEvent::Completed));
        // 2 chars * 60 ms = 120 ms = 6 frames of 20 ms
        assert_eq!(events.len(), 7);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_independent() {
        let worker = Arc::new(
            Worker::with_engine(Arc::new(ToneEngine::default()), PipelineProfile::telephony())
                .unwrap(),
        );

        let a = tokio::spawn({
            let worker = worker.clone();
            async move { worker.handle(JobRequest::new("abc")).collect::<Vec<_>>().await }
        });
        let b = tokio::spawn({
            let worker = worker.clone();
            async move { worker.handle(JobRequest::new("abc")).collect::<Vec<_>>().await }
        });

        assert_eq!(a.await.unwrap(), b.await.unwrap());
    }
}

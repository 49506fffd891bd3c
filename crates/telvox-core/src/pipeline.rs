//! Streaming transcode pipeline
//!
//! Composes [`RateConverter`], mu-law encoding and [`FrameAssembler`] over a
//! live sequence of engine chunks. Each pulled chunk produces zero or more
//! events; nothing is buffered beyond one partial frame (or, in whole-buffer
//! mode, the utterance itself).
//!
//! Every run owns its converter state and frame buffer. Dropping the event
//! stream cancels the run and releases both; a partial frame still buffered
//! at that point is discarded.

use async_stream::stream;
use bytes::BytesMut;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{
    mulaw, AudioClip, AudioEncoder, AudioFormat, ConversionState, Frame, FrameAssembler,
    RateConverter, ResampleConfig,
};
use crate::engine::RawChunk;
use crate::error::{Error, Result};
use crate::{ORIGIN_SAMPLE_RATE, TARGET_SAMPLE_RATE};

/// Lazy, finite sequence of events ending in exactly one terminal event.
pub type EventStream = BoxStream<'static, OutputEvent>;

/// What a pipeline run reports to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// One full frame of encoded audio
    Processing(Frame),
    /// The whole utterance (whole-buffer mode only)
    Clip(AudioClip),
    /// The run finished normally
    Completed,
    /// The run stopped; carries a human-readable reason
    Error(String),
}

impl OutputEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputEvent::Completed | OutputEvent::Error(_))
    }
}

/// How encoded audio leaves the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Fixed-duration frames, emitted as soon as they are full
    #[default]
    Frames,
    /// One clip after the engine finishes
    WholeBuffer,
}

/// Capability flags for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProfile {
    /// Downsample 24 kHz -> 8 kHz
    #[serde(default = "default_true")]
    pub resample: bool,

    /// mu-law encode (otherwise PCM16 little-endian)
    #[serde(default = "default_true")]
    pub encode: bool,

    #[serde(default)]
    pub output: OutputMode,

    /// Frame duration in milliseconds
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Anti-aliasing filter length
    #[serde(default = "default_filter_taps")]
    pub filter_taps: usize,
}

impl Default for PipelineProfile {
    fn default() -> Self {
        Self::telephony()
    }
}

fn default_true() -> bool {
    true
}

fn default_frame_ms() -> u32 {
    20
}

fn default_filter_taps() -> usize {
    ResampleConfig::default().taps
}

impl PipelineProfile {
    /// 8 kHz mu-law in 160-byte frames
    pub fn telephony() -> Self {
        Self {
            resample: true,
            encode: true,
            output: OutputMode::Frames,
            frame_ms: default_frame_ms(),
            filter_taps: default_filter_taps(),
        }
    }

    /// The engine's own 24 kHz PCM, returned as one WAV clip
    pub fn wideband_wav() -> Self {
        Self {
            resample: false,
            encode: false,
            output: OutputMode::WholeBuffer,
            ..Self::telephony()
        }
    }

    pub fn output_rate(&self) -> u32 {
        if self.resample {
            TARGET_SAMPLE_RATE
        } else {
            ORIGIN_SAMPLE_RATE
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        if self.encode {
            1
        } else {
            2
        }
    }

    pub fn frame_size(&self) -> usize {
        (self.output_rate() as usize * self.frame_ms as usize / 1000) * self.bytes_per_sample()
    }

    /// Byte used to pad the final partial frame: encoded silence.
    pub fn pad_byte(&self) -> u8 {
        if self.encode {
            mulaw::SILENCE
        } else {
            0x00
        }
    }

    pub fn resample_config(&self) -> ResampleConfig {
        ResampleConfig {
            taps: self.filter_taps,
            ..ResampleConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resample {
            self.resample_config().validate()?;
        }
        if self.output == OutputMode::Frames {
            if self.frame_ms == 0 {
                return Err(Error::Config("frame_ms must be non-zero".to_string()));
            }
            if (self.output_rate() as u64 * self.frame_ms as u64) % 1000 != 0 {
                return Err(Error::Config(format!(
                    "{} ms is not a whole number of samples at {} Hz",
                    self.frame_ms,
                    self.output_rate()
                )));
            }
        }
        Ok(())
    }
}

enum Sink {
    Frames(FrameAssembler),
    Clip(Vec<i16>),
}

/// One run's synchronous state machine: chunk in, frames out.
pub struct Transcoder {
    encode: bool,
    output_rate: u32,
    converter: Option<RateConverter>,
    state: Option<ConversionState>,
    sink: Sink,
    finished: bool,
}

impl Transcoder {
    pub fn new(profile: &PipelineProfile) -> Result<Self> {
        profile.validate()?;

        let converter = if profile.resample {
            Some(RateConverter::new(profile.resample_config())?)
        } else {
            None
        };
        let state = converter.as_ref().map(|c| c.initial_state());

        let sink = match profile.output {
            OutputMode::Frames => {
                Sink::Frames(FrameAssembler::new(profile.frame_size(), profile.pad_byte())?)
            }
            OutputMode::WholeBuffer => Sink::Clip(Vec::new()),
        };

        Ok(Self {
            encode: profile.encode,
            output_rate: profile.output_rate(),
            converter,
            state,
            sink,
            finished: false,
        })
    }

    /// Feed one engine chunk; returns the frames it completed.
    pub fn push(&mut self, chunk: &[i16]) -> Result<Vec<Frame>> {
        if self.finished {
            return Err(Error::InvalidState("transcoder already finished".to_string()));
        }

        let samples: Cow<'_, [i16]> = match &self.converter {
            Some(converter) => {
                let state = self
                    .state
                    .take()
                    .ok_or_else(|| Error::InvalidState("conversion state lost".to_string()))?;
                let (samples, next) = converter.convert(chunk, state)?;
                self.state = Some(next);
                Cow::Owned(samples)
            }
            None => Cow::Borrowed(chunk),
        };

        match &mut self.sink {
            Sink::Clip(buffer) => {
                buffer.extend_from_slice(&samples);
                Ok(Vec::new())
            }
            Sink::Frames(framer) => {
                let mut bytes = BytesMut::with_capacity(samples.len() * 2);
                if self.encode {
                    mulaw::encode_into(&samples, &mut bytes);
                } else {
                    for sample in samples.iter() {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                }
                framer.push(&bytes)
            }
        }
    }

    /// End of input: the padded last frame, or the clip in whole-buffer mode.
    pub fn finish(&mut self) -> Result<Option<OutputEvent>> {
        if self.finished {
            return Err(Error::InvalidState("transcoder already finished".to_string()));
        }
        self.finished = true;

        match &mut self.sink {
            Sink::Frames(framer) => Ok(framer.flush()?.map(OutputEvent::Processing)),
            Sink::Clip(samples) => {
                let format = if self.encode {
                    AudioFormat::Mulaw
                } else {
                    AudioFormat::Wav
                };
                let clip = AudioEncoder::new(self.output_rate).encode(samples, format)?;
                samples.clear();
                Ok(Some(OutputEvent::Clip(clip)))
            }
        }
    }

    /// Bytes held back waiting for a full frame
    pub fn pending(&self) -> usize {
        match &self.sink {
            Sink::Frames(framer) => framer.pending(),
            Sink::Clip(samples) => samples.len(),
        }
    }
}

/// Turns engine chunk streams into event streams
#[derive(Debug, Clone)]
pub struct TranscodePipeline {
    profile: PipelineProfile,
}

impl TranscodePipeline {
    pub fn new(profile: PipelineProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self { profile })
    }

    pub fn telephony() -> Self {
        Self {
            profile: PipelineProfile::telephony(),
        }
    }

    pub fn profile(&self) -> &PipelineProfile {
        &self.profile
    }

    /// Start a run over `chunks`. Each call gets its own state.
    pub fn run<S>(&self, chunks: S) -> EventStream
    where
        S: Stream<Item = Result<RawChunk>> + Send + 'static,
    {
        Box::pin(transcode(self.profile.clone(), chunks))
    }
}

fn transcode<S>(profile: PipelineProfile, chunks: S) -> impl Stream<Item = OutputEvent>
where
    S: Stream<Item = Result<RawChunk>> + Send + 'static,
{
    stream! {
        let mut transcoder = match Transcoder::new(&profile) {
            Ok(transcoder) => transcoder,
            Err(e) => {
                warn!("Cannot start pipeline: {}", e);
                yield OutputEvent::Error(e.to_string());
                return;
            }
        };

        futures::pin_mut!(chunks);
        let started = Instant::now();
        let mut index = 0usize;
        let mut frames_out = 0usize;

        while let Some(next) = chunks.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(
                        "Engine failed after {} chunks, discarding {} pending bytes: {}",
                        index,
                        transcoder.pending(),
                        e
                    );
                    yield OutputEvent::Error(e.to_string());
                    return;
                }
            };

            let frames = match transcoder.push(&chunk) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("Transcoding chunk #{} failed: {}", index, e);
                    yield OutputEvent::Error(e.to_string());
                    return;
                }
            };

            debug!(
                "Chunk #{}: {} samples -> {} frames, {} pending",
                index,
                chunk.len(),
                frames.len(),
                transcoder.pending()
            );
            index += 1;

            for frame in frames {
                frames_out += 1;
                yield OutputEvent::Processing(frame);
            }
        }

        match transcoder.finish() {
            Ok(Some(event)) => {
                if let OutputEvent::Clip(clip) = &event {
                    info!(
                        "It took {:.2} seconds to generate {:.2} seconds of audio",
                        started.elapsed().as_secs_f64(),
                        clip.duration_ms / 1000.0
                    );
                }
                debug!("Flushed final output");
                frames_out += 1;
                yield event;
            }
            Ok(None) => debug!("No leftover tail to flush"),
            Err(e) => {
                warn!("Flushing pipeline failed: {}", e);
                yield OutputEvent::Error(e.to_string());
                return;
            }
        }

        info!("Pipeline completed: {} chunks in, {} events out", index, frames_out);
        yield OutputEvent::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use proptest::prelude::*;

    fn chunks(items: Vec<Result<RawChunk>>) -> impl Stream<Item = Result<RawChunk>> + Send {
        stream::iter(items)
    }

    async fn collect(pipeline: &TranscodePipeline, items: Vec<Result<RawChunk>>) -> Vec<OutputEvent> {
        pipeline.run(chunks(items)).collect().await
    }

    fn tone(len: usize) -> RawChunk {
        (0..len)
            .map(|i| (((i as f32) * 0.05).sin() * 9000.0) as i16)
            .collect()
    }

    fn frame_bytes(events: &[OutputEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Processing(frame) => Some(frame.as_bytes().to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Reference bytes: convert in one call and encode, no framing.
    fn reference_bytes(samples: &[i16]) -> Vec<u8> {
        let converter = RateConverter::telephony().unwrap();
        let (down, _) = converter.convert(samples, converter.initial_state()).unwrap();
        down.iter().map(|&s| mulaw::encode(s)).collect()
    }

    #[test]
    fn test_telephony_profile_dimensions() {
        let profile = PipelineProfile::telephony();
        assert_eq!(profile.frame_size(), 160);
        assert_eq!(profile.pad_byte(), 0xFF);
        assert_eq!(profile.output_rate(), 8000);
    }

    #[tokio::test]
    async fn test_twenty_ms_chunk_yields_one_frame() {
        let events = collect(&TranscodePipeline::telephony(), vec![Ok(tone(480))]).await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            OutputEvent::Processing(frame) => {
                assert_eq!(frame.len(), 160);
                assert_eq!(frame.as_bytes(), &reference_bytes(&tone(480))[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], OutputEvent::Completed);
    }

    #[tokio::test]
    async fn test_short_stream_is_padded_with_silence() {
        let input = tone(300);
        let events = collect(&TranscodePipeline::telephony(), vec![Ok(input.clone())]).await;

        assert_eq!(events.len(), 2);
        let bytes = frame_bytes(&events);
        assert_eq!(bytes.len(), 160);
        assert_eq!(&bytes[..100], &reference_bytes(&input)[..]);
        assert!(bytes[100..].iter().all(|&b| b == 0xFF));
        assert_eq!(events[1], OutputEvent::Completed);
    }

    #[tokio::test]
    async fn test_exact_multiple_adds_no_frame() {
        let events = collect(
            &TranscodePipeline::telephony(),
            vec![Ok(tone(700)), Ok(tone(260))],
        )
        .await;

        let frames = events
            .iter()
            .filter(|e| matches!(e, OutputEvent::Processing(_)))
            .count();
        assert_eq!(frames, 2);
        assert_eq!(events.last(), Some(&OutputEvent::Completed));
    }

    #[tokio::test]
    async fn test_engine_error_after_full_frame() {
        let events = collect(
            &TranscodePipeline::telephony(),
            vec![Ok(tone(480)), Err(Error::Engine("boom".to_string())), Ok(tone(480))],
        )
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OutputEvent::Processing(_)));
        assert_eq!(events[1], OutputEvent::Error("Engine error: boom".to_string()));
    }

    #[tokio::test]
    async fn test_engine_error_discards_partial_frame() {
        let events = collect(
            &TranscodePipeline::telephony(),
            vec![Ok(tone(600)), Err(Error::Engine("lost GPU".to_string()))],
        )
        .await;

        // 200 encoded bytes: one full frame, the other 40 are dropped
        assert_eq!(events.len(), 2);
        assert_eq!(frame_bytes(&events).len(), 160);
        assert!(matches!(events[1], OutputEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_empty_stream_completes_without_frames() {
        let events = collect(&TranscodePipeline::telephony(), vec![]).await;
        assert_eq!(events, vec![OutputEvent::Completed]);
    }

    #[tokio::test]
    async fn test_identical_input_gives_identical_events() {
        let pipeline = TranscodePipeline::telephony();
        let input = || vec![Ok(tone(1000)), Ok(tone(17)), Ok(tone(333))];
        assert_eq!(collect(&pipeline, input()).await, collect(&pipeline, input()).await);
    }

    #[tokio::test]
    async fn test_whole_buffer_wav_clip() {
        let pipeline = TranscodePipeline::new(PipelineProfile::wideband_wav()).unwrap();
        let events = collect(&pipeline, vec![Ok(tone(1000)), Ok(tone(200))]).await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            OutputEvent::Clip(clip) => {
                assert_eq!(clip.format, AudioFormat::Wav);
                assert_eq!(clip.sample_rate, 24_000);
                assert_eq!(clip.sample_count, 1200);
                assert_eq!(clip.duration_ms, 50.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], OutputEvent::Completed);
    }

    #[tokio::test]
    async fn test_whole_buffer_mulaw_clip() {
        let profile = PipelineProfile {
            output: OutputMode::WholeBuffer,
            ..PipelineProfile::telephony()
        };
        let pipeline = TranscodePipeline::new(profile).unwrap();
        let input = tone(900);
        let events = collect(&pipeline, vec![Ok(input[..450].to_vec()), Ok(input[450..].to_vec())]).await;

        match &events[0] {
            OutputEvent::Clip(clip) => {
                assert_eq!(clip.format, AudioFormat::Mulaw);
                assert_eq!(&clip.data[..], &reference_bytes(&input)[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_resampling_frames_hold_origin_rate() {
        let profile = PipelineProfile {
            resample: false,
            ..PipelineProfile::telephony()
        };
        assert_eq!(profile.frame_size(), 480);

        let pipeline = TranscodePipeline::new(profile).unwrap();
        let events = collect(&pipeline, vec![Ok(vec![0; 500])]).await;
        let bytes = frame_bytes(&events);
        assert_eq!(bytes.len(), 960);
        assert!(bytes.iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn test_pcm_frames_pad_with_zero() {
        let profile = PipelineProfile {
            encode: false,
            ..PipelineProfile::telephony()
        };
        assert_eq!(profile.frame_size(), 320);

        let pipeline = TranscodePipeline::new(profile).unwrap();
        let events = collect(&pipeline, vec![Ok(vec![-3000; 3])]).await;
        let bytes = frame_bytes(&events);
        assert_eq!(bytes.len(), 320);
        // one output sample, then zero padding
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_dropping_the_stream_cancels_the_run() {
        let pipeline = TranscodePipeline::telephony();
        let endless = stream::repeat_with(|| Ok(tone(480)));
        let first: Vec<_> = pipeline.run(endless).take(3).collect().await;
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|e| !e.is_terminal()));
    }

    #[test]
    fn test_finished_transcoder_rejects_input() {
        let mut transcoder = Transcoder::new(&PipelineProfile::telephony()).unwrap();
        transcoder.push(&tone(10)).unwrap();
        transcoder.finish().unwrap();

        assert!(matches!(transcoder.push(&tone(10)), Err(Error::InvalidState(_))));
        assert!(matches!(transcoder.finish(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_too_few_filter_taps_rejected_up_front() {
        let profile = PipelineProfile {
            filter_taps: 4,
            ..PipelineProfile::telephony()
        };
        assert!(matches!(profile.validate(), Err(Error::Config(_))));
        assert!(matches!(TranscodePipeline::new(profile.clone()), Err(Error::Config(_))));

        // taps only matter when resampling
        let passthrough = PipelineProfile {
            resample: false,
            ..profile
        };
        assert!(TranscodePipeline::new(passthrough).is_ok());
    }

    #[tokio::test]
    async fn test_empty_chunks_are_harmless() {
        let input = tone(500);
        let pipeline = TranscodePipeline::telephony();
        let plain = collect(&pipeline, vec![Ok(input.clone())]).await;
        let padded = collect(
            &pipeline,
            vec![Ok(vec![]), Ok(input[..250].to_vec()), Ok(vec![]), Ok(input[250..].to_vec()), Ok(vec![])],
        )
        .await;
        assert_eq!(plain, padded);
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let profile = PipelineProfile {
            frame_ms: 0,
            ..PipelineProfile::telephony()
        };
        assert!(matches!(TranscodePipeline::new(profile), Err(Error::Config(_))));
    }

    /// Cut at every point; repeated or boundary cuts give empty chunks.
    fn split(samples: &[i16], cuts: &[usize]) -> Vec<Result<RawChunk>> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (samples.len() + 1)).collect();
        points.sort_unstable();

        let mut out = Vec::new();
        let mut start = 0;
        for point in points.into_iter().chain(std::iter::once(samples.len())) {
            out.push(Ok(samples[start..point].to_vec()));
            start = point;
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Re-partitioning the same samples never changes the emitted bytes.
        #[test]
        fn chunk_boundaries_do_not_change_output(
            samples in prop::collection::vec(any::<i16>(), 1..3000),
            cuts in prop::collection::vec(any::<usize>(), 0..12),
        ) {
            let pipeline = TranscodePipeline::telephony();
            let whole = tokio_test::block_on(collect(&pipeline, vec![Ok(samples.clone())]));
            let pieces = tokio_test::block_on(collect(&pipeline, split(&samples, &cuts)));

            prop_assert_eq!(frame_bytes(&whole), frame_bytes(&pieces));
            prop_assert_eq!(pieces.last(), Some(&OutputEvent::Completed));
        }

        /// Every frame is full size, and a partial tail is padded with 0xFF.
        #[test]
        fn frames_are_full_and_padded(len in 1usize..2000) {
            let input = tone(len);
            let events = tokio_test::block_on(collect(&TranscodePipeline::telephony(), vec![Ok(input.clone())]));
            let expected = reference_bytes(&input);

            for event in &events {
                if let OutputEvent::Processing(frame) = event {
                    prop_assert_eq!(frame.len(), 160);
                }
            }

            let bytes = frame_bytes(&events);
            prop_assert_eq!(bytes.len(), expected.len().div_ceil(160) * 160);
            prop_assert_eq!(&bytes[..expected.len()], &expected[..]);
            prop_assert!(bytes[expected.len()..].iter().all(|&b| b == 0xFF));
        }
    }
}

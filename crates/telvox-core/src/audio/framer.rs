//! Fixed-size framing of the encoded byte stream

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::mulaw;
use crate::error::{Error, Result};
use crate::FRAME_SIZE;

/// One fixed-duration slice of encoded audio. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Accumulates encoded bytes and hands them out in whole frames.
///
/// Bytes below one frame stay buffered until the next [`push`](Self::push).
/// [`flush`](Self::flush) ends the stream: it pads the remainder with the
/// silence byte and may be called only once.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pad: u8,
    buffer: BytesMut,
    bytes_consumed: u64,
    frames_emitted: u64,
    flushed: bool,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, pad: u8) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::Config("frame size must be non-zero".to_string()));
        }
        Ok(Self::with_frame_size(frame_size, pad))
    }

    /// 160-byte mu-law frames padded with mu-law silence.
    pub fn telephony() -> Self {
        Self::with_frame_size(FRAME_SIZE, mulaw::SILENCE)
    }

    fn with_frame_size(frame_size: usize, pad: u8) -> Self {
        Self {
            frame_size,
            pad,
            buffer: BytesMut::with_capacity(frame_size * 2),
            bytes_consumed: 0,
            frames_emitted: 0,
            flushed: false,
        }
    }

    /// Append bytes and return every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        if self.flushed {
            return Err(Error::InvalidState(
                "frame assembler already flushed".to_string(),
            ));
        }

        self.buffer.extend_from_slice(bytes);
        self.bytes_consumed += bytes.len() as u64;

        let mut frames = Vec::with_capacity(self.buffer.len() / self.frame_size);
        while self.buffer.len() >= self.frame_size {
            frames.push(Frame(self.buffer.split_to(self.frame_size).freeze()));
        }
        self.frames_emitted += frames.len() as u64;

        trace!(
            "Framed {} bytes into {} frames, {} pending",
            bytes.len(),
            frames.len(),
            self.buffer.len()
        );
        Ok(frames)
    }

    /// Emit the padded remainder, if any. Ends the assembler's life.
    pub fn flush(&mut self) -> Result<Option<Frame>> {
        if self.flushed {
            return Err(Error::InvalidState(
                "frame assembler already flushed".to_string(),
            ));
        }
        self.flushed = true;

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut tail = self.buffer.split();
        let padding = self.frame_size - tail.len();
        tail.resize(self.frame_size, self.pad);
        self.frames_emitted += 1;

        trace!("Flushed final frame with {} padding bytes", padding);
        Ok(Some(Frame(tail.freeze())))
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes waiting for a full frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_frame() {
        let mut framer = FrameAssembler::telephony();
        let frames = framer.push(&[7u8; 160]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(framer.pending(), 0);
        assert_eq!(framer.flush().unwrap(), None);
    }

    #[test]
    fn test_accumulates_across_pushes() {
        let mut framer = FrameAssembler::telephony();
        assert!(framer.push(&[1u8; 100]).unwrap().is_empty());
        assert_eq!(framer.pending(), 100);

        let frames = framer.push(&[2u8; 300]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].as_bytes()[..100], &[1u8; 100][..]);
        assert_eq!(&frames[0].as_bytes()[100..], &[2u8; 60][..]);
        assert!(frames[1].as_bytes().iter().all(|&b| b == 2));
        assert_eq!(framer.pending(), 80);
        assert_eq!(framer.bytes_consumed(), 400);
        assert_eq!(framer.frames_emitted(), 2);
    }

    #[test]
    fn test_flush_pads_with_silence() {
        let mut framer = FrameAssembler::telephony();
        framer.push(&[0x10u8; 100]).unwrap();

        let frame = framer.flush().unwrap().unwrap();
        assert_eq!(frame.len(), 160);
        assert!(frame.as_bytes()[..100].iter().all(|&b| b == 0x10));
        assert!(frame.as_bytes()[100..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_use_after_flush_is_rejected() {
        let mut framer = FrameAssembler::telephony();
        framer.flush().unwrap();
        assert!(matches!(framer.push(&[0]), Err(Error::InvalidState(_))));
        assert!(matches!(framer.flush(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_custom_frame_size_and_pad() {
        let mut framer = FrameAssembler::new(4, 0x00).unwrap();
        let frames = framer.push(&[9, 9, 9, 9, 9, 9]).unwrap();
        assert_eq!(frames.len(), 1);
        let tail = framer.flush().unwrap().unwrap();
        assert_eq!(tail.as_bytes(), &[9, 9, 0, 0]);
    }

    #[test]
    fn test_zero_frame_size_is_rejected() {
        assert!(matches!(FrameAssembler::new(0, 0xFF), Err(Error::Config(_))));
    }
}

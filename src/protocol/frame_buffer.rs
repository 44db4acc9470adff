//! Incremental frame extraction from a byte stream.
//!
//! The socket delivers arbitrary chunks; frames routinely arrive split
//! across reads or packed several to a read. [`FrameBuffer`] accumulates
//! chunks and yields complete frame bodies (length prefix stripped) as soon
//! as they close.
//!
//! State machine:
//!
//! ```text
//!                  +------ body complete ------+
//!                  v                           |
//!   WaitingForLength --- length parsed ---> WaitingForBody
//!          ^      |
//!          |      +-- length > max --> SkippingBody
//!          |                               |
//!          +------- body consumed ---------+
//! ```
//!
//! An oversized length does not poison the stream. The body is consumed
//! and discarded, a counter ticks, and parsing resumes at the next frame.

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::wire_format::{DEFAULT_MAX_INCOMING_BODY, LENGTH_PREFIX_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingForLength,
    WaitingForBody { remaining: u32 },
    SkippingBody { remaining: u32 },
}

/// Reassembles length-prefixed frames from stream chunks.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_body: u32,
    skipped: u64,
}

impl FrameBuffer {
    /// Creates a buffer with the default incoming body cap.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_INCOMING_BODY)
    }

    /// Creates a buffer that discards bodies larger than `max_body` bytes.
    pub fn with_max_body(max_body: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_MAX_INCOMING_BODY as usize),
            state: State::WaitingForLength,
            max_body,
            skipped: 0,
        }
    }

    /// Feeds one chunk from the socket and returns every frame body it
    /// completes, in arrival order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    fn try_extract_one(&mut self) -> Option<Bytes> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return None;
                    }
                    let length = self.buffer.get_u32();
                    if length > self.max_body {
                        tracing::warn!(
                            "Discarding oversized frame: {} bytes (max {})",
                            length,
                            self.max_body
                        );
                        self.skipped += 1;
                        self.state = State::SkippingBody { remaining: length };
                    } else {
                        self.state = State::WaitingForBody { remaining: length };
                    }
                }
                State::WaitingForBody { remaining } => {
                    if (self.buffer.len() as u32) < remaining {
                        return None;
                    }
                    let body = self.buffer.split_to(remaining as usize).freeze();
                    self.state = State::WaitingForLength;
                    return Some(body);
                }
                State::SkippingBody { remaining } => {
                    let available = self.buffer.len() as u32;
                    if available < remaining {
                        self.buffer.clear();
                        self.state = State::SkippingBody {
                            remaining: remaining - available,
                        };
                        return None;
                    }
                    self.buffer.advance(remaining as usize);
                    self.state = State::WaitingForLength;
                }
            }
        }
    }

    /// Bytes buffered but not yet yielded.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no partial frame is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.state == State::WaitingForLength
    }

    /// Number of oversized frames discarded so far.
    #[inline]
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Drops any partial frame and resets to a fresh stream.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + body.len());
        out.put_u32(body.len() as u32);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_single_frame() {
        let mut fb = FrameBuffer::new();
        let frames = fb.push(&frame(b"hello"));

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(fb.is_empty());
    }

    #[test]
    fn test_multiple_frames_one_push() {
        let mut fb = FrameBuffer::new();
        let mut data = frame(b"one");
        data.extend_from_slice(&frame(b"two"));
        data.extend_from_slice(&frame(b"three"));

        let frames = fb.push(&data);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"one");
        assert_eq!(&frames[1][..], b"two");
        assert_eq!(&frames[2][..], b"three");
    }

    #[test]
    fn test_fragmented_length_prefix() {
        let mut fb = FrameBuffer::new();
        let data = frame(b"abcd");

        assert!(fb.push(&data[..2]).is_empty());
        let frames = fb.push(&data[2..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"abcd");
    }

    #[test]
    fn test_fragmented_body() {
        let mut fb = FrameBuffer::new();
        let data = frame(b"abcdef");

        assert!(fb.push(&data[..7]).is_empty());
        let frames = fb.push(&data[7..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"abcdef");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut fb = FrameBuffer::new();
        let data = frame(b"slow");

        let mut collected = Vec::new();
        for byte in &data {
            collected.extend(fb.push(std::slice::from_ref(byte)));
        }
        assert_eq!(collected.len(), 1);
        assert_eq!(&collected[0][..], b"slow");
    }

    #[test]
    fn test_zero_length_body() {
        let mut fb = FrameBuffer::new();
        let frames = fb.push(&frame(b""));

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn test_oversized_frame_skipped_stream_survives() {
        let mut fb = FrameBuffer::with_max_body(8);

        let mut data = frame(&[0xAA; 32]); // over the cap
        data.extend_from_slice(&frame(b"ok"));

        let frames = fb.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"ok");
        assert_eq!(fb.skipped_frames(), 1);
    }

    #[test]
    fn test_oversized_frame_skipped_across_pushes() {
        let mut fb = FrameBuffer::with_max_body(8);
        let big = frame(&[0xBB; 100]);

        assert!(fb.push(&big[..40]).is_empty());
        assert!(fb.push(&big[40..]).is_empty());

        let frames = fb.push(&frame(b"after"));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"after");
        assert_eq!(fb.skipped_frames(), 1);
    }

    #[test]
    fn test_clear_resets_partial_frame() {
        let mut fb = FrameBuffer::new();
        let data = frame(b"partial");
        fb.push(&data[..6]);
        assert!(!fb.is_empty());

        fb.clear();
        assert!(fb.is_empty());

        let frames = fb.push(&frame(b"fresh"));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"fresh");
    }
}

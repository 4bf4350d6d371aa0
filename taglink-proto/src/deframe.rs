//! Byte-stream reassembly into frames.
//!
//! The serial line carries no delimiters, so alignment is kept by the
//! checksum alone: while at least one frame's worth of bytes is buffered,
//! the head of the buffer is treated as a candidate frame. A checksum
//! failure almost certainly means a byte was lost or duplicated mid-stream;
//! the cheapest recovery is to discard everything buffered and let the
//! caller NAK the frame it expected, so the sender's retransmission arrives
//! into an empty, aligned buffer.

use heapless::Vec;

use crate::frame::{Frame, FrameError, FRAME_LEN};

/// Internal buffer capacity, two full frames.
pub const DEFRAME_CAPACITY: usize = 2 * FRAME_LEN;

/// Error surfaced by [`Deframer::next_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeframeError {
    /// Checksum mismatch. The buffer has been cleared; the caller should
    /// request a retransmission of the frame it expected.
    Crc,
}

/// Reassembles a raw byte stream into 20-byte frames.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8, DEFRAME_CAPACITY>,
}

impl Deframer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes. Returns how many were accepted; the rest is
    /// dropped if the buffer is full (the following checksum failure then
    /// triggers the normal flush-and-NAK recovery).
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let room = DEFRAME_CAPACITY - self.buf.len();
        let take = bytes.len().min(room);
        // Capacity was checked above.
        let _ = self.buf.extend_from_slice(&bytes[..take]);
        take
    }

    /// Extract the next complete frame, if any.
    ///
    /// Frames with a valid checksum but an unknown type code are skipped
    /// silently. A checksum mismatch clears the buffer and is reported
    /// exactly once so the caller can emit a single NAK.
    pub fn next_frame(&mut self) -> Option<Result<Frame, DeframeError>> {
        loop {
            if self.buf.len() < FRAME_LEN {
                return None;
            }
            let mut raw = [0u8; FRAME_LEN];
            raw.copy_from_slice(&self.buf[..FRAME_LEN]);
            match Frame::decode(&raw) {
                Ok(frame) => {
                    self.consume_front();
                    return Some(Ok(frame));
                }
                Err(FrameError::UnknownType(_)) => {
                    self.consume_front();
                }
                Err(FrameError::Crc) => {
                    self.buf.clear();
                    return Some(Err(DeframeError::Crc));
                }
            }
        }
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn consume_front(&mut self) {
        let remaining = self.buf.len() - FRAME_LEN;
        self.buf.copy_within(FRAME_LEN.., 0);
        self.buf.truncate(remaining);
    }
}

//! Fluent construction of link frames.
//!
//! # Example
//!
//! ```
//! use taglink_proto::{FrameBuilder, FrameType};
//!
//! // A vest-hit report: seq 2, shield 10, health 85.
//! let shot = FrameBuilder::new(FrameType::VestShot)
//!     .seq(2)
//!     .state(10, 85)
//!     .build();
//!
//! // The NAK a receiver emits when it is still waiting for seq 4.
//! let nak = FrameBuilder::new(FrameType::Nak).seq(4).build();
//!
//! assert_eq!(shot.state_bytes(), (10, 85));
//! assert_eq!(nak.encode().len(), 20);
//! ```

use crate::frame::{Frame, FrameType, ImuReading, FRAME_LEN};

/// Builder for a single frame. Starts at sequence 0 with a zeroed payload.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    /// Start building a frame of the given type.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame: Frame::new(frame_type, 0),
        }
    }

    /// Set the sequence number (the expected sequence for NAK frames).
    pub fn seq(mut self, seq: u8) -> Self {
        self.frame.seq = seq;
        self
    }

    /// Set the two role-state payload bytes.
    pub fn state(mut self, a: u8, b: u8) -> Self {
        self.frame.set_state_bytes(a, b);
        self
    }

    /// Write an inertial reading into the payload.
    pub fn imu(mut self, reading: &ImuReading) -> Self {
        self.frame.set_imu_reading(reading);
        self
    }

    /// Finish building.
    pub fn build(self) -> Frame {
        self.frame
    }

    /// Finish building and serialize in one step.
    pub fn encode(self) -> [u8; FRAME_LEN] {
        self.frame.encode()
    }
}

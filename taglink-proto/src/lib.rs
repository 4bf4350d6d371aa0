//! Wire format for the taglink peripheral link.
//!
//! Every byte that crosses the serial bridge between a peripheral (gun,
//! vest, glove) and the relay host belongs to a fixed 20-byte frame:
//!
//! ```text
//! +------+-----+------------------+----------+-----+
//! | type | seq | payload (16 B)   | reserved | crc |
//! +------+-----+------------------+----------+-----+
//!    0      1       2..=17             18       19
//! ```
//!
//! - `type` - one printable ASCII code, see [`FrameType`]
//! - `seq` - sender's sequence number for data frames; the expected
//!   sequence number for NAK frames
//! - `payload` - type-specific, zero-padded; see [`Frame`] accessors
//! - `crc` - CRC-8 (polynomial 0x07, init 0x00) over bytes 0..19
//!
//! There is no inter-frame delimiter. Alignment is maintained by the CRC:
//! the [`Deframer`] discards its whole buffer on a checksum mismatch so the
//! peer can re-request the expected frame with a NAK.
//!
//! # Example
//!
//! ```
//! use taglink_proto::{Deframer, Frame, FrameBuilder, FrameType};
//!
//! let shot = FrameBuilder::new(FrameType::GunShot).seq(0).state(5, 0).build();
//!
//! let mut deframer = Deframer::new();
//! deframer.push(&shot.encode());
//! let frame = deframer.next_frame().unwrap().unwrap();
//! assert_eq!(frame, shot);
//! assert_eq!(frame.state_bytes(), (5, 0));
//! ```
//!
//! # Features
//!
//! - **`std`**: standard library support (host tools and tests)
//! - **`defmt`**: defmt formatting for embedded logging
//! - **`embedded-io`**: [`Frame::write_io`] for I/O peripherals
//!
//! # No-std support
//!
//! This crate is `#![no_std]` by default and performs no heap allocation.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod builder;
pub mod crc;
pub mod deframe;
pub mod frame;

pub use builder::FrameBuilder;
pub use crc::calculate_crc8;
pub use deframe::{DeframeError, Deframer, DEFRAME_CAPACITY};
pub use frame::{Frame, FrameError, FrameType, ImuReading, FRAME_LEN, PAYLOAD_LEN};

/// Serial line rate shared by all three peripherals (8N1).
pub const LINK_BAUD: u32 = 115_200;

//! Frame model: type codes, the fixed 20-byte layout, and typed payload
//! views.

use crate::crc::calculate_crc8;

/// Total size of a frame on the wire.
pub const FRAME_LEN: usize = 20;

/// Size of the type-specific payload area (bytes 2..=17).
pub const PAYLOAD_LEN: usize = 16;

/// Offset of the CRC byte. The checksum covers every byte before it.
const CRC_OFFSET: usize = FRAME_LEN - 1;

/// Frame type codes, one printable ASCII character each.
///
/// `Syn` and `Ack` gate the session: until the three-message handshake
/// completes, a peripheral accepts nothing else. `Imu` is best-effort
/// telemetry and never carries a sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FrameType {
    /// Handshake open (host to device).
    Syn = b'S',
    /// Handshake acknowledgement (both directions).
    Ack = b'A',
    /// Retransmission request; `seq` holds the expected sequence number.
    Nak = b'N',
    /// Inertial telemetry (device to host, unacknowledged).
    Imu = b'M',
    /// Gun trigger event (device to host), echoed verbatim by the host.
    GunShot = b'G',
    /// Vest hit event (device to host), echoed verbatim by the host.
    VestShot = b'V',
    /// Magazine refill command (host to device), echoed as its own ack.
    Reload = b'R',
    /// Authoritative state overwrite (host to device).
    UpdateState = b'U',
    /// Device ack for a gun-side `UpdateState`.
    GunStateAck = b'X',
    /// Device ack for a vest-side `UpdateState`.
    VestStateAck = b'W',
    /// Reset order (both directions).
    Kill = b'K',
}

impl FrameType {
    /// The on-wire code for this frame type.
    #[inline]
    #[must_use]
    pub const fn wire(self) -> u8 {
        self as u8
    }

    /// Parse an on-wire type code.
    #[must_use]
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            b'S' => Some(Self::Syn),
            b'A' => Some(Self::Ack),
            b'N' => Some(Self::Nak),
            b'M' => Some(Self::Imu),
            b'G' => Some(Self::GunShot),
            b'V' => Some(Self::VestShot),
            b'R' => Some(Self::Reload),
            b'U' => Some(Self::UpdateState),
            b'X' => Some(Self::GunStateAck),
            b'W' => Some(Self::VestStateAck),
            b'K' => Some(Self::Kill),
            _ => None,
        }
    }

    /// True for the two handshake codes. Handshake frames never consume a
    /// sequence number and are never buffered for retransmission.
    #[inline]
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(self, Self::Syn | Self::Ack)
    }
}

/// Error type for frame decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Checksum mismatch; the bytes cannot be trusted at all.
    Crc,
    /// Valid checksum but an unrecognised type code.
    UnknownType(u8),
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Crc => write!(f, "checksum mismatch"),
            Self::UnknownType(code) => write!(f, "unknown frame type 0x{code:02X}"),
        }
    }
}

/// A decoded link frame.
///
/// The payload keeps its raw bytes; the typed accessors interpret them
/// per frame type. Equality ignores the reserved byte and CRC, which are
/// (re)generated on [`encode`](Frame::encode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub frame_type: FrameType,
    pub seq: u8,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    /// Create a frame with a zeroed payload.
    #[must_use]
    pub const fn new(frame_type: FrameType, seq: u8) -> Self {
        Self {
            frame_type,
            seq,
            payload: [0; PAYLOAD_LEN],
        }
    }

    /// Serialize to the 20-byte wire representation, reserved byte zeroed
    /// and CRC appended.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0] = self.frame_type.wire();
        buf[1] = self.seq;
        buf[2..2 + PAYLOAD_LEN].copy_from_slice(&self.payload);
        buf[CRC_OFFSET] = calculate_crc8(&buf[..CRC_OFFSET]);
        buf
    }

    /// Decode a 20-byte wire frame.
    ///
    /// The checksum is verified first; a frame that fails it carries no
    /// usable information. The reserved byte is covered by the CRC but its
    /// value is otherwise ignored.
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if calculate_crc8(&bytes[..CRC_OFFSET]) != bytes[CRC_OFFSET] {
            return Err(FrameError::Crc);
        }
        let frame_type = FrameType::from_wire(bytes[0]).ok_or(FrameError::UnknownType(bytes[0]))?;
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[2..2 + PAYLOAD_LEN]);
        Ok(Self {
            frame_type,
            seq: bytes[1],
            payload,
        })
    }

    /// The two role-state bytes: `(bullets, 0)` for gun frames,
    /// `(shield, health)` for vest frames.
    #[inline]
    #[must_use]
    pub const fn state_bytes(&self) -> (u8, u8) {
        (self.payload[0], self.payload[1])
    }

    /// Set the two role-state bytes.
    #[inline]
    pub fn set_state_bytes(&mut self, a: u8, b: u8) {
        self.payload[0] = a;
        self.payload[1] = b;
    }

    /// Interpret the payload as an IMU reading (valid for `Imu` frames).
    #[must_use]
    pub fn imu_reading(&self) -> ImuReading {
        ImuReading::from_payload(&self.payload)
    }

    /// Write an IMU reading into the payload.
    pub fn set_imu_reading(&mut self, reading: &ImuReading) {
        reading.write_payload(&mut self.payload);
    }

    /// Encode and write the frame to an `embedded_io::Write` peripheral.
    #[cfg(feature = "embedded-io")]
    pub fn write_io<W: embedded_io::Write>(&self, writer: &mut W) -> Result<(), W::Error> {
        writer.write_all(&self.encode())
    }
}

/// One inertial sample as carried on the wire: six signed 16-bit axes,
/// each the sensor value multiplied by 100, little-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuReading {
    /// Accelerometer axes (x, y, z) in centi-m/s².
    pub accel: [i16; 3],
    /// Gyroscope axes (x, y, z) in centi-rad/s.
    pub gyro: [i16; 3],
}

impl ImuReading {
    /// Parse the first 12 payload bytes.
    #[must_use]
    pub fn from_payload(payload: &[u8; PAYLOAD_LEN]) -> Self {
        let mut axes = [0i16; 6];
        for (i, axis) in axes.iter_mut().enumerate() {
            *axis = i16::from_le_bytes([payload[2 * i], payload[2 * i + 1]]);
        }
        Self {
            accel: [axes[0], axes[1], axes[2]],
            gyro: [axes[3], axes[4], axes[5]],
        }
    }

    /// Write the reading into the first 12 payload bytes; the rest stays
    /// untouched (zero in a fresh frame).
    pub fn write_payload(&self, payload: &mut [u8; PAYLOAD_LEN]) {
        let axes = [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ];
        for (i, axis) in axes.iter().enumerate() {
            payload[2 * i..2 * i + 2].copy_from_slice(&axis.to_le_bytes());
        }
    }
}

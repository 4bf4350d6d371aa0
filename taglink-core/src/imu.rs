//! Inertial sampling: calibration, wire quantisation, send cadence.
//!
//! IMU frames are best-effort telemetry - no sequence number, no
//! acknowledgement, loss tolerated by design.

use taglink_proto::ImuReading;

use crate::ports::ImuSample;

/// Cadence of IMU frames while a session is up.
pub const IMU_INTERVAL_MS: u64 = 50;

/// Per-unit zero offsets, subtracted before quantisation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuCalibration {
    /// Accelerometer offsets (x, y, z) in m/s².
    pub accel_offset: [f32; 3],
    /// Gyroscope offsets (x, y, z) in rad/s.
    pub gyro_offset: [f32; 3],
}

impl ImuCalibration {
    /// Apply the offsets and quantise to the wire format: each axis
    /// multiplied by 100 and saturated into an `i16`.
    #[must_use]
    pub fn quantize(&self, sample: &ImuSample) -> ImuReading {
        let mut reading = ImuReading::default();
        for i in 0..3 {
            reading.accel[i] = quantize_axis(sample.accel[i], self.accel_offset[i]);
            reading.gyro[i] = quantize_axis(sample.gyro[i], self.gyro_offset[i]);
        }
        reading
    }
}

fn quantize_axis(value: f32, offset: f32) -> i16 {
    // `as` saturates on overflow and maps NaN to zero.
    ((value - offset) * 100.0) as i16
}

/// Tracks when the next IMU frame is due.
#[derive(Debug, Default)]
pub struct ImuCadence {
    last_sent_ms: Option<u64>,
}

impl ImuCadence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a frame should be sent now; records the send time.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_sent_ms {
            Some(last) if now_ms.saturating_sub(last) < IMU_INTERVAL_MS => false,
            _ => {
                self.last_sent_ms = Some(now_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_sent_ms = None;
    }
}

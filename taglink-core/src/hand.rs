//! The glove peripheral: inertial telemetry only.

use taglink_proto::{Deframer, Frame, FrameBuilder, FrameType, FRAME_LEN};

use crate::imu::{ImuCadence, ImuCalibration};
use crate::link::{Link, LinkEvent};
use crate::ports::{Clock, ImuSensor, PeripheralError, SerialPort};
use crate::state::HandState;

/// The glove peripheral loop.
pub struct Hand<S, C, I> {
    serial: S,
    clock: C,
    imu: I,
    cal: ImuCalibration,
    link: Link<HandState>,
    deframer: Deframer,
    cadence: ImuCadence,
}

impl<S, C, I> Hand<S, C, I>
where
    S: SerialPort,
    C: Clock,
    I: ImuSensor,
{
    pub fn new(serial: S, clock: C, imu: I, cal: ImuCalibration) -> Self {
        Self {
            serial,
            clock,
            imu,
            cal,
            link: Link::new(),
            deframer: Deframer::new(),
            cadence: ImuCadence::new(),
        }
    }

    /// Run one loop iteration: serial first (at most one frame), then the
    /// IMU cadence.
    pub fn poll(&mut self) -> Result<(), PeripheralError> {
        let now = self.clock.now_ms();
        self.pump_serial()?;
        self.poll_imu(now)?;
        Ok(())
    }

    #[must_use]
    pub fn has_handshake(&self) -> bool {
        self.link.has_handshake()
    }

    fn pump_serial(&mut self) -> Result<(), PeripheralError> {
        let mut chunk = [0u8; FRAME_LEN];
        let n = self.serial.read(&mut chunk)?;
        if n > 0 {
            self.deframer.push(&chunk[..n]);
        }
        match self.deframer.next_frame() {
            Some(Ok(frame)) => self.dispatch(&frame)?,
            Some(Err(_)) => {
                let nak = self.link.crc_recovery_nak();
                self.send(&nak)?;
            }
            None => {}
        }
        Ok(())
    }

    fn dispatch(&mut self, frame: &Frame) -> Result<(), PeripheralError> {
        let out = self.link.handle_frame(frame);
        if let Some(reply) = out.reply {
            self.send(&reply)?;
        }
        if out.event == LinkEvent::Reset {
            self.reset();
        }
        Ok(())
    }

    fn poll_imu(&mut self, now: u64) -> Result<(), PeripheralError> {
        if !self.link.has_handshake() || !self.cadence.due(now) {
            return Ok(());
        }
        let sample = self.imu.read()?;
        let reading = self.cal.quantize(&sample);
        let frame = FrameBuilder::new(FrameType::Imu).imu(&reading).build();
        self.send(&frame)
    }

    fn send(&mut self, frame: &Frame) -> Result<(), PeripheralError> {
        self.serial.write_all(&frame.encode())?;
        Ok(())
    }

    fn reset(&mut self) {
        self.link.reset();
        self.deframer.clear();
        self.cadence.reset();
    }
}

//! The gun peripheral: trigger, muzzle IR emitter, inertial sensor,
//! magazine LEDs.

use taglink_proto::{Deframer, Frame, FrameBuilder, FrameType, FRAME_LEN};

use crate::debounce::Debouncer;
use crate::imu::{ImuCadence, ImuCalibration};
use crate::link::{Link, LinkEvent};
use crate::ports::{
    Clock, Color, ImuSensor, IrEmitter, LedStrip, PeripheralError, SerialPort, Trigger,
};
use crate::state::GunState;

/// The 32-bit NEC burst the muzzle fires per shot.
pub const GUN_IR_CODE: u32 = 0x00FF_6897;

/// NEC frames are always 32 bits here.
pub const NEC_BITS: u8 = 32;

/// One pixel per bullet in the magazine.
pub const MAGAZINE_PIXELS: usize = crate::state::MAG_SIZE as usize;

/// Low-intensity green; the strip driver handles GRB ordering.
pub const MAGAZINE_COLOR: Color = Color::new(0, 10, 0);

/// The gun peripheral loop.
///
/// Construct it from the board's port implementations and call
/// [`poll`](Gun::poll) once per scheduler tick.
pub struct Gun<S, C, T, I, E, L> {
    serial: S,
    clock: C,
    trigger: T,
    imu: I,
    ir: E,
    leds: L,
    cal: ImuCalibration,
    link: Link<GunState>,
    deframer: Deframer,
    debounce: Debouncer,
    cadence: ImuCadence,
}

impl<S, C, T, I, E, L> Gun<S, C, T, I, E, L>
where
    S: SerialPort,
    C: Clock,
    T: Trigger,
    I: ImuSensor,
    E: IrEmitter,
    L: LedStrip,
{
    pub fn new(
        serial: S,
        clock: C,
        trigger: T,
        imu: I,
        ir: E,
        leds: L,
        cal: ImuCalibration,
    ) -> Self {
        let mut gun = Self {
            serial,
            clock,
            trigger,
            imu,
            ir,
            leds,
            cal,
            link: Link::new(),
            deframer: Deframer::new(),
            debounce: Debouncer::new(),
            cadence: ImuCadence::new(),
        };
        gun.redraw(GunState::default());
        gun
    }

    /// Run one loop iteration: serial first (at most one frame), then the
    /// trigger, then IMU cadence, then the retransmission timer.
    pub fn poll(&mut self) -> Result<(), PeripheralError> {
        let now = self.clock.now_ms();
        self.pump_serial()?;
        self.poll_trigger(now)?;
        self.poll_imu(now)?;
        if let Some(frame) = self.link.poll_retransmit(now) {
            self.send(&frame)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn has_handshake(&self) -> bool {
        self.link.has_handshake()
    }

    /// The magazine as the player sees it (staged value while a shot is in
    /// flight).
    #[must_use]
    pub fn state(&self) -> GunState {
        self.link.effective_state()
    }

    /// The magazine as last confirmed by the host.
    #[must_use]
    pub fn canonical_state(&self) -> GunState {
        self.link.canonical_state()
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
        match out.event {
            LinkEvent::SessionEstablished(state)
            | LinkEvent::ShotConfirmed(state)
            | LinkEvent::StateCommand(state) => self.redraw(state),
            LinkEvent::Reset => self.reset(),
            LinkEvent::None => {}
        }
        Ok(())
    }

    fn poll_trigger(&mut self, now: u64) -> Result<(), PeripheralError> {
        let raw = self.trigger.is_pressed();
        let pressed = self.debounce.update(raw, now);
        if !pressed || !self.link.can_send_shot() {
            return Ok(());
        }
        let Some(after) = self.link.effective_state().spend_bullet() else {
            // Dry fire: no IR, no frame.
            return Ok(());
        };
        self.ir.send_nec(GUN_IR_CODE, NEC_BITS);
        if let Some(frame) = self.link.send_shot(after, now) {
            self.send(&frame)?;
            self.redraw(after);
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
        self.debounce.reset();
        self.cadence.reset();
        self.redraw(GunState::default());
    }

    fn redraw(&mut self, state: GunState) {
        for i in 0..MAGAZINE_PIXELS {
            let color = if (i as u8) < state.bullets {
                MAGAZINE_COLOR
            } else {
                Color::OFF
            };
            self.leds.set_pixel(i, color);
        }
        self.leds.show();
    }
}

//! The vest peripheral: IR receiver and health-bar LEDs.

use taglink_proto::{Deframer, Frame, FRAME_LEN};

use crate::link::{Link, LinkEvent};
use crate::ports::{Clock, Color, IrReceiver, LedStrip, PeripheralError, SerialPort};
use crate::state::{VestState, HIT_DAMAGE};

/// NEC command byte a gun burst decodes to.
pub const VEST_HIT_COMMAND: u32 = 0x16;

/// The HP bar is ten pixels; each fully lit pixel is ten health.
pub const HP_BAR_PIXELS: usize = 10;

/// Health per fully lit pixel.
pub const HEALTH_PER_PIXEL: u8 = 10;

pub const HP_COLOR_FULL: Color = Color::new(0, 60, 0);
pub const HP_COLOR_DIM: Color = Color::new(0, 10, 0);

/// The vest peripheral loop.
pub struct Vest<S, C, R, L> {
    serial: S,
    clock: C,
    ir: R,
    leds: L,
    link: Link<VestState>,
    deframer: Deframer,
}

impl<S, C, R, L> Vest<S, C, R, L>
where
    S: SerialPort,
    C: Clock,
    R: IrReceiver,
    L: LedStrip,
{
    pub fn new(serial: S, clock: C, ir: R, leds: L) -> Self {
        let mut vest = Self {
            serial,
            clock,
            ir,
            leds,
            link: Link::new(),
            deframer: Deframer::new(),
        };
        vest.redraw(VestState::default());
        vest
    }

    /// Run one loop iteration: serial first (at most one frame), then the
    /// IR receiver, then the retransmission timer.
    pub fn poll(&mut self) -> Result<(), PeripheralError> {
        let now = self.clock.now_ms();
        self.pump_serial()?;
        self.poll_ir(now)?;
        if let Some(frame) = self.link.poll_retransmit(now) {
            self.send(&frame)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn has_handshake(&self) -> bool {
        self.link.has_handshake()
    }

    /// Shield and health as the player sees them.
    #[must_use]
    pub fn state(&self) -> VestState {
        self.link.effective_state()
    }

    #[must_use]
    pub fn canonical_state(&self) -> VestState {
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

    fn poll_ir(&mut self, now: u64) -> Result<(), PeripheralError> {
        let Some(command) = self.ir.decode() else {
            return Ok(());
        };
        if command != VEST_HIT_COMMAND || !self.link.can_send_shot() {
            return Ok(());
        }
        let after = self.link.effective_state().apply_damage(HIT_DAMAGE);
        if let Some(frame) = self.link.send_shot(after, now) {
            self.send(&frame)?;
            self.redraw(after);
        }
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), PeripheralError> {
        self.serial.write_all(&frame.encode())?;
        Ok(())
    }

    fn reset(&mut self) {
        self.link.reset();
        self.deframer.clear();
        self.redraw(VestState::default());
    }

    fn redraw(&mut self, state: VestState) {
        let full = usize::from(state.health / HEALTH_PER_PIXEL);
        let remainder = state.health % HEALTH_PER_PIXEL;
        for i in 0..HP_BAR_PIXELS {
            let color = if i < full {
                HP_COLOR_FULL
            } else if i == full && remainder > 0 {
                HP_COLOR_DIM
            } else {
                Color::OFF
            };
            self.leds.set_pixel(i, color);
        }
        self.leds.show();
    }
}

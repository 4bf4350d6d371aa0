//! Host session: the relay's side of the link to one peripheral.
//!
//! The session mirrors the peripheral's engine, direction-reversed. It
//! originates the handshake, echoes shot reports in sequence order (a
//! duplicated report gets its original echo back, never a second apply),
//! and issues RELOAD / UPDATE_STATE commands under its own sequence
//! counter with a bounded retransmission budget. Frames it can no longer
//! retransmit for an incoming NAK force a KILL, after which the caller is
//! expected to reconnect.

use tracing::{debug, info, warn};

use taglink_core::{Clock, GunState, Role, SerialError, SerialPort, VestState, HIT_DAMAGE};
use taglink_proto::{
    Deframer, Frame, FrameBuilder, FrameType, ImuReading, FRAME_LEN,
};

use crate::game::{HostGunState, HostVestState};

/// How long to wait for the device's handshake ACK before resending SYN.
pub const HANDSHAKE_RETRY_MS: u64 = 1000;

/// How long to wait for a command acknowledgement before retransmitting.
pub const COMMAND_TIMEOUT_MS: u64 = 1000;

/// Retransmission budget for an unacknowledged command.
pub const MAX_COMMAND_RESEND: u8 = 3;

const WINDOW: usize = 4;

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("serial port failure: {0:?}")]
    Serial(SerialError),
    #[error("a command is already awaiting acknowledgement")]
    Busy,
    #[error("command not valid for this peripheral role")]
    WrongRole,
}

impl From<SerialError> for SessionError {
    fn from(err: SerialError) -> Self {
        Self::Serial(err)
    }
}

/// Things the game layer learns from one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// The three-message handshake completed.
    HandshakeComplete,
    /// Telemetry from the peripheral's inertial sensor.
    Imu(ImuReading),
    /// A gunshot was registered (exactly once) and echoed.
    ShotRegistered(GunState),
    /// A vest hit was registered (exactly once) and echoed.
    HitRegistered(VestState),
    /// A RELOAD / UPDATE_STATE command was acknowledged and committed.
    CommandAcked { seq: u8 },
    /// A command exhausted its retransmission budget and was abandoned.
    CommandLost { seq: u8 },
    /// The device reset (KILL in either direction); reconnect to resume.
    SessionDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    SynSent,
    Established,
}

/// Which peripheral this session talks to, plus its state mirror.
#[derive(Debug)]
pub enum RoleMirror {
    Gun(HostGunState),
    Vest(HostVestState),
    Hand,
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    seq: u8,
    sent_ms: u64,
    resends: u8,
}

/// The relay's side of the link to one peripheral.
pub struct HostSession<S, C> {
    serial: S,
    clock: C,
    mirror: RoleMirror,
    deframer: Deframer,
    phase: Phase,
    syn_sent_ms: u64,
    /// Next sequence number expected on device shot reports.
    dev_expected: u8,
    /// Echoes already sent, indexed by device sequence `% 4`.
    echo_cache: [Option<Frame>; WINDOW],
    /// Next sequence number for host commands.
    cmd_seq: u8,
    /// Commands sent, indexed by their sequence `% 4`, kept for NAKs.
    cmd_ring: [Option<Frame>; WINDOW],
    outstanding: Option<Outstanding>,
    events: Vec<SessionEvent>,
}

impl<S, C> HostSession<S, C>
where
    S: SerialPort,
    C: Clock,
{
    /// Session for a gun peripheral, mirroring from the given magazine.
    pub fn gun(serial: S, clock: C, state: GunState) -> Self {
        Self::new(serial, clock, RoleMirror::Gun(HostGunState::new(state)))
    }

    /// Session for a vest peripheral.
    pub fn vest(serial: S, clock: C, state: VestState) -> Self {
        Self::new(serial, clock, RoleMirror::Vest(HostVestState::new(state)))
    }

    /// Session for the glove.
    pub fn hand(serial: S, clock: C) -> Self {
        Self::new(serial, clock, RoleMirror::Hand)
    }

    fn new(serial: S, clock: C, mirror: RoleMirror) -> Self {
        Self {
            serial,
            clock,
            mirror,
            deframer: Deframer::new(),
            phase: Phase::Idle,
            syn_sent_ms: 0,
            dev_expected: 0,
            echo_cache: [None; WINDOW],
            cmd_seq: 0,
            cmd_ring: [None; WINDOW],
            outstanding: None,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_established(&self) -> bool {
        self.phase == Phase::Established
    }

    /// The gun mirror state, for gun sessions.
    #[must_use]
    pub fn gun_state(&self) -> Option<GunState> {
        match &self.mirror {
            RoleMirror::Gun(gun) => Some(gun.state()),
            _ => None,
        }
    }

    /// The vest mirror state, for vest sessions.
    #[must_use]
    pub fn vest_state(&self) -> Option<VestState> {
        match &self.mirror {
            RoleMirror::Vest(vest) => Some(vest.state()),
            _ => None,
        }
    }

    /// Open (or reopen) the session: send SYN carrying the mirror state.
    ///
    /// Sequence counters restart from zero on both sides; the peripheral
    /// adopts the carried state when the handshake closes.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.phase = Phase::SynSent;
        self.syn_sent_ms = self.clock.now_ms();
        self.dev_expected = 0;
        self.echo_cache = [None; WINDOW];
        self.cmd_seq = 0;
        self.cmd_ring = [None; WINDOW];
        self.outstanding = None;
        self.deframer.clear();

        let (a, b) = self.mirror_wire_state();
        let syn = FrameBuilder::new(FrameType::Syn).state(a, b).build();
        info!(state = ?(a, b), "opening session");
        self.send(&syn)
    }

    /// Pump the serial port, run timers, and return what happened.
    pub fn poll(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let mut chunk = [0u8; FRAME_LEN];
        loop {
            let n = self.serial.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            let mut offset = 0;
            while offset < n {
                offset += self.deframer.push(&chunk[offset..n]);
                self.drain_frames()?;
            }
        }
        self.drain_frames()?;
        self.run_timers()?;
        Ok(std::mem::take(&mut self.events))
    }

    /// Command the gun to refill its magazine.
    pub fn send_reload(&mut self) -> Result<u8, SessionError> {
        let RoleMirror::Gun(gun) = &mut self.mirror else {
            return Err(SessionError::WrongRole);
        };
        if self.outstanding.is_some() {
            return Err(SessionError::Busy);
        }
        gun.reload();
        let full = GunState::default();
        self.send_command(FrameType::Reload, full.bullets, 0)
    }

    /// Overwrite the gun's magazine.
    pub fn send_update_gun(&mut self, bullets: u8) -> Result<u8, SessionError> {
        let RoleMirror::Gun(gun) = &mut self.mirror else {
            return Err(SessionError::WrongRole);
        };
        if self.outstanding.is_some() {
            return Err(SessionError::Busy);
        }
        gun.update(GunState { bullets });
        self.send_command(FrameType::UpdateState, bullets, 0)
    }

    /// Overwrite the vest's shield and health.
    pub fn send_update_vest(&mut self, shield: u8, health: u8) -> Result<u8, SessionError> {
        let RoleMirror::Vest(vest) = &mut self.mirror else {
            return Err(SessionError::WrongRole);
        };
        if self.outstanding.is_some() {
            return Err(SessionError::Busy);
        }
        vest.update(VestState { shield, health });
        self.send_command(FrameType::UpdateState, shield, health)
    }

    /// Refill the vest's shield, keeping health.
    pub fn refresh_shield(&mut self) -> Result<u8, SessionError> {
        let RoleMirror::Vest(vest) = &mut self.mirror else {
            return Err(SessionError::WrongRole);
        };
        if self.outstanding.is_some() {
            return Err(SessionError::Busy);
        }
        vest.refresh_shield();
        let target = VestState {
            shield: taglink_core::MAX_SHIELD,
            health: vest.state().health,
        };
        self.send_command(FrameType::UpdateState, target.shield, target.health)
    }

    fn send_command(&mut self, frame_type: FrameType, a: u8, b: u8) -> Result<u8, SessionError> {
        let seq = self.cmd_seq;
        let frame = FrameBuilder::new(frame_type).seq(seq).state(a, b).build();
        self.cmd_ring[slot(seq)] = Some(frame);
        self.outstanding = Some(Outstanding {
            seq,
            sent_ms: self.clock.now_ms(),
            resends: 0,
        });
        debug!(?frame_type, seq, state = ?(a, b), "sending command");
        self.send(&frame)?;
        Ok(seq)
    }

    fn drain_frames(&mut self) -> Result<(), SessionError> {
        loop {
            match self.deframer.next_frame() {
                Some(Ok(frame)) => self.handle_frame(&frame)?,
                Some(Err(_)) => {
                    // Corrupt bytes: the buffer is flushed, ask for the
                    // device frame we still expect.
                    if self.phase == Phase::Established {
                        warn!(expected = self.dev_expected, "corrupt frame, requesting resend");
                        let nak = FrameBuilder::new(FrameType::Nak)
                            .seq(self.dev_expected)
                            .build();
                        self.send(&nak)?;
                    }
                }
                None => return Ok(()),
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::SynSent => {
                if frame.frame_type == FrameType::Ack {
                    // Close the handshake; the device promotes on receipt.
                    let (a, b) = self.mirror_wire_state();
                    let ack = FrameBuilder::new(FrameType::Ack).state(a, b).build();
                    self.send(&ack)?;
                    self.phase = Phase::Established;
                    info!("session established");
                    self.events.push(SessionEvent::HandshakeComplete);
                }
                Ok(())
            }
            Phase::Established => self.handle_established(frame),
        }
    }

    fn handle_established(&mut self, frame: &Frame) -> Result<(), SessionError> {
        match frame.frame_type {
            FrameType::Imu => {
                self.events.push(SessionEvent::Imu(frame.imu_reading()));
                Ok(())
            }
            FrameType::GunShot | FrameType::VestShot => self.on_shot_report(frame),
            FrameType::Reload | FrameType::GunStateAck | FrameType::VestStateAck => {
                self.on_command_ack(frame);
                Ok(())
            }
            FrameType::Nak => self.on_nak(frame.seq),
            FrameType::Kill => {
                warn!("device ordered a reset");
                self.phase = Phase::Idle;
                self.events.push(SessionEvent::SessionDown);
                Ok(())
            }
            FrameType::Syn | FrameType::Ack | FrameType::UpdateState => Ok(()),
        }
    }

    fn on_shot_report(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let behind = self.dev_expected.wrapping_sub(frame.seq);
        if behind == 0 {
            let registered = self.register_shot(frame);
            // Echo regardless: the link-level acknowledgement is what stops
            // the peripheral's retransmissions.
            self.echo_cache[slot(frame.seq)] = Some(*frame);
            self.dev_expected = self.dev_expected.wrapping_add(1);
            self.send(frame)?;
            if !registered {
                debug!(seq = frame.seq, "shot echoed but not registered");
            }
            return Ok(());
        }
        if (1..=WINDOW as u8).contains(&behind) {
            if let Some(echo) = self.echo_cache[slot(frame.seq)] {
                if echo.seq == frame.seq {
                    debug!(seq = frame.seq, "duplicate shot report, replaying echo");
                    return self.send(&echo);
                }
            }
            return Ok(());
        }
        warn!(seq = frame.seq, expected = self.dev_expected, "shot report gap");
        let nak = FrameBuilder::new(FrameType::Nak).seq(self.dev_expected).build();
        self.send(&nak)
    }

    fn register_shot(&mut self, frame: &Frame) -> bool {
        match (&mut self.mirror, frame.frame_type) {
            (RoleMirror::Gun(gun), FrameType::GunShot) => {
                let reported = GunState::from_wire(frame.state_bytes());
                let ok = gun.use_bullet() && gun.apply(reported);
                if ok {
                    info!(bullets = reported.bullets, "gunshot registered");
                    self.events.push(SessionEvent::ShotRegistered(reported));
                }
                ok
            }
            (RoleMirror::Vest(vest), FrameType::VestShot) => {
                let reported = VestState::from_wire(frame.state_bytes());
                vest.apply_damage(HIT_DAMAGE);
                let ok = vest.apply(reported);
                if ok {
                    info!(
                        shield = reported.shield,
                        health = reported.health,
                        "vest hit registered"
                    );
                    self.events.push(SessionEvent::HitRegistered(reported));
                }
                ok
            }
            _ => {
                warn!(frame_type = ?frame.frame_type, "shot report from the wrong role");
                false
            }
        }
    }

    fn on_command_ack(&mut self, frame: &Frame) {
        let Some(outstanding) = self.outstanding else {
            debug!(seq = frame.seq, "late command ack");
            return;
        };
        if frame.seq != outstanding.seq {
            return;
        }
        let committed = match &mut self.mirror {
            RoleMirror::Gun(gun) => gun.apply(GunState::from_wire(frame.state_bytes())),
            RoleMirror::Vest(vest) => vest.apply(VestState::from_wire(frame.state_bytes())),
            RoleMirror::Hand => false,
        };
        if !committed {
            warn!(seq = frame.seq, "command ack did not match the staged state");
        }
        self.outstanding = None;
        self.cmd_seq = self.cmd_seq.wrapping_add(1);
        self.events.push(SessionEvent::CommandAcked { seq: frame.seq });
    }

    fn on_nak(&mut self, want: u8) -> Result<(), SessionError> {
        if let Some(cached) = self.cmd_ring[slot(want)] {
            if cached.seq == want {
                debug!(seq = want, "retransmitting command for NAK");
                return self.send(&cached);
            }
        }
        // Nothing left to serve: force a restart on both sides.
        warn!(seq = want, "NAK outside the command window, killing session");
        let kill = FrameBuilder::new(FrameType::Kill).build();
        self.send(&kill)?;
        self.phase = Phase::Idle;
        self.events.push(SessionEvent::SessionDown);
        Ok(())
    }

    fn run_timers(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        if self.phase == Phase::SynSent
            && now.saturating_sub(self.syn_sent_ms) >= HANDSHAKE_RETRY_MS
        {
            debug!("handshake timed out, resending SYN");
            self.syn_sent_ms = now;
            let (a, b) = self.mirror_wire_state();
            let syn = FrameBuilder::new(FrameType::Syn).state(a, b).build();
            self.send(&syn)?;
        }

        if self.phase != Phase::Established {
            return Ok(());
        }
        let Some(mut outstanding) = self.outstanding else {
            return Ok(());
        };
        if now.saturating_sub(outstanding.sent_ms) < COMMAND_TIMEOUT_MS {
            return Ok(());
        }
        if outstanding.resends < MAX_COMMAND_RESEND {
            outstanding.resends += 1;
            outstanding.sent_ms = now;
            self.outstanding = Some(outstanding);
            if let Some(frame) = self.cmd_ring[slot(outstanding.seq)] {
                debug!(seq = outstanding.seq, attempt = outstanding.resends, "retransmitting command");
                self.send(&frame)?;
            }
            return Ok(());
        }
        warn!(seq = outstanding.seq, "command abandoned");
        match &mut self.mirror {
            RoleMirror::Gun(gun) => gun.discard(),
            RoleMirror::Vest(vest) => vest.discard(),
            RoleMirror::Hand => {}
        }
        self.outstanding = None;
        self.events.push(SessionEvent::CommandLost { seq: outstanding.seq });
        Ok(())
    }

    fn mirror_wire_state(&self) -> (u8, u8) {
        match &self.mirror {
            RoleMirror::Gun(gun) => (gun.state().bullets, 0),
            RoleMirror::Vest(vest) => (vest.state().shield, vest.state().health),
            RoleMirror::Hand => (0, 0),
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<(), SessionError> {
        self.serial.write_all(&frame.encode())?;
        Ok(())
    }
}

const fn slot(seq: u8) -> usize {
    (seq % WINDOW as u8) as usize
}

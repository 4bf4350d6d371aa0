//! Shared rigs for the end-to-end tests: a real peripheral on one end of
//! an in-memory pipe, with either raw frame access or a full host session
//! on the other.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use taglink_core::{Color, Gun, ImuCalibration, ImuSample, Vest, MAG_SIZE};
use taglink_host::pipe::{pipe_pair, ManualClock, PipeEnd};
use taglink_host::sim::{ir_channel, ChannelEmitter, ChannelReceiver, PixelStrip, ScriptedImu, ScriptedTrigger};
use taglink_proto::{Deframer, Frame, FrameBuilder, FrameType, FRAME_LEN};

pub type TestGun = Gun<PipeEnd, ManualClock, ScriptedTrigger, ScriptedImu, ChannelEmitter, PixelStrip>;
pub type TestVest = Vest<PipeEnd, ManualClock, ChannelReceiver, PixelStrip>;

/// A gun peripheral with the host side held as a raw pipe end.
pub struct GunRig {
    pub gun: TestGun,
    pub clock: ManualClock,
    pub trigger: Rc<Cell<bool>>,
    pub host_end: PipeEnd,
    pub pixels: Rc<RefCell<Vec<Color>>>,
}

impl GunRig {
    pub fn new() -> Self {
        let (dev_end, host_end) = pipe_pair();
        let clock = ManualClock::new();
        let (trigger, trigger_level) = ScriptedTrigger::new();
        let (imu, _motion) = ScriptedImu::new(ImuSample::default());
        let (muzzle, _air) = ir_channel();
        let (leds, pixels) = PixelStrip::new(MAG_SIZE as usize);
        let gun = Gun::new(
            dev_end,
            clock.clone(),
            trigger,
            imu,
            muzzle,
            leds,
            ImuCalibration::default(),
        );
        Self {
            gun,
            clock,
            trigger: trigger_level,
            host_end,
            pixels,
        }
    }

    /// Run the raw handshake: SYN carrying `bullets`, consume the device
    /// ACK, close with the host ACK.
    pub fn establish(&mut self, bullets: u8) {
        write_frame(
            &mut self.host_end,
            &FrameBuilder::new(FrameType::Syn).state(bullets, 0).build(),
        );
        self.gun.poll().unwrap();
        let ack = read_frames(&mut self.host_end);
        assert_eq!(ack.len(), 1);
        assert_eq!(ack[0].frame_type, FrameType::Ack);
        write_frame(&mut self.host_end, &FrameBuilder::new(FrameType::Ack).build());
        self.gun.poll().unwrap();
        assert!(self.gun.has_handshake());
        read_frames(&mut self.host_end);
    }

    /// A full press-and-release cycle, held past the debounce window on
    /// both edges, polling each simulated millisecond.
    pub fn press_trigger(&mut self) {
        self.trigger.set(true);
        for _ in 0..=60 {
            self.gun.poll().unwrap();
            self.clock.advance(1);
        }
        self.trigger.set(false);
        for _ in 0..=60 {
            self.gun.poll().unwrap();
            self.clock.advance(1);
        }
    }

    /// Drain device traffic and return only the sequence-carrying frames.
    pub fn data_frames(&mut self) -> Vec<Frame> {
        read_frames(&mut self.host_end)
            .into_iter()
            .filter(|f| f.frame_type != FrameType::Imu)
            .collect()
    }

    pub fn poll_for(&mut self, ms: u64) {
        for _ in 0..ms {
            self.gun.poll().unwrap();
            self.clock.advance(1);
        }
    }
}

/// A vest peripheral with the host side held as a raw pipe end.
pub struct VestRig {
    pub vest: TestVest,
    pub clock: ManualClock,
    pub air: Rc<RefCell<VecDeque<u32>>>,
    pub host_end: PipeEnd,
    pub pixels: Rc<RefCell<Vec<Color>>>,
}

impl VestRig {
    pub fn new() -> Self {
        let (dev_end, host_end) = pipe_pair();
        let clock = ManualClock::new();
        let eye = ChannelReceiver::detached();
        let air = eye.handle();
        let (leds, pixels) = PixelStrip::new(10);
        let vest = Vest::new(dev_end, clock.clone(), eye, leds);
        Self {
            vest,
            clock,
            air,
            host_end,
            pixels,
        }
    }

    /// One decoded gun burst arriving at the receiver.
    pub fn hit(&mut self) {
        self.air
            .borrow_mut()
            .push_back(taglink_core::vest::VEST_HIT_COMMAND);
        self.vest.poll().unwrap();
    }

    pub fn establish(&mut self, shield: u8, health: u8) {
        write_frame(
            &mut self.host_end,
            &FrameBuilder::new(FrameType::Syn).state(shield, health).build(),
        );
        self.vest.poll().unwrap();
        let ack = read_frames(&mut self.host_end);
        assert_eq!(ack.len(), 1);
        assert_eq!(ack[0].frame_type, FrameType::Ack);
        assert_eq!(ack[0].state_bytes(), (shield, health));
        write_frame(&mut self.host_end, &FrameBuilder::new(FrameType::Ack).build());
        self.vest.poll().unwrap();
        assert!(self.vest.has_handshake());
        read_frames(&mut self.host_end);
    }

    pub fn data_frames(&mut self) -> Vec<Frame> {
        read_frames(&mut self.host_end)
    }
}

/// Read and decode every complete frame waiting on a pipe end.
pub fn read_frames(end: &mut PipeEnd) -> Vec<Frame> {
    use taglink_core::SerialPort;

    let mut deframer = Deframer::new();
    let mut chunk = [0u8; FRAME_LEN];
    let mut frames = Vec::new();
    loop {
        let n = end.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        deframer.push(&chunk[..n]);
        while let Some(result) = deframer.next_frame() {
            frames.push(result.expect("corrupt frame from peripheral"));
        }
    }
    frames
}

pub fn write_frame(end: &mut PipeEnd, frame: &Frame) {
    use taglink_core::SerialPort;
    end.write_all(&frame.encode()).unwrap();
}

pub fn write_bytes(end: &mut PipeEnd, bytes: &[u8]) {
    use taglink_core::SerialPort;
    end.write_all(bytes).unwrap();
}

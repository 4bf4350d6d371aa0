//! Scripted device ports for simulation and integration tests.
//!
//! These implement the peripheral capability traits over shared handles so
//! a test (or the `linksim` binary) can press the trigger, shine IR at the
//! vest, shake the glove, and watch the LED strips - all in-process.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use taglink_core::gun::GUN_IR_CODE;
use taglink_core::vest::VEST_HIT_COMMAND;
use taglink_core::{Color, ImuError, ImuSample, ImuSensor, IrEmitter, IrReceiver, LedStrip, Trigger};

/// Trigger switch controlled through a shared handle.
pub struct ScriptedTrigger(Rc<Cell<bool>>);

impl ScriptedTrigger {
    /// Returns the port and the handle that sets the raw level.
    #[must_use]
    pub fn new() -> (Self, Rc<Cell<bool>>) {
        let level = Rc::new(Cell::new(false));
        (Self(Rc::clone(&level)), level)
    }
}

impl Trigger for ScriptedTrigger {
    fn is_pressed(&mut self) -> bool {
        self.0.get()
    }
}

/// An optical channel between a muzzle emitter and a vest receiver.
///
/// Bursts sent by the emitter end appear, demodulated to their NEC command
/// byte, at the receiver end - the way a real receiver module hands the
/// firmware a decoded command rather than raw marks and spaces.
#[must_use]
pub fn ir_channel() -> (ChannelEmitter, ChannelReceiver) {
    let air: Rc<RefCell<VecDeque<u32>>> = Rc::new(RefCell::new(VecDeque::new()));
    (
        ChannelEmitter(Rc::clone(&air)),
        ChannelReceiver(air),
    )
}

/// Emitter end of an [`ir_channel`].
pub struct ChannelEmitter(Rc<RefCell<VecDeque<u32>>>);

impl IrEmitter for ChannelEmitter {
    fn send_nec(&mut self, code: u32, _bits: u8) {
        let command = if code == GUN_IR_CODE {
            VEST_HIT_COMMAND
        } else {
            code & 0xFF
        };
        self.0.borrow_mut().push_back(command);
    }
}

/// Receiver end of an [`ir_channel`]. Also usable standalone with
/// [`ChannelReceiver::inject`] for hits from an unmodelled opponent.
pub struct ChannelReceiver(Rc<RefCell<VecDeque<u32>>>);

impl ChannelReceiver {
    /// A receiver with nothing on the air yet.
    #[must_use]
    pub fn detached() -> Self {
        Self(Rc::new(RefCell::new(VecDeque::new())))
    }

    /// Put a decoded command on the air.
    pub fn inject(&self, command: u32) {
        self.0.borrow_mut().push_back(command);
    }

    /// A handle for injecting from elsewhere.
    #[must_use]
    pub fn handle(&self) -> Rc<RefCell<VecDeque<u32>>> {
        Rc::clone(&self.0)
    }
}

impl IrReceiver for ChannelReceiver {
    fn decode(&mut self) -> Option<u32> {
        self.0.borrow_mut().pop_front()
    }
}

/// Inertial sensor fed through a shared handle.
pub struct ScriptedImu(Rc<RefCell<ImuSample>>);

impl ScriptedImu {
    #[must_use]
    pub fn new(initial: ImuSample) -> (Self, Rc<RefCell<ImuSample>>) {
        let sample = Rc::new(RefCell::new(initial));
        (Self(Rc::clone(&sample)), sample)
    }
}

impl ImuSensor for ScriptedImu {
    fn read(&mut self) -> Result<ImuSample, ImuError> {
        Ok(*self.0.borrow())
    }
}

/// LED strip whose latched pixels can be inspected.
pub struct PixelStrip {
    staged: Vec<Color>,
    shown: Rc<RefCell<Vec<Color>>>,
}

impl PixelStrip {
    #[must_use]
    pub fn new(len: usize) -> (Self, Rc<RefCell<Vec<Color>>>) {
        let shown = Rc::new(RefCell::new(vec![Color::OFF; len]));
        (
            Self {
                staged: vec![Color::OFF; len],
                shown: Rc::clone(&shown),
            },
            shown,
        )
    }

    /// How many latched pixels are lit at all.
    #[must_use]
    pub fn lit_count(shown: &Rc<RefCell<Vec<Color>>>) -> usize {
        shown.borrow().iter().filter(|c| **c != Color::OFF).count()
    }
}

impl LedStrip for PixelStrip {
    fn set_pixel(&mut self, index: usize, color: Color) {
        if let Some(pixel) = self.staged.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) {
        self.shown.borrow_mut().clone_from(&self.staged);
    }
}

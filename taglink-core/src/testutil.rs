//! Shared mock ports for the role peripheral tests.

extern crate std;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use taglink_proto::{Frame, FRAME_LEN};

use crate::ports::{
    Clock, Color, ImuError, ImuSample, ImuSensor, IrEmitter, IrReceiver, LedStrip, SerialError,
    SerialPort, Trigger,
};

/// Serial port backed by two shared byte queues.
pub(crate) struct MockSerial {
    pub incoming: Rc<RefCell<VecDeque<u8>>>,
    pub outgoing: Rc<RefCell<Vec<u8>>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            incoming: Rc::new(RefCell::new(VecDeque::new())),
            outgoing: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Clones of the queue handles for the test to feed and inspect.
    pub fn handles(&self) -> (Rc<RefCell<VecDeque<u8>>>, Rc<RefCell<Vec<u8>>>) {
        (Rc::clone(&self.incoming), Rc::clone(&self.outgoing))
    }
}

impl SerialPort for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut incoming = self.incoming.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match incoming.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.outgoing.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

/// Feed a frame into an incoming queue as wire bytes.
pub(crate) fn inject(incoming: &Rc<RefCell<VecDeque<u8>>>, frame: &Frame) {
    incoming.borrow_mut().extend(frame.encode());
}

/// Decode and drain every complete frame written so far.
pub(crate) fn drain_frames(outgoing: &Rc<RefCell<Vec<u8>>>) -> Vec<Frame> {
    let mut bytes = outgoing.borrow_mut();
    let mut frames = Vec::new();
    for chunk in bytes.chunks_exact(FRAME_LEN) {
        let mut raw = [0u8; FRAME_LEN];
        raw.copy_from_slice(chunk);
        frames.push(Frame::decode(&raw).expect("peripheral emitted a corrupt frame"));
    }
    let leftover = bytes.len() % FRAME_LEN;
    assert_eq!(leftover, 0, "partial frame on the wire");
    bytes.clear();
    frames
}

/// Manually advanced millisecond clock.
#[derive(Clone)]
pub(crate) struct MockClock(pub Rc<Cell<u64>>);

impl MockClock {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(0)))
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Trigger level controlled by the test.
pub(crate) struct MockTrigger(pub Rc<Cell<bool>>);

impl MockTrigger {
    pub fn new() -> (Self, Rc<Cell<bool>>) {
        let level = Rc::new(Cell::new(false));
        (Self(Rc::clone(&level)), level)
    }
}

impl Trigger for MockTrigger {
    fn is_pressed(&mut self) -> bool {
        self.0.get()
    }
}

/// Inertial sensor returning a configurable sample.
pub(crate) struct MockImu(pub Rc<RefCell<Result<ImuSample, ImuError>>>);

impl MockImu {
    pub fn new(sample: ImuSample) -> Self {
        Self(Rc::new(RefCell::new(Ok(sample))))
    }
}

impl ImuSensor for MockImu {
    fn read(&mut self) -> Result<ImuSample, ImuError> {
        *self.0.borrow()
    }
}

/// IR receiver fed from a queue of decoded commands.
pub(crate) struct MockIrReceiver(pub Rc<RefCell<VecDeque<u32>>>);

impl MockIrReceiver {
    pub fn new() -> (Self, Rc<RefCell<VecDeque<u32>>>) {
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        (Self(Rc::clone(&queue)), queue)
    }
}

impl IrReceiver for MockIrReceiver {
    fn decode(&mut self) -> Option<u32> {
        self.0.borrow_mut().pop_front()
    }
}

/// IR emitter recording every burst.
pub(crate) struct MockIrEmitter(pub Rc<RefCell<Vec<(u32, u8)>>>);

impl MockIrEmitter {
    pub fn new() -> (Self, Rc<RefCell<Vec<(u32, u8)>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        (Self(Rc::clone(&sent)), sent)
    }
}

impl IrEmitter for MockIrEmitter {
    fn send_nec(&mut self, code: u32, bits: u8) {
        self.0.borrow_mut().push((code, bits));
    }
}

/// LED strip recording latched pixel values.
pub(crate) struct MockLedStrip {
    staged: Vec<Color>,
    pub shown: Rc<RefCell<Vec<Color>>>,
}

impl MockLedStrip {
    pub fn new(len: usize) -> (Self, Rc<RefCell<Vec<Color>>>) {
        let shown = Rc::new(RefCell::new(std::vec![Color::OFF; len]));
        (
            Self {
                staged: std::vec![Color::OFF; len],
                shown: Rc::clone(&shown),
            },
            shown,
        )
    }
}

impl LedStrip for MockLedStrip {
    fn set_pixel(&mut self, index: usize, color: Color) {
        if let Some(pixel) = self.staged.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) {
        self.shown.borrow_mut().clone_from(&self.staged);
    }
}

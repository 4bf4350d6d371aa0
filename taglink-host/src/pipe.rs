//! In-memory serial plumbing for tests and the simulator.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use taglink_core::{Clock, SerialError, SerialPort};

type ByteQueue = Rc<RefCell<VecDeque<u8>>>;

/// One end of an in-memory duplex byte pipe.
pub struct PipeEnd {
    rx: ByteQueue,
    tx: ByteQueue,
}

/// Create a connected pair of serial endpoints.
#[must_use]
pub fn pipe_pair() -> (PipeEnd, PipeEnd) {
    let a_to_b: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
    (
        PipeEnd {
            rx: Rc::clone(&b_to_a),
            tx: Rc::clone(&a_to_b),
        },
        PipeEnd {
            rx: a_to_b,
            tx: b_to_a,
        },
    )
}

impl SerialPort for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut rx = self.rx.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match rx.pop_front() {
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
        self.tx.borrow_mut().extend(bytes);
        Ok(())
    }
}

/// A serial endpoint that loses and mangles outbound bytes with seeded,
/// reproducible randomness. Reads pass through untouched, so impairment is
/// per-direction: wrap the end whose transmissions should suffer.
pub struct LossyLink {
    inner: PipeEnd,
    rng: ChaCha8Rng,
    drop_prob: f64,
    flip_prob: f64,
}

impl LossyLink {
    #[must_use]
    pub fn new(inner: PipeEnd, seed: u64, drop_prob: f64, flip_prob: f64) -> Self {
        Self {
            inner,
            rng: ChaCha8Rng::seed_from_u64(seed),
            drop_prob,
            flip_prob,
        }
    }
}

impl SerialPort for LossyLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.inner.read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        for &byte in bytes {
            if self.rng.gen_bool(self.drop_prob) {
                continue;
            }
            let byte = if self.rng.gen_bool(self.flip_prob) {
                byte ^ (1 << self.rng.gen_range(0..8))
            } else {
                byte
            };
            self.inner.write_all(&[byte])?;
        }
        Ok(())
    }
}

/// Manually advanced millisecond clock shared by every party of a
/// simulation.
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

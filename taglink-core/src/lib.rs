//! Peripheral-side logic for the taglink rig.
//!
//! Each of the three wearable peripherals - gun, vest, glove - runs one
//! single-threaded cooperative loop built from the pieces in this crate:
//!
//! - [`ports`] - capability traits the board support package implements
//!   (serial link, clock, trigger, inertial sensor, IR, LED strip)
//! - [`pending`] - the pending/canonical state split that keeps a
//!   peripheral convergent with the host across lost acknowledgements
//! - [`state`] - role state types and the damage/magazine arithmetic
//! - [`link`] - handshake controller and sequence engine, as one sans-I/O
//!   state machine shared by every role
//! - [`gun`], [`vest`], [`hand`] - the role peripherals themselves
//!
//! A board crate constructs a role peripheral from its port
//! implementations and calls [`poll`](gun::Gun::poll) once per scheduler
//! tick; everything else - framing, retransmission, duplicate
//! suppression, LED redraws - happens inside.
//!
//! # No-std support
//!
//! `#![no_std]` by default, no heap allocation. The `std` feature exists
//! for host-side consumers; `defmt` adds formatting impls for embedded
//! logging.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod debounce;
pub mod gun;
pub mod hand;
pub mod imu;
pub mod link;
pub mod pending;
pub mod ports;
pub mod state;
pub mod vest;

#[cfg(test)]
mod testutil;

pub use debounce::{Debouncer, DEBOUNCE_MS};
pub use gun::Gun;
pub use hand::Hand;
pub use vest::Vest;
pub use imu::{ImuCadence, ImuCalibration, IMU_INTERVAL_MS};
pub use link::{Link, LinkEvent, LinkOutput, MAX_RESEND, RESPONSE_TIMEOUT_MS, TX_RING_DEPTH};
pub use pending::Pending;
pub use ports::{
    Clock, Color, ImuError, ImuSample, ImuSensor, IrEmitter, IrReceiver, LedStrip,
    PeripheralError, SerialError, SerialPort, Trigger,
};
pub use state::{
    GunState, HandState, Role, VestState, HIT_DAMAGE, MAG_SIZE, MAX_HEALTH, MAX_SHIELD,
};

//! Relay-host side of the taglink link layer.
//!
//! A player's relay laptop runs one [`HostSession`] per worn peripheral.
//! The session drives the handshake, echoes shot reports, issues
//! authoritative state commands with retransmission, and keeps a mirror of
//! the peripheral's game state under the same pending/apply discipline the
//! peripherals use - so a shot is counted exactly once on each side no
//! matter what the radio bridge loses or mangles.
//!
//! The crate also carries the player/device binding config
//! ([`config::BindingConfig`]), in-memory serial [`pipe`]s, and the
//! scripted device ports the `linksim` binary and the integration tests
//! share ([`sim`]).

pub mod config;
pub mod game;
pub mod pipe;
pub mod session;
pub mod sim;

pub use config::BindingConfig;
pub use game::{HostGunState, HostVestState};
pub use pipe::{pipe_pair, LossyLink, ManualClock, PipeEnd};
pub use session::{HostSession, SessionError, SessionEvent};

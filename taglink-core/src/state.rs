//! Role state types and the arithmetic the link carries.

use taglink_proto::{Frame, FrameType};

/// Magazine capacity of the gun.
pub const MAG_SIZE: u8 = 6;

/// Maximum shield points the vest tracks.
pub const MAX_SHIELD: u8 = 30;

/// Maximum (and respawn) health.
pub const MAX_HEALTH: u8 = 100;

/// Damage dealt by one IR hit.
pub const HIT_DAMAGE: u8 = 5;

/// Binds a role's state type to its wire representation and frame types.
///
/// The same link engine serves all three peripherals; only the payload
/// semantics differ, and they differ exactly along this trait.
pub trait Role: Copy + PartialEq + Default {
    /// Frame type of the self-originated, sequence-tracked event
    /// (`GunShot` / `VestShot`), if the role has one.
    const SHOT: Option<FrameType>;

    /// The two role-state payload bytes.
    fn to_wire(self) -> (u8, u8);

    /// Rebuild state from the two payload bytes, clamped to the role's
    /// legal range.
    fn from_wire(bytes: (u8, u8)) -> Self;

    /// Interpret an in-order host command frame. Returns the new state and
    /// the frame type of the acknowledgement, or `None` when the role does
    /// not consume this frame type.
    fn apply_command(self, frame: &Frame) -> Option<(Self, FrameType)>;
}

/// Gun-side state: the magazine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GunState {
    pub bullets: u8,
}

impl GunState {
    /// Spend one bullet, or `None` on an empty magazine.
    #[must_use]
    pub fn spend_bullet(self) -> Option<Self> {
        if self.bullets == 0 {
            return None;
        }
        Some(Self {
            bullets: self.bullets - 1,
        })
    }
}

impl Default for GunState {
    fn default() -> Self {
        Self { bullets: MAG_SIZE }
    }
}

impl Role for GunState {
    const SHOT: Option<FrameType> = Some(FrameType::GunShot);

    fn to_wire(self) -> (u8, u8) {
        (self.bullets, 0)
    }

    fn from_wire(bytes: (u8, u8)) -> Self {
        Self {
            bullets: bytes.0.min(MAG_SIZE),
        }
    }

    fn apply_command(self, frame: &Frame) -> Option<(Self, FrameType)> {
        match frame.frame_type {
            FrameType::Reload => Some((Self { bullets: MAG_SIZE }, FrameType::Reload)),
            FrameType::UpdateState => Some((
                Self::from_wire(frame.state_bytes()),
                FrameType::GunStateAck,
            )),
            _ => None,
        }
    }
}

/// Vest-side state: shield and health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VestState {
    pub shield: u8,
    pub health: u8,
}

impl VestState {
    /// Apply one hit. Shield absorbs damage first; when health would reach
    /// zero or below, the vest snaps to a fresh respawn display
    /// (shield 0, health 100) - whether the player actually respawns is
    /// the host's call.
    #[must_use]
    pub fn apply_damage(self, damage: u8) -> Self {
        if self.shield >= damage {
            return Self {
                shield: self.shield - damage,
                ..self
            };
        }
        let spill = damage - self.shield;
        if self.health <= spill {
            return Self {
                shield: 0,
                health: MAX_HEALTH,
            };
        }
        Self {
            shield: 0,
            health: self.health - spill,
        }
    }
}

impl Default for VestState {
    fn default() -> Self {
        Self {
            shield: 0,
            health: MAX_HEALTH,
        }
    }
}

impl Role for VestState {
    const SHOT: Option<FrameType> = Some(FrameType::VestShot);

    fn to_wire(self) -> (u8, u8) {
        (self.shield, self.health)
    }

    fn from_wire(bytes: (u8, u8)) -> Self {
        Self {
            shield: bytes.0.min(MAX_SHIELD),
            health: bytes.1.min(MAX_HEALTH),
        }
    }

    fn apply_command(self, frame: &Frame) -> Option<(Self, FrameType)> {
        match frame.frame_type {
            FrameType::UpdateState => Some((
                Self::from_wire(frame.state_bytes()),
                FrameType::VestStateAck,
            )),
            _ => None,
        }
    }
}

/// Glove-side state: nothing beyond the session itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandState;

impl Role for HandState {
    const SHOT: Option<FrameType> = None;

    fn to_wire(self) -> (u8, u8) {
        (0, 0)
    }

    fn from_wire(_bytes: (u8, u8)) -> Self {
        Self
    }

    fn apply_command(self, _frame: &Frame) -> Option<(Self, FrameType)> {
        None
    }
}

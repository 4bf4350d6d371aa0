//! Host-side mirror of peripheral game state.
//!
//! The relay keeps its own copy of each peripheral's state and runs the
//! same pending/apply discipline: an expected outcome is staged first
//! (`use_bullet`, `apply_damage`, a command's target value) and committed
//! only when the peripheral's report matches it. A report that does not
//! match the staged expectation is rejected and logged - the peripheral's
//! canonical state is never silently adopted.

use tracing::warn;

use taglink_core::{GunState, VestState, MAX_SHIELD};

/// Gun mirror: the magazine the host believes the gun has.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostGunState {
    state: GunState,
    pending: Option<GunState>,
}

impl HostGunState {
    #[must_use]
    pub fn new(state: GunState) -> Self {
        Self {
            state,
            pending: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> GunState {
        self.state
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Stage an absolute target (an UPDATE_STATE command).
    pub fn update(&mut self, new: GunState) {
        self.pending = Some(new);
    }

    /// Stage the outcome of one trigger pull. Returns `false` on an empty
    /// magazine.
    pub fn use_bullet(&mut self) -> bool {
        match self.state.spend_bullet() {
            Some(after) => {
                self.pending = Some(after);
                true
            }
            None => {
                warn!("shot reported with an empty magazine");
                false
            }
        }
    }

    /// Stage a full magazine (a RELOAD command).
    pub fn reload(&mut self) {
        self.pending = Some(GunState::default());
    }

    /// Commit the staged value if the peripheral reported exactly it.
    pub fn apply(&mut self, reported: GunState) -> bool {
        let Some(pending) = self.pending else {
            warn!(?reported, "gun report with nothing staged");
            return false;
        };
        if pending != reported {
            warn!(?reported, expected = ?pending, "gun report does not match staged state");
            return false;
        }
        self.state = pending;
        self.pending = None;
        true
    }

    /// Drop the staged value (an abandoned command).
    pub fn discard(&mut self) {
        self.pending = None;
    }
}

/// Vest mirror: shield and health the host believes the vest shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostVestState {
    state: VestState,
    pending: Option<VestState>,
}

impl HostVestState {
    #[must_use]
    pub fn new(state: VestState) -> Self {
        Self {
            state,
            pending: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> VestState {
        self.state
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Stage an absolute target (an UPDATE_STATE command).
    pub fn update(&mut self, new: VestState) {
        self.pending = Some(new);
    }

    /// Stage the outcome of one hit, shield first, with the respawn snap.
    pub fn apply_damage(&mut self, damage: u8) {
        self.pending = Some(self.state.apply_damage(damage));
    }

    /// Stage a shield refresh to full.
    pub fn refresh_shield(&mut self) {
        self.pending = Some(VestState {
            shield: MAX_SHIELD,
            health: self.state.health,
        });
    }

    /// Commit the staged value if the peripheral reported exactly it.
    pub fn apply(&mut self, reported: VestState) -> bool {
        let Some(pending) = self.pending else {
            warn!(?reported, "vest report with nothing staged");
            return false;
        };
        if reported.health == 0 {
            // The peripheral never shows a dead player; a zero here means
            // the peer is confused. Stage a respawn instead of adopting it.
            warn!("vest reported zero health, staging respawn");
            self.pending = Some(VestState::default());
            return false;
        }
        if pending != reported {
            warn!(?reported, expected = ?pending, "vest report does not match staged state");
            return false;
        }
        self.state = pending;
        self.pending = None;
        true
    }

    /// Drop the staged value (an abandoned command).
    pub fn discard(&mut self) {
        self.pending = None;
    }
}

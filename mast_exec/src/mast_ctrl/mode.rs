//! Operating mode state machine of the mast
//!
//! The mast is always in one of four modes. STOWAGE and NAVIGATION lock every joint, ACTIVE
//! unlocks every joint and SCAN unlocks only the scan leader and follower. Entering a mode first
//! drives the joints to the posture of that mode, the mode is only changed once they are there.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{JointId, MastConfig, MastMode};
use log::{error, info, warn};
use std::collections::BTreeSet;

use super::{lock, JointRegistry, JointState, MastCtrl, MastError, ScanCoupling, ScanParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The set of joints a mode allows to be moved.
///
/// Joint targets are only accepted by the [`JointRegistry`] together with a permit, which can
/// only be obtained through [`ModeUnlocks::unlocks`] or a mode transition.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPermit {
    mode: MastMode,
    unlocked: BTreeSet<JointId>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

pub trait ModeUnlocks {
    /// Get the permit of joints unlocked by this mode.
    fn unlocks(&self, joints: &[JointId], scan: &ScanParams) -> MotionPermit;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModeUnlocks for MastMode {
    fn unlocks(&self, joints: &[JointId], scan: &ScanParams) -> MotionPermit {
        let unlocked = match self {
            MastMode::Stowage | MastMode::Navigation => BTreeSet::new(),
            MastMode::Active => joints.iter().copied().collect(),
            MastMode::Scan => [scan.leader, scan.follower]
                .iter()
                .copied()
                .filter(|id| joints.contains(id))
                .collect(),
        };

        MotionPermit {
            mode: *self,
            unlocked,
        }
    }
}

impl MotionPermit {
    /// Permit used while driving the joints into the posture of `target`.
    fn transition(target: MastMode, targets: &MastConfig) -> Self {
        Self {
            mode: target,
            unlocked: targets.iter().map(|(id, _)| id).collect(),
        }
    }

    pub fn mode(&self) -> MastMode {
        self.mode
    }

    pub fn allows(&self, id: JointId) -> bool {
        self.unlocked.contains(&id)
    }

    pub fn is_locked(&self) -> bool {
        self.unlocked.is_empty()
    }
}

impl MastCtrl {
    /// Get the current operating mode.
    pub fn get_mode(&self) -> MastMode {
        *lock(&self.mode)
    }

    /// Permit of the current mode.
    pub(crate) fn permit(&self) -> MotionPermit {
        let ids = self.registry().ids();
        self.get_mode().unlocks(&ids, &self.params.scan)
    }

    /// Change the operating mode.
    ///
    /// The joints required by `target` are driven to its posture before the mode changes. If
    /// this fails the mode is left unchanged.
    pub fn set_mode(&self, target: MastMode) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;

        let current = self.get_mode();
        info!("Changing mode from {} to {}", current, target);

        let (targets, previous_coupling) = {
            let reg = self.registry();
            let targets = self.transition_targets(target, &reg);

            for (id, _) in targets.iter() {
                let state = reg.state(id)?;
                if state == JointState::Halted || state == JointState::Faulted {
                    warn!("Rejecting change to {} mode, {} is {}", target, id, state);
                    return Err(MastError::ModeTransition {
                        target,
                        reason: format!("{} is {}", id, state),
                    });
                }
            }

            (targets, reg.coupling())
        };

        let start_seq = self.halt_seq();

        // Joints move independently while homing
        self.registry().set_coupling(None);

        let result = {
            let plan = {
                let reg = self.registry();
                let pending = reg.pending(&targets, self.params.settle_tolerance_rad);
                reg.plan(&MotionPermit::transition(target, &targets), &pending)
            };
            plan.and_then(|p| self.execute_move(&p))
        };

        if let Err(e) = result {
            self.registry().set_coupling(previous_coupling);

            if self.halted_since(start_seq) {
                warn!("Change to {} mode aborted by a halt", target);
                return Err(MastError::HaltedAbort);
            }

            error!("Could not drive the mast into {} mode: {}", target, e);
            return Err(MastError::TransitionFailed {
                target,
                source: Box::new(e),
            });
        }

        if target == MastMode::Scan {
            let mut reg = self.registry();
            reg.set_coupling(Some(ScanCoupling {
                leader: self.params.scan.leader,
                follower: self.params.scan.follower,
                offset_rad: 0.0,
            }));
            reg.refresh_coupling();
        }

        *lock(&self.mode) = target;
        info!("Mast in {} mode", target);

        Ok(())
    }

    /// Joint targets of the posture of a mode.
    fn transition_targets(&self, target: MastMode, reg: &JointRegistry) -> MastConfig {
        match target {
            MastMode::Stowage | MastMode::Active => reg.home_config(),
            MastMode::Navigation => reg.nav_config(),
            MastMode::Scan => reg
                .home_config()
                .iter()
                .filter(|(id, _)| *id == self.params.scan.leader || *id == self.params.scan.follower)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

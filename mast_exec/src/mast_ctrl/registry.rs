//! Joint registry, the single source of truth for the configuration and state of every joint

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{JointId, JointParams, MastConfig};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Joint, JointConfig, JointEvent, JointState, MastError, MotionPermit};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Registry of all joints of the mast.
#[derive(Debug, Clone)]
pub struct JointRegistry {
    joints: BTreeMap<JointId, Joint>,

    coupling: Option<ScanCoupling>,
}

/// Coupling of two joints, the follower keeping a constant offset to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanCoupling {
    pub leader: JointId,

    pub follower: JointId,

    /// Follower position minus leader position.
    ///
    /// Units: radians
    pub offset_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointRegistry {
    /// Create the registry from the joint configurations, every joint starting idle at home.
    pub fn new(configs: &[JointConfig]) -> Result<Self, MastError> {
        let mut joints = BTreeMap::new();

        for config in configs {
            config
                .limits
                .check()
                .map_err(|e| MastError::InvalidParams(config.id, e))?;

            if let Some(nav) = config.pos_nav_rad {
                if !config.limits.in_range(nav) {
                    return Err(MastError::InvalidParams(
                        config.id,
                        "navigation position must lie within the position limits",
                    ));
                }
            }

            if joints.insert(config.id, Joint::new(config)).is_some() {
                return Err(MastError::InvalidParams(config.id, "joint is defined twice"));
            }
        }

        Ok(Self {
            joints,
            coupling: None,
        })
    }

    pub fn ids(&self) -> Vec<JointId> {
        self.joints.keys().copied().collect()
    }

    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    pub fn joint(&self, id: JointId) -> Result<&Joint, MastError> {
        self.joints.get(&id).ok_or(MastError::UnknownJoint(id))
    }

    pub(crate) fn joint_mut(&mut self, id: JointId) -> Result<&mut Joint, MastError> {
        self.joints.get_mut(&id).ok_or(MastError::UnknownJoint(id))
    }

    pub fn params(&self, id: JointId) -> Result<JointParams, MastError> {
        Ok(self.joint(id)?.params)
    }

    /// Replace the limits of a joint.
    pub fn set_params(&mut self, id: JointId, params: JointParams) -> Result<(), MastError> {
        let joint = self.joint_mut(id)?;
        params.check().map_err(|e| MastError::InvalidParams(id, e))?;

        if !params.in_range(joint.value_rad) {
            warn!(
                "{} is currently at {} rad which is outside of its new limits",
                id, joint.value_rad
            );
        }

        joint.params = params;
        debug!("New parameters for {}: {:?}", id, params);

        Ok(())
    }

    pub fn value(&self, id: JointId) -> Result<f64, MastError> {
        Ok(self.joint(id)?.value_rad)
    }

    pub fn state(&self, id: JointId) -> Result<JointState, MastError> {
        Ok(self.joint(id)?.state())
    }

    /// Current value of every joint.
    pub fn values(&self) -> MastConfig {
        self.joints.values().map(|j| (j.id, j.value_rad)).collect()
    }

    /// Home position of every joint.
    pub fn home_config(&self) -> MastConfig {
        self.joints
            .values()
            .map(|j| (j.id, j.params.pos_home_rad))
            .collect()
    }

    /// Navigation posture of every joint.
    pub fn nav_config(&self) -> MastConfig {
        self.joints.values().map(|j| (j.id, j.pos_nav_rad)).collect()
    }

    pub fn states(&self) -> BTreeMap<JointId, JointState> {
        self.joints.values().map(|j| (j.id, j.state())).collect()
    }

    /// Joints currently in the faulted state.
    pub fn faulted(&self) -> Vec<JointId> {
        self.joints
            .values()
            .filter(|j| j.state() == JointState::Faulted)
            .map(|j| j.id)
            .collect()
    }

    /// Halt a joint. Halting never fails for a known joint.
    pub fn halt(&mut self, id: JointId) -> Result<(), MastError> {
        let joint = self.joint_mut(id)?;
        joint.apply(JointEvent::Halt)?;
        warn!("{} halted", id);
        Ok(())
    }

    pub fn halt_all(&mut self) {
        for joint in self.joints.values_mut() {
            // Halt is valid from every state
            joint.apply(JointEvent::Halt).ok();
        }
        warn!("All joints halted");
    }

    /// Return a halted or faulted joint to idle.
    pub fn reset(&mut self, id: JointId) -> Result<(), MastError> {
        self.joint_mut(id)?.apply(JointEvent::Reset)?;
        debug!("{} reset", id);
        Ok(())
    }

    pub fn reset_all(&mut self) -> Result<(), MastError> {
        // Check all first so that a moving joint leaves every joint untouched
        if let Some(j) = self
            .joints
            .values()
            .find(|j| j.state() == JointState::Moving)
        {
            return Err(MastError::InvalidTransition {
                id: j.id,
                state: JointState::Moving,
                event: JointEvent::Reset,
            });
        }

        for joint in self.joints.values_mut() {
            joint.apply(JointEvent::Reset)?;
        }
        debug!("All joints reset");

        Ok(())
    }

    pub fn coupling(&self) -> Option<ScanCoupling> {
        self.coupling
    }

    pub(crate) fn set_coupling(&mut self, coupling: Option<ScanCoupling>) {
        self.coupling = coupling;
    }

    /// Recompute the coupling offset from the current joint values.
    pub(crate) fn refresh_coupling(&mut self) {
        if let Some(mut c) = self.coupling {
            if let (Ok(l), Ok(f)) = (self.value(c.leader), self.value(c.follower)) {
                c.offset_rad = f - l;
                self.coupling = Some(c);
            }
        }
    }

    /// Validate a set of joint targets, returning the full set of targets to move to.
    ///
    /// Validation is all or nothing, either every target is accepted or an error is returned.
    /// Targets on a coupled leader also move the follower unless the follower has its own target.
    pub fn plan(
        &self,
        permit: &MotionPermit,
        targets: &MastConfig,
    ) -> Result<MastConfig, MastError> {
        let mut plan = MastConfig::new();

        for (id, target_rad) in targets.iter() {
            let joint = self.joint(id)?;

            if !permit.allows(id) {
                return Err(MastError::ModeLocked {
                    id,
                    mode: permit.mode(),
                });
            }

            joint.check_range(target_rad)?;
            plan.set(id, target_rad);
        }

        if let Some(c) = self.coupling {
            if let (Some(leader_rad), None) = (plan.get(c.leader), targets.get(c.follower)) {
                let follower_rad = leader_rad + c.offset_rad;

                if !permit.allows(c.follower) {
                    return Err(MastError::ModeLocked {
                        id: c.follower,
                        mode: permit.mode(),
                    });
                }

                self.joint(c.follower)?.check_range(follower_rad)?;
                plan.set(c.follower, follower_rad);
            }
        }

        for (id, _) in plan.iter() {
            self.joint(id)?.check_ready()?;
        }

        Ok(plan)
    }

    /// Remove the targets that joints have already reached.
    pub fn pending(&self, targets: &MastConfig, tolerance_rad: f64) -> MastConfig {
        targets
            .iter()
            .filter(|(id, target_rad)| match self.value(*id) {
                Ok(v) => (v - target_rad).abs() > tolerance_rad,
                Err(_) => true,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

//! Simulated joint actuators

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use crate::mast_ctrl::{ActFeedback, Actuator, ActuatorError, Params};
use comms_if::eqpt::mast::JointId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimActuatorParams {
    /// Current drawn by a joint while following commands.
    ///
    /// Units: amps
    pub nominal_current_a: f64,
}

/// Actuators which reach every commanded position exactly.
pub struct SimActuator {
    params: SimActuatorParams,

    positions: BTreeMap<JointId, f64>,

    faults: Arc<Mutex<SimFaults>>,
}

/// Handle used to inject faults into a [`SimActuator`] after it has been handed to the
/// controller.
#[derive(Clone)]
pub struct SimFaultHandle {
    faults: Arc<Mutex<SimFaults>>,
}

#[derive(Default)]
struct SimFaults {
    failed: BTreeSet<JointId>,
    /// Number of commands left before a single failed command.
    glitches: BTreeMap<JointId, usize>,
    currents: BTreeMap<JointId, f64>,
    num_commands: BTreeMap<JointId, usize>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimActuatorParams {
    fn default() -> Self {
        Self {
            nominal_current_a: 0.4,
        }
    }
}

impl SimActuator {
    /// Create the actuators of every joint in the parameters, resting at home.
    pub fn new(mast_params: &Params, params: SimActuatorParams) -> Self {
        Self {
            params,
            positions: mast_params
                .joints
                .iter()
                .map(|j| (j.id, j.limits.pos_home_rad))
                .collect(),
            faults: Arc::new(Mutex::new(SimFaults::default())),
        }
    }

    pub fn fault_handle(&self) -> SimFaultHandle {
        SimFaultHandle {
            faults: self.faults.clone(),
        }
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, SimFaults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Actuator for SimActuator {
    fn command(&mut self, id: JointId, pos_rad: f64) -> Result<ActFeedback, ActuatorError> {
        if !self.positions.contains_key(&id) {
            return Err(ActuatorError::NotConnected(id));
        }

        let current_a = {
            let mut faults = self.faults();
            *faults.num_commands.entry(id).or_insert(0) += 1;

            if faults.failed.contains(&id) {
                warn!("Simulated failure of {}", id);
                return Err(ActuatorError::Fault(id, String::from("simulated failure")));
            }

            match faults.glitches.get(&id).copied() {
                Some(0) => {
                    faults.glitches.remove(&id);
                    warn!("Simulated glitch of {}", id);
                    return Err(ActuatorError::Timeout(id));
                }
                Some(n) => {
                    faults.glitches.insert(id, n - 1);
                }
                None => (),
            }

            faults
                .currents
                .get(&id)
                .copied()
                .unwrap_or(self.params.nominal_current_a)
        };

        self.positions.insert(id, pos_rad);
        trace!("Sim {} -> {:.6} rad", id, pos_rad);

        Ok(ActFeedback { pos_rad, current_a })
    }

    fn stop(&mut self, id: JointId) -> Result<(), ActuatorError> {
        match self.positions.contains_key(&id) {
            true => Ok(()),
            false => Err(ActuatorError::NotConnected(id)),
        }
    }
}

impl SimFaultHandle {
    fn faults(&self) -> std::sync::MutexGuard<'_, SimFaults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent command to the joint fail.
    pub fn fail(&self, id: JointId) {
        self.faults().failed.insert(id);
    }

    /// Let `after` commands to the joint through, then time out once.
    pub fn glitch(&self, id: JointId, after: usize) {
        self.faults().glitches.insert(id, after);
    }

    /// Report the given current for every subsequent command to the joint.
    pub fn inject_current(&self, id: JointId, current_a: f64) {
        self.faults().currents.insert(id, current_a);
    }

    /// Remove every injected fault.
    pub fn clear(&self) {
        let mut faults = self.faults();
        faults.failed.clear();
        faults.glitches.clear();
        faults.currents.clear();
    }

    /// Number of commands received for a joint.
    pub fn num_commands(&self, id: JointId) -> usize {
        self.faults().num_commands.get(&id).copied().unwrap_or(0)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

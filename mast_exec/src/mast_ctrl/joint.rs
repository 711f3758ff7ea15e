//! Mast joints and their operating state machine

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{JointId, JointParams};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{JointConfig, MastError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single joint of the mast.
#[derive(Debug, Clone)]
pub struct Joint {
    pub id: JointId,

    pub name: String,

    pub params: JointParams,

    /// Position the joint takes in NAVIGATION mode.
    ///
    /// Units: radians
    pub pos_nav_rad: f64,

    /// Last committed position of the joint.
    ///
    /// Units: radians
    pub value_rad: f64,

    /// Velocity of the joint in the current move.
    ///
    /// Units: radians/second
    pub(crate) vel_rads: f64,

    state: JointState,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Operating state of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointState {
    Idle,
    Moving,
    Halted,
    Faulted,
}

/// Events driving the joint state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointEvent {
    StartMotion,
    Settle,
    Halt,
    Fault,
    Reset,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Joint {
    /// Create a new joint resting at its home position.
    pub fn new(config: &JointConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            params: config.limits,
            pos_nav_rad: config.pos_nav_rad.unwrap_or(config.limits.pos_home_rad),
            value_rad: config.limits.pos_home_rad,
            vel_rads: 0.0,
            state: JointState::Idle,
        }
    }

    pub fn state(&self) -> JointState {
        self.state
    }

    /// Apply an event to the joint's state machine.
    pub fn apply(&mut self, event: JointEvent) -> Result<JointState, MastError> {
        use JointEvent::*;
        use JointState::*;

        let next = match (self.state, event) {
            (Idle, StartMotion) => Moving,
            (Moving, Settle) => Idle,
            (Faulted, Halt) => Faulted,
            (_, Halt) => Halted,
            (_, Fault) => Faulted,
            (Idle, Reset) | (Halted, Reset) | (Faulted, Reset) => Idle,
            (state, event) => {
                return Err(MastError::InvalidTransition {
                    id: self.id,
                    state,
                    event,
                })
            }
        };

        if event != Settle && event != StartMotion {
            self.vel_rads = 0.0;
        }
        self.state = next;

        Ok(next)
    }

    /// Check the joint can start a new move.
    pub fn check_ready(&self) -> Result<(), MastError> {
        match self.state {
            JointState::Idle => Ok(()),
            state => Err(MastError::JointNotReady { id: self.id, state }),
        }
    }

    /// Check a target lies within the joint's position limits.
    pub fn check_range(&self, target_rad: f64) -> Result<(), MastError> {
        if target_rad.is_finite() && self.params.in_range(target_rad) {
            Ok(())
        } else {
            Err(MastError::OutOfRange {
                id: self.id,
                value_rad: target_rad,
                min_rad: self.params.pos_min_rad,
                max_rad: self.params.pos_max_rad,
            })
        }
    }
}

impl fmt::Display for JointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JointState::Idle => "idle",
            JointState::Moving => "moving",
            JointState::Halted => "halted",
            JointState::Faulted => "faulted",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

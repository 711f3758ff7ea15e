//! # Mast control module
//!
//! Functional layer controller for the robotic mast. `MastCtrl` gates every command behind the
//! initialisation state, the current operating mode and the joint limits before handing joint
//! targets to the motion executor.
//!
//! The controller is split over several files, each adding an `impl MastCtrl` block for one
//! group of operations:
//!
//! - `state`: construction, initialisation and joint operations
//! - `mode`: operating mode state machine
//! - `motion`: cyclic execution of joint targets against the actuator
//! - `sample`: sample retrieve, verify and dump workflows and the mast primitives
//! - `self_test`: self test checklist and log

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod arm_model;
mod bins;
mod eqpt;
mod joint;
mod kinematics;
mod mode;
mod motion;
mod params;
mod profile;
mod registry;
mod sample;
mod self_test;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use arm_model::*;
pub use bins::*;
pub use eqpt::*;
pub use joint::*;
pub use kinematics::*;
pub use mode::*;
pub use params::*;
pub use registry::*;
pub use sample::*;
pub use self_test::*;
pub use state::*;

use comms_if::{
    eqpt::mast::{BinId, JointId, MastMode},
    tc::mast::MastStatus,
};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MastCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MastError {
    #[error(
        "The mast is not initialised (root frame set: {root_frame_set}, registered bins: {num_bins})"
    )]
    NotInitialised { root_frame_set: bool, num_bins: usize },

    #[error("{0} is not a known joint")]
    UnknownJoint(JointId),

    #[error("The configuration does not contain a value for {0}")]
    MissingJoint(JointId),

    #[error("{0} is not registered")]
    BinNotFound(BinId),

    #[error("Target of {value_rad} rad for {id} is outside of the range [{min_rad}, {max_rad}]")]
    OutOfRange {
        id: JointId,
        value_rad: f64,
        min_rad: f64,
        max_rad: f64,
    },

    #[error("Invalid parameters for {0}: {1}")]
    InvalidParams(JointId, &'static str),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("The mast root frame has already been set")]
    FrameAlreadySet,

    #[error("No sample coordinates are known")]
    NoSampleCoordinates,

    #[error("{id} is locked in {mode} mode")]
    ModeLocked { id: JointId, mode: MastMode },

    #[error("{op} is only available in {required} mode, the mast is in {current} mode")]
    WrongMode {
        op: &'static str,
        required: MastMode,
        current: MastMode,
    },

    #[error("Cannot change to {target} mode: {reason}")]
    ModeTransition { target: MastMode, reason: String },

    #[error("Homing failed while changing to {target} mode: {source}")]
    TransitionFailed {
        target: MastMode,
        #[source]
        source: Box<MastError>,
    },

    #[error("The target pose cannot be reached within the joint limits")]
    Unreachable,

    #[error("Another mast command is in progress")]
    Busy,

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("{id} drew {current_a} A, above its limit of {limit_a} A")]
    Overcurrent {
        id: JointId,
        current_a: f64,
        limit_a: f64,
    },

    #[error("Move did not complete within {0} cycles")]
    MotionTimeout(u64),

    #[error("{id} is not ready to move, it is {state}")]
    JointNotReady { id: JointId, state: JointState },

    #[error("Invalid state transition of {id}: {event:?} while {state}")]
    InvalidTransition {
        id: JointId,
        state: JointState,
        event: JointEvent,
    },

    #[error("The sample could not be verified (before: {}, after: {})", .0.before, .0.after)]
    SampleNotVerified(SampleVerificationResult),

    #[error("The operation was aborted by a halt")]
    HaltedAbort,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MastError {
    /// Get the status code reported for this error.
    pub fn status(&self) -> MastStatus {
        match self {
            MastError::NotInitialised { .. } => MastStatus::NotInitialised,
            MastError::UnknownJoint(_)
            | MastError::MissingJoint(_)
            | MastError::BinNotFound(_)
            | MastError::OutOfRange { .. }
            | MastError::InvalidParams(..)
            | MastError::InvalidValue(_)
            | MastError::FrameAlreadySet
            | MastError::NoSampleCoordinates => MastStatus::Validation,
            MastError::ModeLocked { .. }
            | MastError::WrongMode { .. }
            | MastError::ModeTransition { .. }
            | MastError::TransitionFailed { .. } => MastStatus::Mode,
            MastError::Unreachable => MastStatus::Reachability,
            MastError::Busy => MastStatus::Contention,
            MastError::Actuator(_)
            | MastError::Imaging(_)
            | MastError::Overcurrent { .. }
            | MastError::MotionTimeout(_)
            | MastError::JointNotReady { .. }
            | MastError::InvalidTransition { .. } => MastStatus::Hardware,
            MastError::SampleNotVerified(_) => MastStatus::Workflow,
            MastError::HaltedAbort => MastStatus::HaltedAbort,
        }
    }
}

// ---------------------------------------------------------------------------
// TEST FIXTURES
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::sim::{SimActuator, SimFaultHandle, SimIrCamera};
    use comms_if::eqpt::mast::{Position3, RootFrame};

    /// Parameters shipped with the software.
    pub const MAST_CTRL_TOML: &str = include_str!("../../../params/mast_ctrl.toml");

    pub fn params() -> Params {
        util::params::from_str(MAST_CTRL_TOML).unwrap()
    }

    /// A controller using the simulated equipment, neither the root frame nor any bin set.
    pub fn uninit_ctrl() -> MastCtrl {
        with_imaging(Box::new(SimIrCamera::new(Default::default())), false)
    }

    /// A controller with the root at the origin and bin 1 at (0.3, 0, 0.1).
    pub fn ready_ctrl() -> MastCtrl {
        with_imaging(Box::new(SimIrCamera::new(Default::default())), true)
    }

    pub fn with_imaging(imaging: Box<dyn Imaging>, init: bool) -> MastCtrl {
        with_actuator(params(), imaging, init).0
    }

    /// A ready controller in ACTIVE mode, with a handle to inject actuator faults.
    pub fn active_ctrl_with_faults() -> (MastCtrl, SimFaultHandle) {
        let camera = SimIrCamera::new(Default::default());
        let (ctrl, faults) = with_actuator(params(), Box::new(camera), true);
        ctrl.set_mode(MastMode::Active).unwrap();
        (ctrl, faults)
    }

    pub fn with_actuator(
        params: Params,
        imaging: Box<dyn Imaging>,
        init: bool,
    ) -> (MastCtrl, SimFaultHandle) {
        let actuator = SimActuator::new(&params, Default::default());
        let faults = actuator.fault_handle();
        let ctrl = MastCtrl::new(params, Box::new(actuator), imaging).unwrap();

        if init {
            initialise(&ctrl);
        }

        (ctrl, faults)
    }

    /// Actuator calling back into the test on every command.
    pub struct HookedActuator {
        inner: SimActuator,
        on_command: Box<dyn FnMut(JointId, f64) + Send>,
    }

    impl Actuator for HookedActuator {
        fn command(&mut self, id: JointId, pos_rad: f64) -> Result<ActFeedback, ActuatorError> {
            (self.on_command)(id, pos_rad);
            self.inner.command(id, pos_rad)
        }

        fn stop(&mut self, id: JointId) -> Result<(), ActuatorError> {
            self.inner.stop(id)
        }
    }

    /// A ready controller sleeping between motion cycles, `on_command` is called with the
    /// registry locked.
    pub fn realtime_ctrl(on_command: impl FnMut(JointId, f64) + Send + 'static) -> MastCtrl {
        let mut params = params();
        params.realtime = true;
        params.cycle_period_s = 0.02;

        let actuator = HookedActuator {
            inner: SimActuator::new(&params, Default::default()),
            on_command: Box::new(on_command),
        };
        let camera = SimIrCamera::new(Default::default());
        let ctrl = MastCtrl::new(params, Box::new(actuator), Box::new(camera)).unwrap();
        initialise(&ctrl);

        ctrl
    }

    fn initialise(ctrl: &MastCtrl) {
        ctrl.set_root_frame(RootFrame::default()).unwrap();
        ctrl.set_bin_position(
            BinId(1),
            Position3 {
                x_m: 0.3,
                y_m: 0.0,
                z_m: 0.1,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_shipped_params() {
        let p = params();
        assert_eq!(p.joints.len(), 5);
        assert!(p.joints.iter().all(|j| j.limits.check().is_ok()));
        assert_eq!(p.joints[1].pos_nav_rad, Some(1.5));
        assert_eq!(p.joints[0].pos_nav_rad, None);
    }

    #[test]
    fn test_error_status() {
        assert_eq!(MastError::BinNotFound(BinId(2)).status(), MastStatus::Validation);
        assert_eq!(MastError::Busy.status(), MastStatus::Contention);
        assert_eq!(
            MastError::TransitionFailed {
                target: MastMode::Active,
                source: Box::new(MastError::MotionTimeout(10)),
            }
            .status(),
            MastStatus::Mode
        );
        assert_eq!(MastError::MotionTimeout(10).status(), MastStatus::Hardware);
    }
}

//! # Robotic mast telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::eqpt::{
    ir_cam::ImageRef,
    mast::{BinId, EndEffectorPose, JointId, JointParams, MastConfig, MastMode, Position3},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Joint limits as given on the command line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, StructOpt)]
pub struct JointParamsArgs {
    /// Home position in radians
    #[structopt(long)]
    pub home: f64,

    /// Maximum position in radians
    #[structopt(long)]
    pub max: f64,

    /// Minimum position in radians
    #[structopt(long)]
    pub min: f64,

    /// Maximum velocity in radians/second
    #[structopt(long)]
    pub vel: f64,

    /// Maximum acceleration in radians/second^2
    #[structopt(long)]
    pub acc: f64,

    /// Maximum current in amperes
    #[structopt(long)]
    pub curr: f64,
}

/// Response of the mast to a [`MastCmd`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MastResponse {
    /// Code of the first error encountered, or `Ok`.
    pub status: MastStatus,

    /// Human readable description of the error, if any.
    pub message: Option<String>,

    /// Data returned by the command.
    pub payload: MastPayload,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be executed by the mast.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub enum MastCmd {
    /// Bring the mast into the given mode.
    #[structopt(name = "mode")]
    SetMode { mode: MastMode },

    /// Get the current mode of the mast.
    #[structopt(name = "get-mode")]
    GetMode,

    /// Associate a release position (robot frame) with a sample bin.
    #[structopt(name = "bin-pos")]
    SetBinPos {
        bin_id: BinId,
        x_m: f64,
        y_m: f64,
        z_m: f64,
    },

    /// Load the limits of a joint.
    #[structopt(name = "joint-para")]
    SetJointPara {
        joint_id: JointId,
        #[structopt(flatten)]
        params: JointParamsArgs,
    },

    /// Read the limits of a joint.
    #[structopt(name = "get-joint-para")]
    GetJointPara { joint_id: JointId },

    /// Set the position and orientation of the mast root in the robot frame. May only be sent
    /// once.
    #[structopt(name = "root")]
    SetMastRootPosition {
        x_m: f64,
        y_m: f64,
        z_m: f64,
        roll_rad: f64,
        pitch_rad: f64,
        yaw_rad: f64,
    },

    /// Run the self-test checklist.
    #[structopt(name = "self-test")]
    SelfTest,

    /// Request a diagnostic report from the mast.
    #[structopt(name = "report")]
    GetReport,

    /// Move a single joint.
    #[structopt(name = "set-joint")]
    SetJointValue { joint_id: JointId, value_rad: f64 },

    /// Get the value of a single joint.
    #[structopt(name = "get-joint")]
    GetJointValue { joint_id: JointId },

    /// Move several joints in one coordinated motion, given as `id=value,id=value`.
    #[structopt(name = "set-joints")]
    SetJointValues { config: MastConfig },

    /// Get the values of all joints.
    #[structopt(name = "get-joints")]
    GetJointValues,

    /// Get the home configuration of the mast.
    #[structopt(name = "home-config")]
    GetHomeConfig,

    /// Move a joint to its home position.
    #[structopt(name = "home")]
    HomeJoint { joint_id: JointId },

    /// Move all joints to their home positions.
    #[structopt(name = "home-all")]
    HomeAllJoints,

    /// Halt a joint immediately.
    #[structopt(name = "halt")]
    HaltJoint { joint_id: JointId },

    /// Halt all joints immediately.
    #[structopt(name = "halt-all")]
    HaltAllJoints,

    /// Clear the halted or faulted state of a joint.
    #[structopt(name = "reset")]
    ResetJoint { joint_id: JointId },

    /// Clear the halted or faulted state of all joints.
    #[structopt(name = "reset-all")]
    ResetAllJoints,

    /// Move the end effector to the given pose (robot frame).
    #[structopt(name = "set-pose")]
    SetEndEffectorPos {
        x_m: f64,
        y_m: f64,
        z_m: f64,
        attack_rad: f64,
    },

    /// Get the end effector pose (robot frame).
    #[structopt(name = "get-pose")]
    GetEndEffectorPos,

    /// Retrieve and verify a sample at the given location (robot frame).
    #[structopt(name = "retrieve")]
    SampleRetrieve { x_m: f64, y_m: f64, z_m: f64 },

    /// Verify whether a retrieval succeeded from a before and after image.
    #[structopt(name = "verify")]
    SampleVerify { before: ImageRef, after: ImageRef },

    /// Dump the sample in the scoop into the given bin.
    #[structopt(name = "dump")]
    SampleDump { bin_id: BinId },

    /// Get the last known sample coordinates.
    #[structopt(name = "get-sample")]
    GetSampleCoor,

    /// Forward sample coordinates to the mast.
    #[structopt(name = "fwd-sample")]
    ForwardSampleCoor { x_m: f64, y_m: f64, z_m: f64 },

    /// Close the scoop.
    #[structopt(name = "scoop")]
    Scoop,

    /// Open the scoop.
    #[structopt(name = "drop")]
    Drop,

    /// Turn the mast right with the first joint (SCAN mode only). Angle in degrees.
    #[structopt(name = "right")]
    TurnRight { angle_deg: f64 },

    /// Turn the mast left with the first joint (SCAN mode only). Angle in degrees.
    #[structopt(name = "left")]
    TurnLeft { angle_deg: f64 },

    /// Turn the mast up with the second joint (SCAN mode only). Angle in degrees.
    #[structopt(name = "up")]
    TurnUp { angle_deg: f64 },

    /// Turn the mast down with the second joint (SCAN mode only). Angle in degrees.
    #[structopt(name = "down")]
    TurnDown { angle_deg: f64 },
}

/// Status codes returned by the mast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum MastStatus {
    Ok,

    /// The root frame or a bin position has not been set yet.
    NotInitialised,

    /// Unknown joint or bin, value out of range, or malformed parameters.
    Validation,

    /// The operation is not permitted in the current mode.
    Mode,

    /// No joint configuration within limits reaches the requested pose.
    Reachability,

    /// Another motion is already in progress.
    Contention,

    /// An actuator reported a fault.
    Hardware,

    /// The motion succeeded but the sample could not be verified.
    Workflow,

    /// The operation was preempted by a halt.
    HaltedAbort,
}

/// Data returned by the mast in a [`MastResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MastPayload {
    None,
    Mode(MastMode),
    JointValue(f64),
    JointParams(JointParams),
    Config(MastConfig),
    Pose(EndEffectorPose),
    Coords(Position3),
    Verification {
        before: ImageRef,
        after: ImageRef,
        success: bool,
    },
    Verified(bool),
    /// JSON encoded report, for instance from a self-test.
    Json(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<JointParamsArgs> for JointParams {
    fn from(a: JointParamsArgs) -> Self {
        JointParams {
            pos_home_rad: a.home,
            pos_max_rad: a.max,
            pos_min_rad: a.min,
            vel_max_rads: a.vel,
            acc_max_rads2: a.acc,
            curr_max_a: a.curr,
        }
    }
}

impl FromStr for MastConfig {
    type Err = String;

    /// Parse a configuration of the form `1=0.5,2=-1.2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cfg = MastConfig::new();

        for pair in s.split(',').filter(|p| !p.trim().is_empty()) {
            let mut split = pair.splitn(2, '=');
            let id = split.next().unwrap_or("");
            let value = split
                .next()
                .ok_or_else(|| format!("Expected `id=value`, found `{}`", pair))?;

            let id: JointId = id
                .parse()
                .map_err(|e| format!("Invalid joint ID `{}`: {}", id, e))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|e| format!("Invalid joint value `{}`: {}", value, e))?;

            cfg.set(id, value);
        }

        Ok(cfg)
    }
}

impl MastResponse {
    pub fn ok(payload: MastPayload) -> Self {
        Self {
            status: MastStatus::Ok,
            message: None,
            payload,
        }
    }

    pub fn error(status: MastStatus, message: String) -> Self {
        Self {
            status,
            message: Some(message),
            payload: MastPayload::None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == MastStatus::Ok
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

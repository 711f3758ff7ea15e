//! Parameters structure for MastCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{JointId, JointParams};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for mast control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    // ---- TIMING ----
    /// Period of one motion cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// If true the motion executor sleeps for one cycle period between cycles.
    #[serde(default)]
    pub realtime: bool,

    /// Maximum number of cycles a single move may last.
    pub max_move_cycles: u64,

    /// Distance below which a joint is considered to be at its target.
    ///
    /// Units: radians
    pub settle_tolerance_rad: f64,

    // ---- KINEMATICS ----
    pub geometry: GeometryParams,

    // ---- JOINTS ----
    pub joints: Vec<JointConfig>,

    // ---- MODES ----
    pub scan: ScanParams,

    // ---- WORKFLOWS ----
    pub sample: SampleParams,

    pub self_test: SelfTestParams,
}

/// Geometry of the mast arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryParams {
    /// Joint rotating the arm plane about the vertical axis.
    pub base_joint: JointId,

    pub shoulder_joint: JointId,

    pub elbow_joint: JointId,

    pub wrist_joint: JointId,

    /// Length of the link between shoulder and elbow.
    ///
    /// Units: meters
    pub shoulder_length_m: f64,

    /// Length of the link between elbow and wrist.
    ///
    /// Units: meters
    pub elbow_length_m: f64,

    /// Length of the link between wrist and end effector tip.
    ///
    /// Units: meters
    pub wrist_length_m: f64,

    /// Position tolerance of an inverse kinematics solution.
    ///
    /// Units: meters
    pub ik_tolerance_m: f64,

    /// Attack angle tolerance of an inverse kinematics solution.
    ///
    /// Units: radians
    pub ik_tolerance_rad: f64,
}

/// Static configuration of a single joint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointConfig {
    pub id: JointId,

    /// Human readable name, only used in logs and reports.
    pub name: String,

    #[serde(flatten)]
    pub limits: JointParams,

    /// Position of the joint in NAVIGATION mode. Defaults to the home position.
    ///
    /// Units: radians
    #[serde(default)]
    pub pos_nav_rad: Option<f64>,
}

/// Joints coupled together in SCAN mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanParams {
    pub leader: JointId,
    pub follower: JointId,
}

/// Constants of the sample workflows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SampleParams {
    pub scoop_joint: JointId,

    pub scoop_open_rad: f64,

    pub scoop_closed_rad: f64,

    /// Attack angle the scoop approaches a sample with.
    pub retrieve_attack_rad: f64,

    /// Attack angle the scoop is held at over a bin.
    pub dump_attack_rad: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfTestParams {
    /// Maximum error allowed when chaining forward, inverse then forward kinematics.
    ///
    /// Units: meters
    pub kinematics_tolerance_m: f64,

    /// Archive file name, relative to the session archive root.
    pub archive_name: String,
}

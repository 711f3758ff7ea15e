//! # Mast Executable Parameters
//!
//! This module provide parameters for the mast executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::sim::{SimActuatorParams, SimCameraParams};
use util::logger::LogParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MastExecParams {
    /// Prompt displayed by the interactive command line
    pub prompt: String,

    /// Command history file, relative to the session directory
    pub history_file: String,

    /// Period at which scripts are polled for pending telecommands.
    ///
    /// Units: seconds
    pub script_poll_period_s: f64,

    #[serde(default)]
    pub log: LogParams,

    #[serde(default)]
    pub sim_actuator: SimActuatorParams,

    #[serde(default)]
    pub sim_camera: SimCameraParams,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

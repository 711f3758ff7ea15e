//! # Mast library.
//!
//! This library allows other crates in the workspace to access items defined inside the mast
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Mast control module - gates, plans and executes every mast operation
pub mod mast_ctrl;

/// Executable parameters
pub mod params;

/// Simulated equipment - actuators and IR camera used without hardware
pub mod sim;

/// Telecommand processor - executes TCs on the mast controller
pub mod tc_processor;

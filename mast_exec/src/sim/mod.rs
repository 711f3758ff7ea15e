//! # Simulated Equipment
//!
//! Software stand-ins for the mast actuators and the IR camera, used when running the mast
//! executable without hardware and as the equipment of the controller's tests.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Simulated joint actuators with fault injection
mod actuator;

/// Simulated IR camera
mod camera;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use actuator::*;
pub use camera::*;

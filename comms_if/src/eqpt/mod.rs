//! # Equipment Interface
//!
//! This module defines the interface structures shared by the mast controller and its equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod ir_cam;
pub mod mast;

//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the mast software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommand definitions
pub mod tc;

/// Command and response definitions for equipment (like the mast and cameras)
pub mod eqpt;

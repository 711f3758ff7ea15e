//! Sample bin positions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{BinId, Position3};
use log::info;
use std::collections::BTreeMap;

use super::MastError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Map of sample bins to the position samples are dropped at, in robot coordinates.
#[derive(Debug, Clone, Default)]
pub struct BinMap {
    bins: BTreeMap<BinId, Position3>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BinMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bin, replacing its position if it is already registered.
    pub fn set(&mut self, id: BinId, pos: Position3) -> Result<(), MastError> {
        if !(pos.x_m.is_finite() && pos.y_m.is_finite() && pos.z_m.is_finite()) {
            return Err(MastError::InvalidValue("bin coordinates must be finite"));
        }

        match self.bins.insert(id, pos) {
            Some(old) => info!("{} moved from {:?} to {:?}", id, old, pos),
            None => info!("{} registered at {:?}", id, pos),
        }

        Ok(())
    }

    pub fn get(&self, id: BinId) -> Result<Position3, MastError> {
        self.bins.get(&id).copied().ok_or(MastError::BinNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &BTreeMap<BinId, Position3> {
        &self.bins
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

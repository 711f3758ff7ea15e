//! # IR Camera Equipment Types

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Highest filter ID available on the IR camera filter wheel.
pub const MAX_FILTER_ID: u8 = 7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Reference to an image saved by the IR camera.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ImageRef(pub String);

/// Metadata of a frame captured by the IR camera.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IrFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Filter wheel position used for the capture, between 0 and [`MAX_FILTER_ID`].
    pub filter_id: u8,

    /// Exposure time.
    ///
    /// Units: milliseconds
    pub exposure_ms: u32,

    /// Number of exposures averaged into the frame.
    pub average: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        ImageRef(s.to_string())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ImageRef(s.to_string()))
    }
}

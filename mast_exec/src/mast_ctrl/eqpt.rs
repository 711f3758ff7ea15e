//! Equipment interfaces used by mast control
//!
//! The controller never talks to hardware directly. Joint motion goes through an [`Actuator`]
//! and image acquisition through an [`Imaging`] collaborator, so that the controller can run
//! against the simulated equipment in `crate::sim` or real drivers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::{
    ir_cam::{ImageRef, IrFrame},
    mast::JointId,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Feedback returned by the actuator after a position command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActFeedback {
    /// Measured joint position.
    ///
    /// Units: radians
    pub pos_rad: f64,

    /// Measured motor current.
    ///
    /// Units: amps
    pub current_a: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("No actuator is connected to {0}")]
    NotConnected(JointId),

    #[error("Actuator of {0} did not respond in time")]
    Timeout(JointId),

    #[error("Actuator of {0} reported a fault: {1}")]
    Fault(JointId, String),
}

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("No frame has been captured since the last save")]
    NoFrameCaptured,

    #[error("Image {0} does not exist")]
    ImageNotFound(ImageRef),

    #[error("Camera error: {0}")]
    CameraError(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Low level motion layer of the mast joints.
pub trait Actuator: Send {
    /// Command a joint to the given position, returning the joint's feedback once the command has
    /// been executed.
    fn command(&mut self, id: JointId, pos_rad: f64) -> Result<ActFeedback, ActuatorError>;

    /// Stop a joint where it currently is.
    fn stop(&mut self, id: JointId) -> Result<(), ActuatorError>;
}

/// IR camera mounted on the mast.
pub trait Imaging: Send {
    /// Acquire a new frame.
    fn capture(&mut self) -> Result<IrFrame, ImagingError>;

    /// Save the last captured frame, returning a reference to the saved image.
    fn save(&mut self) -> Result<ImageRef, ImagingError>;

    /// Get the metadata of a saved image.
    fn get_image(&self, image: &ImageRef) -> Result<IrFrame, ImagingError>;

    /// Judge whether a sample is present by comparing images taken before and after scooping.
    fn verify_sample(&mut self, before: &ImageRef, after: &ImageRef)
        -> Result<bool, ImagingError>;

    /// Capture a new frame and save it.
    fn capture_save(&mut self) -> Result<ImageRef, ImagingError> {
        self.capture()?;
        self.save()
    }
}

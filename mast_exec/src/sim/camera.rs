//! Simulated IR camera
//!
//! Frames carry only their acquisition metadata. Images are kept in memory under sequential
//! references, and sample verification returns scripted outcomes, falling back to a default one
//! once the script is exhausted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};

use crate::mast_ctrl::{Imaging, ImagingError};
use comms_if::eqpt::ir_cam::{ImageRef, IrFrame, MAX_FILTER_ID};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimCameraParams {
    pub filter_id: u8,

    /// Units: milliseconds
    pub exposure_ms: u32,

    pub average: u32,

    /// Outcome of verifications that have not been scripted.
    pub default_verify_outcome: bool,
}

pub struct SimIrCamera {
    params: SimCameraParams,

    last_frame: Option<IrFrame>,

    images: BTreeMap<ImageRef, IrFrame>,

    num_saved: u64,

    verify_script: VecDeque<bool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimCameraParams {
    fn default() -> Self {
        Self {
            filter_id: 0,
            exposure_ms: 100,
            average: 1,
            default_verify_outcome: true,
        }
    }
}

impl SimIrCamera {
    pub fn new(params: SimCameraParams) -> Self {
        Self {
            params,
            last_frame: None,
            images: BTreeMap::new(),
            num_saved: 0,
            verify_script: VecDeque::new(),
        }
    }

    /// Select the filter used for the next captures.
    pub fn set_filter(&mut self, filter_id: u8) -> Result<(), ImagingError> {
        if filter_id > MAX_FILTER_ID {
            return Err(ImagingError::CameraError(format!(
                "filter {} does not exist, the highest filter is {}",
                filter_id, MAX_FILTER_ID
            )));
        }

        self.params.filter_id = filter_id;
        Ok(())
    }

    /// Queue the outcome of the next verification.
    pub fn script_verify(&mut self, outcome: bool) {
        self.verify_script.push_back(outcome);
    }

    /// References of every saved image, oldest first.
    pub fn ref_list(&self) -> Vec<ImageRef> {
        self.images.keys().cloned().collect()
    }

    pub fn delete_image(&mut self, image: &ImageRef) -> Result<(), ImagingError> {
        self.images
            .remove(image)
            .map(|_| ())
            .ok_or_else(|| ImagingError::ImageNotFound(image.clone()))
    }

    pub fn delete_all(&mut self) {
        info!("Deleting {} images", self.images.len());
        self.images.clear();
    }
}

impl Imaging for SimIrCamera {
    fn capture(&mut self) -> Result<IrFrame, ImagingError> {
        let frame = IrFrame {
            timestamp: Utc::now(),
            filter_id: self.params.filter_id,
            exposure_ms: self.params.exposure_ms,
            average: self.params.average,
        };

        self.last_frame = Some(frame.clone());
        Ok(frame)
    }

    fn save(&mut self) -> Result<ImageRef, ImagingError> {
        let frame = self.last_frame.take().ok_or(ImagingError::NoFrameCaptured)?;

        self.num_saved += 1;
        // Zero padded so that references sort in save order
        let image = ImageRef(format!("ir_{:06}", self.num_saved));
        debug!("Saved frame as {}", image);

        self.images.insert(image.clone(), frame);
        Ok(image)
    }

    fn get_image(&self, image: &ImageRef) -> Result<IrFrame, ImagingError> {
        self.images
            .get(image)
            .cloned()
            .ok_or_else(|| ImagingError::ImageNotFound(image.clone()))
    }

    fn verify_sample(&mut self, before: &ImageRef, after: &ImageRef) -> Result<bool, ImagingError> {
        self.get_image(before)?;
        self.get_image(after)?;

        Ok(self
            .verify_script
            .pop_front()
            .unwrap_or(self.params.default_verify_outcome))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

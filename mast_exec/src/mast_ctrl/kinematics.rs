//! Kinematic frame of the mast
//!
//! The [`KinematicFrame`] converts between joint configurations and end effector poses expressed
//! in robot coordinates. The geometry of the mast is provided by a [`Kinematics`] model working
//! in the mast base frame, the frame applies the root transform on top of it and selects among
//! the candidate solutions of the model.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{EndEffectorPose, JointId, MastConfig, RootFrame};
use conquer_once::OnceCell;
use log::{debug, info};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use std::cmp::Ordering;
use util::maths::{ang_dist, norm};

use super::{JointRegistry, MastError};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A kinematic model of the mast, expressed in the mast base frame.
pub trait Kinematics: Send + Sync {
    /// Joints whose values define the end effector pose.
    fn joints(&self) -> Vec<JointId>;

    /// Compute the end effector pose of a configuration.
    fn forward(&self, config: &MastConfig) -> Result<EndEffectorPose, MastError>;

    /// Compute every candidate configuration placing the end effector at `pose`.
    ///
    /// Candidates are not required to respect the joint limits.
    fn inverse(&self, pose: &EndEffectorPose) -> Vec<MastConfig>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct KinematicFrame {
    model: Box<dyn Kinematics>,

    root: OnceCell<RootTransform>,

    tolerance_m: f64,

    tolerance_rad: f64,
}

/// Transform from the mast base frame into robot coordinates.
struct RootTransform {
    frame: RootFrame,
    iso: Isometry3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl KinematicFrame {
    pub fn new(model: Box<dyn Kinematics>, tolerance_m: f64, tolerance_rad: f64) -> Self {
        Self {
            model,
            root: OnceCell::uninit(),
            tolerance_m,
            tolerance_rad,
        }
    }

    /// Set the position of the mast root in robot coordinates. The root can only be set once.
    pub fn set_root(&self, frame: RootFrame) -> Result<(), MastError> {
        let values = [
            frame.x_m,
            frame.y_m,
            frame.z_m,
            frame.roll_rad,
            frame.pitch_rad,
            frame.yaw_rad,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MastError::InvalidValue("root frame values must be finite"));
        }

        let iso = Isometry3::from_parts(
            Translation3::new(frame.x_m, frame.y_m, frame.z_m),
            UnitQuaternion::from_euler_angles(frame.roll_rad, frame.pitch_rad, frame.yaw_rad),
        );

        self.root
            .try_init_once(|| RootTransform { frame, iso })
            .map_err(|_| MastError::FrameAlreadySet)?;

        info!("Mast root frame set to {:?}", frame);
        Ok(())
    }

    pub fn root(&self) -> Option<RootFrame> {
        self.root.get().map(|r| r.frame)
    }

    pub fn is_root_set(&self) -> bool {
        self.root.is_initialized()
    }

    fn transform(&self) -> Result<&RootTransform, MastError> {
        self.root.get().ok_or(MastError::NotInitialised {
            root_frame_set: false,
            num_bins: 0,
        })
    }

    pub fn joints(&self) -> Vec<JointId> {
        self.model.joints()
    }

    /// End effector pose of a configuration in robot coordinates.
    pub fn forward(&self, config: &MastConfig) -> Result<EndEffectorPose, MastError> {
        let root = self.transform()?;
        let base = self.model.forward(config)?;
        let p = root.iso * Point3::new(base.x_m, base.y_m, base.z_m);

        Ok(EndEffectorPose {
            x_m: p.x,
            y_m: p.y,
            z_m: p.z,
            attack_rad: base.attack_rad,
        })
    }

    /// Configuration placing the end effector at `pose`, given in robot coordinates.
    ///
    /// Among the solutions within the joint limits the one closest to `seed` is returned.
    pub fn inverse(
        &self,
        pose: &EndEffectorPose,
        registry: &JointRegistry,
        seed: &MastConfig,
    ) -> Result<MastConfig, MastError> {
        let values = [pose.x_m, pose.y_m, pose.z_m, pose.attack_rad];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MastError::InvalidValue("pose values must be finite"));
        }

        let root = self.transform()?;
        let p = root
            .iso
            .inverse_transform_point(&Point3::new(pose.x_m, pose.y_m, pose.z_m));

        self.solve(
            &EndEffectorPose {
                x_m: p.x,
                y_m: p.y,
                z_m: p.z,
                attack_rad: pose.attack_rad,
            },
            registry,
            seed,
        )
    }

    /// Position error of chaining forward, inverse then forward kinematics from `config`, in the
    /// mast base frame.
    pub fn consistency_error(
        &self,
        config: &MastConfig,
        registry: &JointRegistry,
    ) -> Result<f64, MastError> {
        let pose = self.model.forward(config)?;
        let solution = self.solve(&pose, registry, config)?;
        let check = self.model.forward(&solution)?;

        Ok(pose_dist_m(&pose, &check))
    }

    fn solve(
        &self,
        pose: &EndEffectorPose,
        registry: &JointRegistry,
        seed: &MastConfig,
    ) -> Result<MastConfig, MastError> {
        let candidates = self.model.inverse(pose);
        let num_candidates = candidates.len();

        let best = candidates
            .into_iter()
            .filter(|c| {
                c.iter().all(|(id, v)| match registry.joint(id) {
                    Ok(j) => j.params.in_range(v),
                    Err(_) => false,
                })
            })
            .filter(|c| match self.model.forward(c) {
                Ok(check) => {
                    pose_dist_m(pose, &check) <= self.tolerance_m
                        && ang_dist(pose.attack_rad, check.attack_rad).abs() <= self.tolerance_rad
                }
                Err(_) => false,
            })
            .min_by(|a, b| {
                a.max_abs_diff(seed)
                    .partial_cmp(&b.max_abs_diff(seed))
                    .unwrap_or(Ordering::Equal)
            });

        match best {
            Some(c) => {
                debug!("Inverse kinematics solution for {:?}: {:?}", pose, c);
                Ok(c)
            }
            None => {
                debug!(
                    "None of the {} inverse kinematics candidates for {:?} are feasible",
                    num_candidates, pose
                );
                Err(MastError::Unreachable)
            }
        }
    }
}

fn pose_dist_m(a: &EndEffectorPose, b: &EndEffectorPose) -> f64 {
    norm(&[a.x_m, a.y_m, a.z_m], &[b.x_m, b.y_m, b.z_m]).unwrap_or(std::f64::INFINITY)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

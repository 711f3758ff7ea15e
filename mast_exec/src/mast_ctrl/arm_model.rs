//! Kinematic model of the mast arm
//!
//! The arm is made of a base joint rotating the arm plane about the vertical axis followed by a
//! planar chain of three pitch joints (shoulder, elbow, wrist). The scoop joint at the end of the
//! chain does not change the end effector pose.
//!
//! In the arm plane, with `r` the horizontal distance from the base axis and `z` the height above
//! the shoulder, the absolute pitch of each link is the sum of the joint angles before it:
//!
//! ```text
//! a_s = q_s
//! a_e = q_s + q_e
//! a_w = q_s + q_e + q_w
//!
//! r = L_s cos(a_s) + L_e cos(a_e) + L_w cos(a_w)
//! z = L_s sin(a_s) + L_e sin(a_e) + L_w sin(a_w)
//! ```
//!
//! The attack angle of the end effector is the absolute pitch of the wrist link, `a_w`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::{EndEffectorPose, JointId, MastConfig};
use std::f64::consts::PI;
use util::maths::wrap_to_pi;

use super::{GeometryParams, Kinematics, MastError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArmModel {
    base: JointId,
    shoulder: JointId,
    elbow: JointId,
    wrist: JointId,

    shoulder_length_m: f64,
    elbow_length_m: f64,
    wrist_length_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmModel {
    pub fn new(geometry: &GeometryParams) -> Self {
        Self {
            base: geometry.base_joint,
            shoulder: geometry.shoulder_joint,
            elbow: geometry.elbow_joint,
            wrist: geometry.wrist_joint,
            shoulder_length_m: geometry.shoulder_length_m,
            elbow_length_m: geometry.elbow_length_m,
            wrist_length_m: geometry.wrist_length_m,
        }
    }

    fn value(config: &MastConfig, id: JointId) -> Result<f64, MastError> {
        config.get(id).ok_or(MastError::MissingJoint(id))
    }

    /// Solve the planar chain for a wrist tip at `(r, z)` with the given attack angle.
    fn planar_solutions(&self, r_m: f64, z_m: f64, attack_rad: f64) -> Vec<(f64, f64, f64)> {
        let (l1, l2) = (self.shoulder_length_m, self.elbow_length_m);

        // Position of the wrist joint
        let rw_m = r_m - self.wrist_length_m * attack_rad.cos();
        let zw_m = z_m - self.wrist_length_m * attack_rad.sin();

        let cos_elbow = (rw_m.powi(2) + zw_m.powi(2) - l1.powi(2) - l2.powi(2)) / (2.0 * l1 * l2);

        if !cos_elbow.is_finite() || cos_elbow.abs() > 1.0 {
            return vec![];
        }

        let elbow_rad = cos_elbow.acos();

        [elbow_rad, -elbow_rad]
            .iter()
            .map(|q_e| {
                let q_s = zw_m.atan2(rw_m) - (l2 * q_e.sin()).atan2(l1 + l2 * q_e.cos());
                let q_w = wrap_to_pi(attack_rad - q_s - q_e);
                (wrap_to_pi(q_s), *q_e, q_w)
            })
            .collect()
    }
}

impl Kinematics for ArmModel {
    fn joints(&self) -> Vec<JointId> {
        vec![self.base, self.shoulder, self.elbow, self.wrist]
    }

    fn forward(&self, config: &MastConfig) -> Result<EndEffectorPose, MastError> {
        let q_b = Self::value(config, self.base)?;
        let a_s = Self::value(config, self.shoulder)?;
        let a_e = a_s + Self::value(config, self.elbow)?;
        let a_w = a_e + Self::value(config, self.wrist)?;

        let r_m = self.shoulder_length_m * a_s.cos()
            + self.elbow_length_m * a_e.cos()
            + self.wrist_length_m * a_w.cos();
        let z_m = self.shoulder_length_m * a_s.sin()
            + self.elbow_length_m * a_e.sin()
            + self.wrist_length_m * a_w.sin();

        Ok(EndEffectorPose {
            x_m: r_m * q_b.cos(),
            y_m: r_m * q_b.sin(),
            z_m,
            attack_rad: wrap_to_pi(a_w),
        })
    }

    fn inverse(&self, pose: &EndEffectorPose) -> Vec<MastConfig> {
        let base_rad = pose.y_m.atan2(pose.x_m);
        let r_m = pose.x_m.hypot(pose.y_m);

        // Reach towards the target, or face away from it and fold the chain back over the base
        let branches = [(base_rad, r_m), (wrap_to_pi(base_rad + PI), -r_m)];

        let mut candidates = vec![];
        for (q_b, r) in branches.iter() {
            for (q_s, q_e, q_w) in self.planar_solutions(*r, pose.z_m, pose.attack_rad) {
                let mut c = MastConfig::new();
                c.set(self.base, *q_b);
                c.set(self.shoulder, q_s);
                c.set(self.elbow, q_e);
                c.set(self.wrist, q_w);
                candidates.push(c);
            }
        }

        candidates
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

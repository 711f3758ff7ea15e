//! # Robotic Mast Equipment Types
//!
//! Types shared between the mast controller and anything that commands it: joint and bin
//! identifiers, joint limits, mast configurations and poses.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, iter::FromIterator, str::FromStr};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifier of one degree of freedom of the mast.
///
/// Joints are numbered from 1, joint 1 being the base of the mast.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
#[serde(transparent)]
pub struct JointId(pub u8);

/// Identifier of a sample bin.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
#[serde(transparent)]
pub struct BinId(pub u32);

/// Physical limits and reference position of a single joint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct JointParams {
    /// Home position of the joint.
    ///
    /// Units: radians
    pub pos_home_rad: f64,

    /// Maximum position of the joint.
    ///
    /// Units: radians
    pub pos_max_rad: f64,

    /// Minimum position of the joint.
    ///
    /// Units: radians
    pub pos_min_rad: f64,

    /// Maximum velocity of the joint.
    ///
    /// Units: radians/second
    pub vel_max_rads: f64,

    /// Maximum acceleration of the joint.
    ///
    /// Units: radians/second^2
    pub acc_max_rads2: f64,

    /// Maximum current drawn by the joint's actuator.
    ///
    /// Units: amperes
    pub curr_max_a: f64,
}

/// A snapshot of joint values, ordered by joint ID.
///
/// A configuration may be partial, for instance when only some joints are being commanded.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct MastConfig(pub BTreeMap<JointId, f64>);

/// Position and attack angle of the end effector (the scoop).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct EndEffectorPose {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Units: meters
    pub z_m: f64,

    /// Attack angle of the scoop, the absolute pitch of the last link in the plane of the arm.
    ///
    /// Units: radians
    pub attack_rad: f64,
}

/// Position and orientation of the mast root in the robot frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct RootFrame {
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
    pub roll_rad: f64,
    pub pitch_rad: f64,
    pub yaw_rad: f64,
}

/// A point in the robot frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position3 {
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Operating mode of the mast.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum MastMode {
    /// Mast is unlocked and every joint can be commanded.
    Active,

    /// Mast is folded into its lowest centre of gravity configuration and locked.
    Stowage,

    /// Only the first two joints are unlocked, used for scanning the ground with the cameras.
    Scan,

    /// Mast is held in its minimum energy posture and locked.
    Navigation,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}", self.0)
    }
}

impl FromStr for JointId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix('J')
            .or_else(|| s.strip_prefix('j'))
            .unwrap_or(s);
        Ok(JointId(digits.parse()?))
    }
}

impl fmt::Display for BinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bin {}", self.0)
    }
}

impl FromStr for BinId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BinId(s.trim().parse()?))
    }
}

impl JointParams {
    /// Check that the parameters describe a physically meaningful joint.
    ///
    /// Returns a description of the first problem found.
    pub fn check(&self) -> Result<(), &'static str> {
        let all = [
            self.pos_home_rad,
            self.pos_max_rad,
            self.pos_min_rad,
            self.vel_max_rads,
            self.acc_max_rads2,
            self.curr_max_a,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err("all joint parameters must be finite");
        }
        if self.pos_min_rad >= self.pos_max_rad {
            return Err("minimum position must be lower than maximum position");
        }
        if !self.in_range(self.pos_home_rad) {
            return Err("home position must lie within the position limits");
        }
        if self.vel_max_rads <= 0.0 || self.acc_max_rads2 <= 0.0 || self.curr_max_a <= 0.0 {
            return Err("velocity, acceleration and current ceilings must be positive");
        }

        Ok(())
    }

    /// Whether `pos_rad` lies within the joint's position limits (inclusive).
    pub fn in_range(&self, pos_rad: f64) -> bool {
        pos_rad >= self.pos_min_rad && pos_rad <= self.pos_max_rad
    }
}

impl MastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: JointId) -> Option<f64> {
        self.0.get(&id).copied()
    }

    pub fn set(&mut self, id: JointId, value_rad: f64) {
        self.0.insert(id, value_rad);
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, f64)> + '_ {
        self.0.iter().map(|(id, v)| (*id, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest absolute difference between matching joints of two configurations.
    ///
    /// Joints present in only one of the configurations are ignored.
    pub fn max_abs_diff(&self, other: &MastConfig) -> f64 {
        self.iter()
            .filter_map(|(id, v)| other.get(id).map(|o| (v - o).abs()))
            .fold(0.0, f64::max)
    }
}

impl FromIterator<(JointId, f64)> for MastConfig {
    fn from_iter<I: IntoIterator<Item = (JointId, f64)>>(iter: I) -> Self {
        MastConfig(iter.into_iter().collect())
    }
}

impl MastMode {
    /// Locked modes give the user no access to functions changing the mast configuration.
    pub fn is_locked(&self) -> bool {
        matches!(self, MastMode::Stowage | MastMode::Navigation)
    }
}

impl fmt::Display for MastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MastMode::Active => "ACTIVE",
            MastMode::Stowage => "STOWAGE",
            MastMode::Scan => "SCAN",
            MastMode::Navigation => "NAVIGATION",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MastMode::Active),
            "stowage" | "stow" => Ok(MastMode::Stowage),
            "scan" => Ok(MastMode::Scan),
            "navigation" | "nav" => Ok(MastMode::Navigation),
            _ => Err(format!("{} is not a recognised mast mode", s)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> JointParams {
        JointParams {
            pos_home_rad: 0.0,
            pos_max_rad: 1.0,
            pos_min_rad: -1.0,
            vel_max_rads: 1.0,
            acc_max_rads2: 2.0,
            curr_max_a: 1.5,
        }
    }

    #[test]
    fn test_joint_params_check() {
        assert!(params().check().is_ok());

        let mut p = params();
        p.pos_home_rad = 2.0;
        assert!(p.check().is_err());

        let mut p = params();
        p.pos_min_rad = 1.0;
        assert!(p.check().is_err());

        let mut p = params();
        p.vel_max_rads = 0.0;
        assert!(p.check().is_err());

        let mut p = params();
        p.curr_max_a = f64::NAN;
        assert!(p.check().is_err());
    }

    #[test]
    fn test_ids_from_str() {
        assert_eq!("3".parse::<JointId>().unwrap(), JointId(3));
        assert_eq!("J2".parse::<JointId>().unwrap(), JointId(2));
        assert!("elbow".parse::<JointId>().is_err());
        assert_eq!(" 7".parse::<BinId>().unwrap(), BinId(7));
        assert_eq!("nav".parse::<MastMode>().unwrap(), MastMode::Navigation);
        assert!("sleep".parse::<MastMode>().is_err());
    }

    #[test]
    fn test_config_json_keys() {
        let cfg: MastConfig = vec![(JointId(1), 0.5), (JointId(2), -0.25)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(json, r#"{"1":0.5,"2":-0.25}"#);

        let back: MastConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_config_max_abs_diff() {
        let a: MastConfig = vec![(JointId(1), 0.5), (JointId(2), 1.0)].into_iter().collect();
        let b: MastConfig = vec![(JointId(1), 0.25), (JointId(3), 9.0)].into_iter().collect();
        assert_eq!(a.max_abs_diff(&b), 0.25);
    }
}

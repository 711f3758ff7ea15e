//! Mast self test checklist
//!
//! A self test runs a fixed sequence of checks on the current state of the mast and records the
//! outcome in an append-only log kept for the lifetime of the process. Running a self test never
//! fails, failures of individual checks are reported in the returned report.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use util::{archive::Archiver, session};

use super::{lock, JointRegistry, JointState, KinematicFrame, MastCtrl};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of a single self test check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
}

/// Report of a full self test run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelfTestReport {
    pub status: SelfTestStatus,

    /// Joint parameters are consistent and every joint lies within its limits.
    pub joint_range: CheckResult,

    /// Every joint can be homed.
    pub homing: CheckResult,

    /// Forward and inverse kinematics agree on the home configuration.
    pub kinematics: CheckResult,
}

/// Entry of the self test log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfTestLogEntry {
    pub run: u32,
    pub timestamp: DateTime<Utc>,
    pub status: SelfTestStatus,
    pub messages: Vec<String>,
}

/// Flat row of the self test archive.
#[derive(Debug, Serialize)]
struct SelfTestRecord {
    run: u32,
    timestamp: String,
    passed: bool,
    joint_range: String,
    homing: String,
    kinematics: String,
}

pub struct SelfTestRunner {
    log: Vec<SelfTestLogEntry>,
    archiver: Option<Archiver>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SelfTestStatus {
    Ok,
    NotOk,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CheckResult {
    fn from_failures(failures: Vec<String>, ok_message: &str) -> Self {
        match failures.is_empty() {
            true => Self {
                passed: true,
                message: ok_message.to_string(),
            },
            false => Self {
                passed: false,
                message: failures.join("; "),
            },
        }
    }
}

impl SelfTestReport {
    fn checks(&self) -> [&CheckResult; 3] {
        [&self.joint_range, &self.homing, &self.kinematics]
    }
}

impl SelfTestRunner {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            archiver: None,
        }
    }

    pub fn set_archiver(&mut self, archiver: Archiver) {
        info!("Archiving self tests to {:?}", archiver.path());
        self.archiver = Some(archiver);
    }

    pub fn last_status(&self) -> Option<SelfTestStatus> {
        self.log.last().map(|e| e.status)
    }

    pub fn log(&self) -> &[SelfTestLogEntry] {
        &self.log
    }

    /// Append a report to the log, returning the new entry.
    fn record(&mut self, report: &SelfTestReport) -> SelfTestLogEntry {
        let entry = SelfTestLogEntry {
            run: self.log.len() as u32 + 1,
            timestamp: Utc::now(),
            status: report.status,
            messages: report.checks().iter().map(|c| c.message.clone()).collect(),
        };

        if let Some(ref mut arch) = self.archiver {
            let record = SelfTestRecord {
                run: entry.run,
                timestamp: entry.timestamp.to_rfc3339(),
                passed: entry.status == SelfTestStatus::Ok,
                joint_range: report.joint_range.message.clone(),
                homing: report.homing.message.clone(),
                kinematics: report.kinematics.message.clone(),
            };

            if let Err(e) = arch.serialise(record) {
                warn!("Could not archive self test {}: {}", entry.run, e);
            }
        }

        self.log.push(entry.clone());
        entry
    }
}

impl Default for SelfTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MastCtrl {
    /// Run the self test checklist.
    pub fn run_self_test(&self) -> SelfTestReport {
        info!("Running self test");

        let report = {
            let reg = self.registry();

            let joint_range = check_joint_range(&reg);
            let homing = check_homing(&reg);
            let kinematics =
                check_kinematics(&self.frame, &reg, self.params.self_test.kinematics_tolerance_m);

            let status = match joint_range.passed && homing.passed && kinematics.passed {
                true => SelfTestStatus::Ok,
                false => SelfTestStatus::NotOk,
            };

            SelfTestReport {
                status,
                joint_range,
                homing,
                kinematics,
            }
        };

        match report.status {
            SelfTestStatus::Ok => info!("Self test passed"),
            SelfTestStatus::NotOk => {
                for c in report.checks().iter().filter(|c| !c.passed) {
                    warn!("Self test check failed: {}", c.message);
                }
            }
        }

        let entry = lock(&self.self_test).record(&report);
        session::save_with_timestamp("self_test.json", entry);

        report
    }

    /// Every self test run so far, oldest first.
    pub fn self_test_log(&self) -> Vec<SelfTestLogEntry> {
        lock(&self.self_test).log().to_vec()
    }
}

// ---------------------------------------------------------------------------
// CHECKS
// ---------------------------------------------------------------------------

fn check_joint_range(reg: &JointRegistry) -> CheckResult {
    let mut failures = vec![];

    for j in reg.joints() {
        if let Err(e) = j.params.check() {
            failures.push(format!("{}: {}", j.id, e));
        }
        if !j.params.in_range(j.value_rad) {
            failures.push(format!(
                "{} at {} rad, outside of [{}, {}]",
                j.id, j.value_rad, j.params.pos_min_rad, j.params.pos_max_rad
            ));
        }
    }

    CheckResult::from_failures(failures, "all joints within limits")
}

fn check_homing(reg: &JointRegistry) -> CheckResult {
    let mut failures = vec![];

    for j in reg.joints() {
        if !j.params.in_range(j.params.pos_home_rad) {
            failures.push(format!("{} home position is outside of its limits", j.id));
        }
        if j.state() == JointState::Faulted {
            failures.push(format!("{} is faulted", j.id));
        }
    }

    CheckResult::from_failures(failures, "all joints can be homed")
}

fn check_kinematics(frame: &KinematicFrame, reg: &JointRegistry, tolerance_m: f64) -> CheckResult {
    match frame.consistency_error(&reg.home_config(), reg) {
        Ok(err_m) if err_m <= tolerance_m => CheckResult {
            passed: true,
            message: format!("kinematics consistent ({:.3e} m)", err_m),
        },
        Ok(err_m) => CheckResult {
            passed: false,
            message: format!(
                "kinematics inconsistent, {:.3e} m above the tolerance of {:.3e} m",
                err_m, tolerance_m
            ),
        },
        Err(e) => CheckResult {
            passed: false,
            message: format!("kinematics check failed: {}", e),
        },
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mast_ctrl::fixtures::{ready_ctrl, uninit_ctrl};
    use comms_if::eqpt::mast::{JointId, JointParams, MastMode};

    #[test]
    fn test_self_test_passes() {
        // No initialisation needed
        let ctrl = uninit_ctrl();
        let report = ctrl.run_self_test();

        assert_eq!(report.status, SelfTestStatus::Ok);
        assert!(report.checks().iter().all(|c| c.passed));
    }

    #[test]
    fn test_self_test_log_grows() {
        let ctrl = ready_ctrl();
        assert!(ctrl.self_test_log().is_empty());

        for i in 1..=3 {
            ctrl.run_self_test();
            let log = ctrl.self_test_log();
            assert_eq!(log.len(), i);
            assert_eq!(log.last().unwrap().run, i as u32);
            assert_eq!(log.last().unwrap().messages.len(), 3);
        }

        assert_eq!(ctrl.report().last_self_test, Some(SelfTestStatus::Ok));
    }

    #[test]
    fn test_self_test_reports_faulted_joint() {
        let ctrl = ready_ctrl();
        ctrl.set_mode(MastMode::Active).unwrap();
        ctrl.registry()
            .joint_mut(JointId(3))
            .unwrap()
            .apply(crate::mast_ctrl::JointEvent::Fault)
            .unwrap();

        let report = ctrl.run_self_test();
        assert_eq!(report.status, SelfTestStatus::NotOk);
        assert!(report.joint_range.passed);
        assert!(!report.homing.passed);
        assert!(report.homing.message.contains("J3"));
        assert_eq!(ctrl.report().last_self_test, Some(SelfTestStatus::NotOk));
    }

    #[test]
    fn test_self_test_detects_value_outside_limits() {
        let ctrl = ready_ctrl();
        ctrl.set_joint_params(
            JointId(1),
            JointParams {
                pos_home_rad: 0.5,
                pos_max_rad: 1.0,
                pos_min_rad: 0.2,
                vel_max_rads: 0.6,
                acc_max_rads2: 1.2,
                curr_max_a: 2.0,
            },
        )
        .unwrap();

        let report = ctrl.run_self_test();
        assert!(!report.joint_range.passed);
        assert!(report.homing.passed);
    }

    #[test]
    fn test_self_test_archive() {
        let path = std::env::temp_dir()
            .join(format!("mast_self_test_{}", std::process::id()))
            .join("self_test.csv");
        let _ = std::fs::remove_file(&path);

        let ctrl = ready_ctrl().with_self_test_archive(Archiver::open(&path).unwrap());
        ctrl.run_self_test();
        ctrl.run_self_test();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run,timestamp,passed"));
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
    }
}

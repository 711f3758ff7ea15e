//! # Telecommand processor module
//!
//! The telecommand processor handles the TCs coming from any source, executing them on the mast
//! controller and building the response sent back to the source.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};

// Internal
use crate::mast_ctrl::{MastCtrl, MastError};
use comms_if::{
    eqpt::mast::{Position3, RootFrame},
    tc::{
        mast::{MastCmd, MastPayload, MastResponse, MastStatus},
        Tc, TcType,
    },
};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// Returns the response of the mast if the TC was a mast command.
pub fn exec(ctrl: &MastCtrl, tc: &Tc) -> Option<MastResponse> {
    match tc.tc_type {
        TcType::None => None,
        TcType::Heartbeat => {
            debug!("Recieved heartbeat");
            None
        }
        TcType::MakeSafe => {
            info!("Recieved MakeSafe command, halting all joints");
            ctrl.halt_all_joints();
            None
        }
        TcType::Mast => match tc.mast_cmd() {
            Ok(Some(cmd)) => Some(exec_cmd(ctrl, &cmd)),
            Ok(None) => None,
            Err(e) => {
                warn!("Invalid mast TC: {}", e);
                Some(MastResponse::error(MastStatus::Validation, e.to_string()))
            }
        },
    }
}

/// True if the TC must run as soon as it is received, alongside any command in progress.
pub fn preempts(tc: &Tc) -> bool {
    match tc.tc_type {
        TcType::MakeSafe => true,
        TcType::Mast => matches!(tc.mast_cmd(), Ok(Some(ref cmd)) if preempts_cmd(cmd)),
        TcType::None | TcType::Heartbeat => false,
    }
}

/// True for the mast commands which bypass the command pipeline.
pub fn preempts_cmd(cmd: &MastCmd) -> bool {
    matches!(cmd, MastCmd::HaltJoint { .. } | MastCmd::HaltAllJoints)
}

/// Execute a mast command.
pub fn exec_cmd(ctrl: &MastCtrl, cmd: &MastCmd) -> MastResponse {
    debug!("Executing {:?}", cmd);

    let response = match cmd {
        MastCmd::SetMode { mode } => respond(ctrl.set_mode(*mode), none),
        MastCmd::GetMode => MastResponse::ok(MastPayload::Mode(ctrl.get_mode())),
        MastCmd::SetBinPos {
            bin_id,
            x_m,
            y_m,
            z_m,
        } => respond(
            ctrl.set_bin_position(*bin_id, position(*x_m, *y_m, *z_m)),
            none,
        ),
        MastCmd::SetJointPara { joint_id, params } => {
            respond(ctrl.set_joint_params(*joint_id, (*params).into()), none)
        }
        MastCmd::GetJointPara { joint_id } => {
            respond(ctrl.get_joint_params(*joint_id), MastPayload::JointParams)
        }
        MastCmd::SetMastRootPosition {
            x_m,
            y_m,
            z_m,
            roll_rad,
            pitch_rad,
            yaw_rad,
        } => respond(
            ctrl.set_root_frame(RootFrame {
                x_m: *x_m,
                y_m: *y_m,
                z_m: *z_m,
                roll_rad: *roll_rad,
                pitch_rad: *pitch_rad,
                yaw_rad: *yaw_rad,
            }),
            none,
        ),
        MastCmd::SelfTest => json(&ctrl.run_self_test()),
        MastCmd::GetReport => MastResponse::ok(MastPayload::Json(ctrl.get_report())),
        MastCmd::SetJointValue {
            joint_id,
            value_rad,
        } => respond(ctrl.set_joint_value(*joint_id, *value_rad), none),
        MastCmd::GetJointValue { joint_id } => {
            respond(ctrl.get_joint_value(*joint_id), MastPayload::JointValue)
        }
        MastCmd::SetJointValues { config } => respond(ctrl.set_joint_values(config), none),
        MastCmd::GetJointValues => respond(ctrl.get_joint_values(), MastPayload::Config),
        MastCmd::GetHomeConfig => respond(ctrl.get_home_config(), MastPayload::Config),
        MastCmd::HomeJoint { joint_id } => respond(ctrl.home_joint(*joint_id), none),
        MastCmd::HomeAllJoints => respond(ctrl.home_all_joints(), none),
        MastCmd::HaltJoint { joint_id } => respond(ctrl.halt_joint(*joint_id), none),
        MastCmd::HaltAllJoints => {
            ctrl.halt_all_joints();
            MastResponse::ok(MastPayload::None)
        }
        MastCmd::ResetJoint { joint_id } => respond(ctrl.reset_joint(*joint_id), none),
        MastCmd::ResetAllJoints => respond(ctrl.reset_all_joints(), none),
        MastCmd::SetEndEffectorPos {
            x_m,
            y_m,
            z_m,
            attack_rad,
        } => respond(
            ctrl.set_end_effector_pose(&comms_if::eqpt::mast::EndEffectorPose {
                x_m: *x_m,
                y_m: *y_m,
                z_m: *z_m,
                attack_rad: *attack_rad,
            }),
            MastPayload::Config,
        ),
        MastCmd::GetEndEffectorPos => respond(ctrl.get_end_effector_pose(), MastPayload::Pose),
        MastCmd::SampleRetrieve { x_m, y_m, z_m } => respond(
            ctrl.sample_retrieve(position(*x_m, *y_m, *z_m)),
            |r| MastPayload::Verification {
                before: r.before,
                after: r.after,
                success: r.success,
            },
        ),
        MastCmd::SampleVerify { before, after } => {
            respond(ctrl.sample_verify(before, after), |r| {
                MastPayload::Verified(r.success)
            })
        }
        MastCmd::SampleDump { bin_id } => respond(ctrl.sample_dump(*bin_id), none),
        MastCmd::GetSampleCoor => respond(ctrl.get_sample_coor(), MastPayload::Coords),
        MastCmd::ForwardSampleCoor { x_m, y_m, z_m } => respond(
            ctrl.forward_sample_coor(position(*x_m, *y_m, *z_m)),
            none,
        ),
        MastCmd::Scoop => respond(ctrl.scoop(), none),
        MastCmd::Drop => respond(ctrl.drop_sample(), none),
        MastCmd::TurnRight { angle_deg } => respond(ctrl.turn_right(*angle_deg), none),
        MastCmd::TurnLeft { angle_deg } => respond(ctrl.turn_left(*angle_deg), none),
        MastCmd::TurnUp { angle_deg } => respond(ctrl.turn_up(*angle_deg), none),
        MastCmd::TurnDown { angle_deg } => respond(ctrl.turn_down(*angle_deg), none),
    };

    if !response.is_ok() {
        warn!(
            "Mast command failed with {:?}: {}",
            response.status,
            response.message.as_deref().unwrap_or("")
        );
    }

    response
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the response to the result of an operation.
fn respond<T, F>(result: Result<T, MastError>, payload: F) -> MastResponse
where
    F: FnOnce(T) -> MastPayload,
{
    match result {
        Ok(t) => MastResponse::ok(payload(t)),
        Err(MastError::SampleNotVerified(r)) => MastResponse {
            status: MastStatus::Workflow,
            message: Some(format!(
                "The sample could not be verified (before: {}, after: {})",
                r.before, r.after
            )),
            payload: MastPayload::Verification {
                before: r.before,
                after: r.after,
                success: r.success,
            },
        },
        Err(e) => MastResponse::error(e.status(), e.to_string()),
    }
}

fn none<T>(_: T) -> MastPayload {
    MastPayload::None
}

fn json<T: serde::Serialize>(data: &T) -> MastResponse {
    match serde_json::to_string(data) {
        Ok(s) => MastResponse::ok(MastPayload::Json(s)),
        Err(e) => MastResponse::error(
            MastStatus::Validation,
            format!("Could not serialise the response: {}", e),
        ),
    }
}

fn position(x_m: f64, y_m: f64, z_m: f64) -> Position3 {
    Position3 { x_m, y_m, z_m }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mast_ctrl::{fixtures, SelfTestReport, SelfTestStatus};
    use crate::sim::SimIrCamera;
    use comms_if::eqpt::mast::{BinId, JointId, MastMode};
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn exec_json(ctrl: &MastCtrl, json: &str) -> Option<MastResponse> {
        exec(ctrl, &Tc::from_json(json).unwrap())
    }

    #[test]
    fn test_reference_scenario_over_tcs() {
        let ctrl = fixtures::uninit_ctrl();

        let cmds = vec![
            MastCmd::SetMastRootPosition {
                x_m: 0.0,
                y_m: 0.0,
                z_m: 0.0,
                roll_rad: 0.0,
                pitch_rad: 0.0,
                yaw_rad: 0.0,
            },
            MastCmd::SetBinPos {
                bin_id: BinId(1),
                x_m: 0.3,
                y_m: 0.0,
                z_m: 0.1,
            },
            MastCmd::SetMode {
                mode: MastMode::Active,
            },
            MastCmd::SampleRetrieve {
                x_m: 0.3,
                y_m: 0.0,
                z_m: 0.1,
            },
            MastCmd::SampleDump { bin_id: BinId(1) },
        ];

        for cmd in cmds {
            let r = exec(&ctrl, &Tc::from_mast_cmd(&cmd).unwrap()).unwrap();
            assert!(r.is_ok(), "{:?} failed: {:?}", cmd, r);
        }

        let r = exec_cmd(&ctrl, &MastCmd::SampleDump { bin_id: BinId(2) });
        assert_eq!(r.status, MastStatus::Validation);
        assert!(r.message.is_some());

        let r = exec_cmd(&ctrl, &MastCmd::GetJointValues);
        assert_eq!(r.payload, MastPayload::Config(ctrl.get_home_config().unwrap()));
    }

    #[test]
    fn test_reference_script() {
        let mut si = util::script_interpreter::ScriptInterpreter::from_script(include_str!(
            "../../scripts/reference_scenario.tcs"
        ))
        .unwrap();
        assert_eq!(si.get_num_tcs(), 9);

        let ctrl = fixtures::uninit_ctrl();
        let tcs = match si.get_pending_tcs_at(10.0) {
            util::script_interpreter::PendingTcs::Some(tcs) => tcs,
            _ => panic!("Expected every TC of the script to be pending"),
        };

        let statuses: Vec<MastStatus> = tcs
            .iter()
            .filter_map(|tc| exec(&ctrl, tc))
            .map(|r| r.status)
            .collect();

        assert_eq!(statuses.len(), 8);
        assert!(statuses[..6].iter().all(|s| *s == MastStatus::Ok));
        assert_eq!(statuses[6], MastStatus::Validation);
        assert_eq!(statuses[7], MastStatus::Ok);

        // The final SAFE TC halts everything
        assert!(ctrl
            .registry()
            .states()
            .values()
            .all(|s| *s == crate::mast_ctrl::JointState::Halted));
    }

    #[test]
    fn test_status_codes() {
        let ctrl = fixtures::uninit_ctrl();

        let r = exec_cmd(&ctrl, &MastCmd::HomeAllJoints);
        assert_eq!(r.status, MastStatus::NotInitialised);

        let r = exec_cmd(&ctrl, &MastCmd::GetMode);
        assert_eq!(r.payload, MastPayload::Mode(MastMode::Stowage));

        exec_cmd(&ctrl, &MastCmd::SetMastRootPosition {
            x_m: 0.0,
            y_m: 0.0,
            z_m: 0.0,
            roll_rad: 0.0,
            pitch_rad: 0.0,
            yaw_rad: 0.0,
        });
        exec_cmd(&ctrl, &MastCmd::SetBinPos {
            bin_id: BinId(1),
            x_m: 0.3,
            y_m: 0.0,
            z_m: 0.1,
        });

        let r = exec_cmd(&ctrl, &MastCmd::SetJointValue {
            joint_id: JointId(1),
            value_rad: 0.5,
        });
        assert_eq!(r.status, MastStatus::Mode);

        let r = exec_cmd(&ctrl, &MastCmd::TurnLeft { angle_deg: 5.0 });
        assert_eq!(r.status, MastStatus::Mode);

        let r = exec_cmd(&ctrl, &MastCmd::GetSampleCoor);
        assert_eq!(r.status, MastStatus::Validation);

        let r = exec_cmd(&ctrl, &MastCmd::GetJointPara {
            joint_id: JointId(2),
        });
        assert!(matches!(r.payload, MastPayload::JointParams(p) if p.pos_home_rad == 1.2));
    }

    #[test]
    fn test_failed_verification_response() {
        let mut camera = SimIrCamera::new(Default::default());
        camera.script_verify(false);
        let ctrl = fixtures::with_imaging(Box::new(camera), true);
        ctrl.set_mode(MastMode::Active).unwrap();

        let r = exec_cmd(&ctrl, &MastCmd::SampleRetrieve {
            x_m: 0.3,
            y_m: 0.0,
            z_m: 0.1,
        });
        assert_eq!(r.status, MastStatus::Workflow);
        assert!(matches!(
            r.payload,
            MastPayload::Verification { success: false, .. }
        ));
    }

    #[test]
    fn test_make_safe_halts() {
        let ctrl = fixtures::ready_ctrl();
        assert!(exec_json(&ctrl, r#"{"type": "SAFE"}"#).is_none());
        assert!(ctrl
            .registry()
            .states()
            .values()
            .all(|s| *s == crate::mast_ctrl::JointState::Halted));

        assert!(exec_json(&ctrl, r#"{"type": "HEARTBEAT"}"#).is_none());
    }

    #[test]
    fn test_halt_tc_preempts_move_tc() {
        let safe = Tc::from_json(r#"{"type": "SAFE"}"#).unwrap();
        let halt = Tc::from_mast_cmd(&MastCmd::HaltAllJoints).unwrap();
        let mv = Tc::from_json(
            r#"{"type": "MAST", "payload": {"SetJointValue": {"joint_id": 1, "value_rad": 1.0}}}"#,
        )
        .unwrap();
        assert!(preempts(&safe) && preempts(&halt));
        assert!(!preempts(&mv));
        assert!(preempts_cmd(&MastCmd::HaltJoint { joint_id: JointId(2) }));
        assert!(!preempts_cmd(&MastCmd::GetMode));

        let (entered_tx, entered_rx) = mpsc::channel();
        let mut num_commands = 0;
        let ctrl = Arc::new(fixtures::realtime_ctrl(move |_, _| {
            num_commands += 1;
            if num_commands == 2 {
                entered_tx.send(()).ok();
            }
        }));
        ctrl.set_mode(MastMode::Active).unwrap();

        let worker = {
            let ctrl = ctrl.clone();
            thread::spawn(move || exec(&ctrl, &mv))
        };
        entered_rx.recv().unwrap();
        assert!(exec(&ctrl, &halt).unwrap().is_ok());

        assert_eq!(worker.join().unwrap().unwrap().status, MastStatus::HaltedAbort);
    }

    #[test]
    fn test_invalid_mast_payload() {
        let ctrl = fixtures::ready_ctrl();
        let r = exec_json(&ctrl, r#"{"type": "MAST", "payload": {"Explode": {}}}"#).unwrap();
        assert_eq!(r.status, MastStatus::Validation);
    }

    #[test]
    fn test_self_test_tc() {
        let ctrl = fixtures::ready_ctrl();
        let r = exec_cmd(&ctrl, &MastCmd::SelfTest);
        assert!(r.is_ok());

        match r.payload {
            MastPayload::Json(s) => {
                let report: SelfTestReport = serde_json::from_str(&s).unwrap();
                assert_eq!(report.status, SelfTestStatus::Ok);
            }
            p => panic!("Unexpected payload {:?}", p),
        }
    }
}

//! Sample workflows and mast primitives
//!
//! Retrieve and dump are multi step workflows. They hold the command pipeline for their whole
//! duration, check for halts between every step and always finish with the mast back at home,
//! unless a halt preempted them in which case the joints are left halted where they stopped.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::{
    ir_cam::ImageRef,
    mast::{BinId, EndEffectorPose, JointId, MastConfig, MastMode, Position3},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{lock, MastCtrl, MastError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Outcome of a sample verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleVerificationResult {
    /// Image taken before scooping
    pub before: ImageRef,

    /// Image taken after scooping
    pub after: ImageRef,

    /// True if a sample was found in the scoop
    pub success: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MastCtrl {
    /// Retrieve a sample at the given location, in robot coordinates.
    ///
    /// The scoop is lowered onto the target with the retrieve attack angle, closed, and the
    /// result checked by comparing images taken before and after scooping.
    pub fn sample_retrieve(&self, target: Position3) -> Result<SampleVerificationResult, MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode("SampleRetrieve", MastMode::Active)?;

        let pose = EndEffectorPose {
            x_m: target.x_m,
            y_m: target.y_m,
            z_m: target.z_m,
            attack_rad: self.params.sample.retrieve_attack_rad,
        };
        let plan = self.plan_scoop_pose(&pose, self.params.sample.scoop_open_rad)?;

        *lock(&self.sample_coords) = Some(target);
        info!("Retrieving sample at {:?}", target);

        let faulted = self.registry().faulted();
        let start_seq = self.halt_seq();
        let result = self.retrieve_steps(&plan, start_seq);

        match &result {
            Ok(r) => info!("Sample retrieved and verified ({} -> {})", r.before, r.after),
            Err(e) => warn!("Sample retrieve failed: {}", e),
        }

        self.finish_workflow(result, start_seq, &faulted)
    }

    fn retrieve_steps(
        &self,
        plan: &MastConfig,
        start_seq: u64,
    ) -> Result<SampleVerificationResult, MastError> {
        self.execute_move(plan)?;
        self.check_halt(start_seq)?;

        let before = lock(&self.imaging).capture_save()?;
        info!("Before image saved as {}", before);
        self.check_halt(start_seq)?;

        self.move_scoop(self.params.sample.scoop_closed_rad)?;
        self.check_halt(start_seq)?;

        let after = lock(&self.imaging).capture_save()?;
        info!("After image saved as {}", after);
        self.check_halt(start_seq)?;

        let success = lock(&self.imaging).verify_sample(&before, &after)?;
        let result = SampleVerificationResult {
            before,
            after,
            success,
        };

        match success {
            true => Ok(result),
            false => Err(MastError::SampleNotVerified(result)),
        }
    }

    /// Compare two images for the presence of a sample.
    pub fn sample_verify(
        &self,
        before: &ImageRef,
        after: &ImageRef,
    ) -> Result<SampleVerificationResult, MastError> {
        let success = lock(&self.imaging).verify_sample(before, after)?;

        Ok(SampleVerificationResult {
            before: before.clone(),
            after: after.clone(),
            success,
        })
    }

    /// Dump the sample held in the scoop into a bin.
    pub fn sample_dump(&self, bin_id: BinId) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode("SampleDump", MastMode::Active)?;

        let faulted = self.registry().faulted();
        let start_seq = self.halt_seq();
        let result = self.dump_steps(bin_id, start_seq);

        if let Err(ref e) = result {
            warn!("Sample dump into {} failed: {}", bin_id, e);
        }

        self.finish_workflow(result, start_seq, &faulted)
    }

    fn dump_steps(&self, bin_id: BinId, start_seq: u64) -> Result<(), MastError> {
        let bin = lock(&self.bins).get(bin_id)?;

        let pose = EndEffectorPose {
            x_m: bin.x_m,
            y_m: bin.y_m,
            z_m: bin.z_m,
            attack_rad: self.params.sample.dump_attack_rad,
        };
        let plan = self.plan_scoop_pose(&pose, self.params.sample.scoop_closed_rad)?;

        info!("Dumping sample into {} at {:?}", bin_id, bin);
        self.execute_move(&plan)?;
        self.check_halt(start_seq)?;

        self.move_scoop(self.params.sample.scoop_open_rad)?;
        info!("Sample dumped into {}", bin_id);

        Ok(())
    }

    /// Close the scoop.
    pub fn scoop(&self) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode("Scoop", MastMode::Active)?;

        self.move_scoop(self.params.sample.scoop_closed_rad)
    }

    /// Open the scoop.
    pub fn drop_sample(&self) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode("Drop", MastMode::Active)?;

        self.move_scoop(self.params.sample.scoop_open_rad)
    }

    pub fn get_sample_coor(&self) -> Result<Position3, MastError> {
        self.check_frame_gate()?;
        lock(&self.sample_coords).ok_or(MastError::NoSampleCoordinates)
    }

    /// Store the location of a sample found by another subsystem.
    pub fn forward_sample_coor(&self, coords: Position3) -> Result<(), MastError> {
        self.check_frame_gate()?;
        let _busy = self.claim()?;

        if !(coords.x_m.is_finite() && coords.y_m.is_finite() && coords.z_m.is_finite()) {
            return Err(MastError::InvalidValue("sample coordinates must be finite"));
        }

        info!("Sample coordinates set to {:?}", coords);
        *lock(&self.sample_coords) = Some(coords);
        Ok(())
    }

    // ---- SCAN PRIMITIVES ----

    pub fn turn_right(&self, angle_deg: f64) -> Result<(), MastError> {
        self.turn("TurnRight", self.params.scan.leader, -angle_deg)
    }

    pub fn turn_left(&self, angle_deg: f64) -> Result<(), MastError> {
        self.turn("TurnLeft", self.params.scan.leader, angle_deg)
    }

    pub fn turn_up(&self, angle_deg: f64) -> Result<(), MastError> {
        self.turn("TurnUp", self.params.scan.follower, angle_deg)
    }

    pub fn turn_down(&self, angle_deg: f64) -> Result<(), MastError> {
        self.turn("TurnDown", self.params.scan.follower, -angle_deg)
    }

    /// Rotate a scan joint relative to its current position.
    fn turn(&self, op: &'static str, id: JointId, delta_deg: f64) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode(op, MastMode::Scan)?;

        if !delta_deg.is_finite() {
            return Err(MastError::InvalidValue("turn angle must be finite"));
        }

        let mut targets = MastConfig::new();
        targets.set(id, self.registry().value(id)? + delta_deg.to_radians());
        self.move_joints(&targets)
    }

    // ---- HELPERS ----

    /// Plan a move placing the end effector at `pose` with the scoop at `scoop_rad`.
    fn plan_scoop_pose(&self, pose: &EndEffectorPose, scoop_rad: f64) -> Result<MastConfig, MastError> {
        let permit = self.permit();
        let reg = self.registry();

        let mut targets = self.frame.inverse(pose, &reg, &reg.values())?;
        targets.set(self.params.sample.scoop_joint, scoop_rad);

        reg.plan(&permit, &targets)
    }

    fn move_scoop(&self, scoop_rad: f64) -> Result<(), MastError> {
        let mut targets = MastConfig::new();
        targets.set(self.params.sample.scoop_joint, scoop_rad);
        self.move_joints(&targets)
    }

    /// Return home at the end of a workflow, keeping the first error encountered.
    fn finish_workflow<T>(
        &self,
        result: Result<T, MastError>,
        start_seq: u64,
        faulted_before: &[JointId],
    ) -> Result<T, MastError> {
        if self.halted_since(start_seq) {
            warn!("Workflow preempted by a halt, not returning home");
            return result.and(Err(MastError::HaltedAbort));
        }

        let home = self.return_home(faulted_before);

        match result {
            Ok(r) => home.map(|_| r),
            Err(e) => {
                if let Err(home_err) = home {
                    warn!("Could not return home after a failed workflow: {}", home_err);
                }
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mast_ctrl::{
        fixtures::{self, ready_ctrl},
        ActuatorError, HaltHandle, Imaging, ImagingError, JointState,
    };
    use crate::sim::SimIrCamera;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use comms_if::{eqpt::ir_cam::IrFrame, tc::mast::MastStatus};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;

    fn retrieve_target() -> Position3 {
        Position3 {
            x_m: 0.3,
            y_m: 0.0,
            z_m: 0.1,
        }
    }

    fn frame() -> IrFrame {
        IrFrame {
            timestamp: Utc::now(),
            filter_id: 0,
            exposure_ms: 100,
            average: 1,
        }
    }

    /// Camera which calls back into the test on every capture.
    struct HookedCamera {
        on_capture: Box<dyn FnMut() + Send>,
        num_saved: usize,
    }

    impl Imaging for HookedCamera {
        fn capture(&mut self) -> Result<IrFrame, ImagingError> {
            (self.on_capture)();
            Ok(frame())
        }

        fn save(&mut self) -> Result<ImageRef, ImagingError> {
            self.num_saved += 1;
            Ok(ImageRef(format!("img_{}", self.num_saved)))
        }

        fn get_image(&self, _image: &ImageRef) -> Result<IrFrame, ImagingError> {
            Ok(frame())
        }

        fn verify_sample(&mut self, _: &ImageRef, _: &ImageRef) -> Result<bool, ImagingError> {
            Ok(true)
        }
    }

    fn hooked(on_capture: impl FnMut() + Send + 'static) -> Box<dyn Imaging> {
        Box::new(HookedCamera {
            on_capture: Box::new(on_capture),
            num_saved: 0,
        })
    }

    #[test]
    fn test_reference_scenario() {
        let ctrl = ready_ctrl();
        ctrl.set_mode(MastMode::Active).unwrap();

        let result = ctrl.sample_retrieve(retrieve_target()).unwrap();
        assert!(result.success);
        assert_ne!(result.before, result.after);
        assert_eq!(ctrl.get_sample_coor().unwrap(), retrieve_target());
        assert_eq!(ctrl.get_joint_values().unwrap(), ctrl.get_home_config().unwrap());

        ctrl.sample_dump(BinId(1)).unwrap();
        assert_eq!(ctrl.get_joint_values().unwrap(), ctrl.get_home_config().unwrap());

        let err = ctrl.sample_dump(BinId(2)).unwrap_err();
        assert!(matches!(err, MastError::BinNotFound(BinId(2))));
        assert_eq!(err.status(), MastStatus::Validation);
        assert_eq!(ctrl.get_joint_values().unwrap(), ctrl.get_home_config().unwrap());
    }

    #[test]
    fn test_dump_returns_home_after_unknown_bin() {
        let ctrl = ready_ctrl();
        ctrl.set_mode(MastMode::Active).unwrap();
        ctrl.set_joint_value(JointId(1), 0.7).unwrap();

        assert!(ctrl.sample_dump(BinId(5)).is_err());
        assert_eq!(ctrl.get_joint_values().unwrap(), ctrl.get_home_config().unwrap());
    }

    #[test]
    fn test_dump_returns_home_after_actuator_glitch() {
        let (ctrl, faults) = fixtures::active_ctrl_with_faults();

        // Fails mid way through the move to the bin
        faults.glitch(JointId(3), 4);
        let err = ctrl.sample_dump(BinId(1)).unwrap_err();
        assert!(matches!(
            err,
            MastError::Actuator(ActuatorError::Timeout(JointId(3)))
        ));
        assert_eq!(err.status(), MastStatus::Hardware);

        let home = ctrl.get_home_config().unwrap();
        let values = ctrl.get_joint_values().unwrap();
        for (id, home_rad) in home.iter() {
            assert_relative_eq!(values.get(id).unwrap(), home_rad, epsilon = 1e-6);
        }
        assert!(ctrl
            .registry()
            .states()
            .values()
            .all(|s| *s == JointState::Idle));
    }

    #[test]
    fn test_persistent_fault_leaves_other_joints_home() {
        let (ctrl, faults) = fixtures::active_ctrl_with_faults();
        ctrl.set_joint_value(JointId(2), 1.0).unwrap();

        faults.fail(JointId(3));
        let err = ctrl.sample_retrieve(retrieve_target()).unwrap_err();
        assert_eq!(err.status(), MastStatus::Hardware);

        // The shoulder returned home, the elbow stays faulted
        assert_relative_eq!(ctrl.get_joint_value(JointId(2)).unwrap(), 1.2, epsilon = 1e-6);
        assert_eq!(
            ctrl.registry().state(JointId(3)).unwrap(),
            JointState::Faulted
        );
        assert_eq!(
            ctrl.registry().state(JointId(2)).unwrap(),
            JointState::Idle
        );
    }

    #[test]
    fn test_fault_from_before_workflow_is_not_reset() {
        let (ctrl, faults) = fixtures::active_ctrl_with_faults();

        // Scoop faults part way open
        faults.glitch(JointId(5), 3);
        assert!(ctrl.drop_sample().is_err());
        let scoop_rad = ctrl.get_joint_value(JointId(5)).unwrap();
        assert!(scoop_rad > 0.0);
        assert_eq!(
            ctrl.registry().state(JointId(5)).unwrap(),
            JointState::Faulted
        );

        assert!(matches!(
            ctrl.sample_dump(BinId(1)),
            Err(MastError::JointNotReady { id: JointId(5), .. })
        ));
        assert_eq!(
            ctrl.registry().state(JointId(5)).unwrap(),
            JointState::Faulted
        );
        assert_relative_eq!(ctrl.get_joint_value(JointId(5)).unwrap(), scoop_rad);
    }

    #[test]
    fn test_retrieve_requires_active() {
        let ctrl = ready_ctrl();
        assert!(matches!(
            ctrl.sample_retrieve(retrieve_target()),
            Err(MastError::WrongMode {
                required: MastMode::Active,
                current: MastMode::Stowage,
                ..
            })
        ));
        assert!(ctrl.get_sample_coor().is_err());
    }

    #[test]
    fn test_unreachable_retrieve_leaves_registry() {
        let ctrl = ready_ctrl();
        ctrl.set_mode(MastMode::Active).unwrap();
        ctrl.set_joint_value(JointId(4), 0.3).unwrap();
        let before = ctrl.get_joint_values().unwrap();

        let err = ctrl
            .sample_retrieve(Position3 {
                x_m: 1.0,
                y_m: 0.0,
                z_m: 0.0,
            })
            .unwrap_err();
        assert_eq!(err.status(), MastStatus::Reachability);
        assert_eq!(ctrl.get_joint_values().unwrap(), before);
        assert!(matches!(
            ctrl.get_sample_coor(),
            Err(MastError::NoSampleCoordinates)
        ));
    }

    #[test]
    fn test_failed_verification_returns_home() {
        let mut camera = SimIrCamera::new(Default::default());
        camera.script_verify(false);
        let ctrl = fixtures::with_imaging(Box::new(camera), true);
        ctrl.set_mode(MastMode::Active).unwrap();

        let err = ctrl.sample_retrieve(retrieve_target()).unwrap_err();
        assert_eq!(err.status(), MastStatus::Workflow);
        match err {
            MastError::SampleNotVerified(r) => assert!(!r.success),
            e => panic!("Unexpected error {:?}", e),
        }
        assert_eq!(ctrl.get_joint_values().unwrap(), ctrl.get_home_config().unwrap());

        // No internal retry, the next retrieve uses the default outcome
        assert!(ctrl.sample_retrieve(retrieve_target()).unwrap().success);
    }

    #[test]
    fn test_halt_all_during_retrieve() {
        let handle: Arc<Mutex<Option<HaltHandle>>> = Arc::new(Mutex::new(None));
        let hook_handle = handle.clone();

        let ctrl = fixtures::with_imaging(
            hooked(move || {
                if let Some(h) = hook_handle.lock().unwrap().as_ref() {
                    h.halt_all();
                }
            }),
            true,
        );
        ctrl.set_mode(MastMode::Active).unwrap();
        *handle.lock().unwrap() = Some(ctrl.halt_handle());

        let err = ctrl.sample_retrieve(retrieve_target()).unwrap_err();
        assert!(matches!(err, MastError::HaltedAbort));
        assert_eq!(err.status(), MastStatus::HaltedAbort);

        let states = ctrl.registry().states();
        assert!(states.values().all(|s| *s == JointState::Halted));

        // Stopped at the retrieve pose, not returned home
        assert_relative_eq!(
            ctrl.get_joint_value(JointId(3)).unwrap(),
            -1.5863,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_contention_while_retrieving() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let ctrl = Arc::new(fixtures::with_imaging(
            hooked(move || {
                entered_tx.send(()).ok();
                release_rx.lock().unwrap().recv().ok();
            }),
            true,
        ));
        ctrl.set_mode(MastMode::Active).unwrap();

        let worker = {
            let ctrl = ctrl.clone();
            thread::spawn(move || ctrl.sample_retrieve(retrieve_target()))
        };

        // Blocked on the before image
        entered_rx.recv().unwrap();
        assert!(ctrl.is_busy());
        assert_eq!(
            ctrl.set_joint_value(JointId(1), 0.2).unwrap_err().status(),
            MastStatus::Contention
        );
        assert!(matches!(ctrl.sample_dump(BinId(1)), Err(MastError::Busy)));

        // Queries are not blocked
        assert_eq!(ctrl.get_mode(), MastMode::Active);

        release_tx.send(()).unwrap();
        entered_rx.recv().unwrap();
        release_tx.send(()).unwrap();

        assert!(worker.join().unwrap().unwrap().success);
        assert!(!ctrl.is_busy());
    }

    #[test]
    fn test_scoop_and_drop() {
        let ctrl = ready_ctrl();
        assert!(ctrl.scoop().is_err());

        ctrl.set_mode(MastMode::Active).unwrap();
        ctrl.drop_sample().unwrap();
        assert_relative_eq!(ctrl.get_joint_value(JointId(5)).unwrap(), 1.2);
        ctrl.scoop().unwrap();
        assert_relative_eq!(ctrl.get_joint_value(JointId(5)).unwrap(), 0.0);
    }

    #[test]
    fn test_sample_coordinates() {
        let ctrl = fixtures::uninit_ctrl();
        assert_eq!(
            ctrl.get_sample_coor().unwrap_err().status(),
            MastStatus::NotInitialised
        );

        ctrl.set_root_frame(Default::default()).unwrap();
        assert!(matches!(
            ctrl.get_sample_coor(),
            Err(MastError::NoSampleCoordinates)
        ));

        let coords = Position3 {
            x_m: 0.1,
            y_m: -0.2,
            z_m: 0.0,
        };
        ctrl.forward_sample_coor(coords).unwrap();
        assert_eq!(ctrl.get_sample_coor().unwrap(), coords);

        assert!(ctrl
            .forward_sample_coor(Position3 {
                x_m: f64::NAN,
                ..coords
            })
            .is_err());
        assert_eq!(ctrl.get_sample_coor().unwrap(), coords);
    }

    #[test]
    fn test_turns() {
        let ctrl = ready_ctrl();
        ctrl.set_mode(MastMode::Active).unwrap();
        assert!(matches!(
            ctrl.turn_right(10.0),
            Err(MastError::WrongMode {
                required: MastMode::Scan,
                ..
            })
        ));

        ctrl.set_mode(MastMode::Scan).unwrap();

        ctrl.turn_right(10.0).unwrap();
        let leader = ctrl.get_joint_value(JointId(1)).unwrap();
        assert_relative_eq!(leader, -10f64.to_radians(), epsilon = 1e-9);
        assert_relative_eq!(
            ctrl.get_joint_value(JointId(2)).unwrap() - leader,
            1.2,
            epsilon = 1e-9
        );

        ctrl.turn_left(10.0).unwrap();
        assert_relative_eq!(ctrl.get_joint_value(JointId(1)).unwrap(), 0.0, epsilon = 1e-9);

        ctrl.turn_up(5.0).unwrap();
        assert_relative_eq!(
            ctrl.get_joint_value(JointId(2)).unwrap(),
            1.2 + 5f64.to_radians(),
            epsilon = 1e-9
        );
        ctrl.turn_down(5.0).unwrap();
        assert_relative_eq!(ctrl.get_joint_value(JointId(2)).unwrap(), 1.2, epsilon = 1e-9);
    }

    #[test]
    fn test_standalone_verify() {
        let mut camera = SimIrCamera::new(Default::default());
        let before = camera.capture_save().unwrap();
        let after = camera.capture_save().unwrap();
        camera.script_verify(false);

        let ctrl = fixtures::with_imaging(Box::new(camera), false);
        let r = ctrl.sample_verify(&before, &after).unwrap();
        assert!(!r.success);
        assert!(ctrl.sample_verify(&before, &after).unwrap().success);
    }
}

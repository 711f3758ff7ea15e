//! Implementations for the MastCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

// Internal
use super::{
    Actuator, ArmModel, BinMap, Imaging, JointRegistry, JointState, KinematicFrame, MastError,
    Params, ScanCoupling, SelfTestRunner, SelfTestStatus,
};
use comms_if::eqpt::mast::{
    BinId, EndEffectorPose, JointId, JointParams, MastConfig, MastMode, Position3, RootFrame,
};
use util::archive::Archiver;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Mast control module state
pub struct MastCtrl {
    pub(crate) params: Params,

    pub(crate) registry: Arc<Mutex<JointRegistry>>,

    /// Incremented on every halt so that in-flight operations can detect them.
    pub(crate) halt_seq: Arc<AtomicU64>,

    busy: AtomicBool,

    pub(crate) mode: Mutex<MastMode>,

    pub(crate) frame: KinematicFrame,

    pub(crate) bins: Mutex<BinMap>,

    pub(crate) sample_coords: Mutex<Option<Position3>>,

    pub(crate) actuator: Mutex<Box<dyn Actuator>>,

    pub(crate) imaging: Mutex<Box<dyn Imaging>>,

    pub(crate) self_test: Mutex<SelfTestRunner>,
}

/// Handle allowing joints to be halted from outside of the command pipeline.
#[derive(Clone)]
pub struct HaltHandle {
    registry: Arc<Mutex<JointRegistry>>,
    halt_seq: Arc<AtomicU64>,
}

/// Claim on the mast command pipeline, released on drop.
pub(crate) struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

/// Diagnostics snapshot of the mast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastReport {
    pub mode: MastMode,
    pub root_frame: Option<RootFrame>,
    pub bins: BTreeMap<BinId, Position3>,
    pub joints: Vec<JointReport>,
    pub scan_coupling: Option<ScanCoupling>,
    pub sample_coords: Option<Position3>,
    pub last_self_test: Option<SelfTestStatus>,
    pub busy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointReport {
    pub id: JointId,
    pub name: String,
    pub value_rad: f64,
    pub state: JointState,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MastCtrl {
    /// Create a new controller in STOWAGE mode with every joint idle at home.
    pub fn new(
        params: Params,
        actuator: Box<dyn Actuator>,
        imaging: Box<dyn Imaging>,
    ) -> Result<Self, MastError> {
        let registry = JointRegistry::new(&params.joints)?;

        let frame = KinematicFrame::new(
            Box::new(ArmModel::new(&params.geometry)),
            params.geometry.ik_tolerance_m,
            params.geometry.ik_tolerance_rad,
        );

        for id in frame.joints().iter().chain(
            [
                params.scan.leader,
                params.scan.follower,
                params.sample.scoop_joint,
            ]
            .iter(),
        ) {
            registry.joint(*id)?;
        }

        info!("MastCtrl initialised with {} joints", registry.ids().len());

        Ok(Self {
            params,
            registry: Arc::new(Mutex::new(registry)),
            halt_seq: Arc::new(AtomicU64::new(0)),
            busy: AtomicBool::new(false),
            mode: Mutex::new(MastMode::Stowage),
            frame,
            bins: Mutex::new(BinMap::new()),
            sample_coords: Mutex::new(None),
            actuator: Mutex::new(actuator),
            imaging: Mutex::new(imaging),
            self_test: Mutex::new(SelfTestRunner::new()),
        })
    }

    /// Archive self test log entries with the given archiver.
    pub fn with_self_test_archive(self, archiver: Archiver) -> Self {
        lock(&self.self_test).set_archiver(archiver);
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, JointRegistry> {
        lock(&self.registry)
    }

    pub fn halt_handle(&self) -> HaltHandle {
        HaltHandle {
            registry: self.registry.clone(),
            halt_seq: self.halt_seq.clone(),
        }
    }

    // ---- PIPELINE ----

    /// Claim the command pipeline, failing if another command holds it.
    pub(crate) fn claim(&self) -> Result<BusyGuard<'_>, MastError> {
        match self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(BusyGuard { busy: &self.busy }),
            Err(_) => {
                warn!("Rejecting command, another mast command is in progress");
                Err(MastError::Busy)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn halt_seq(&self) -> u64 {
        self.halt_seq.load(Ordering::Acquire)
    }

    pub(crate) fn halted_since(&self, seq: u64) -> bool {
        self.halt_seq() != seq
    }

    /// Return a halted abort if a halt occured since `seq`.
    pub(crate) fn check_halt(&self, seq: u64) -> Result<(), MastError> {
        match self.halted_since(seq) {
            true => Err(MastError::HaltedAbort),
            false => Ok(()),
        }
    }

    // ---- GATES ----

    fn not_initialised(&self) -> MastError {
        MastError::NotInitialised {
            root_frame_set: self.frame.is_root_set(),
            num_bins: lock(&self.bins).len(),
        }
    }

    /// Check the root frame has been set.
    pub(crate) fn check_frame_gate(&self) -> Result<(), MastError> {
        match self.frame.is_root_set() {
            true => Ok(()),
            false => Err(self.not_initialised()),
        }
    }

    /// Check the root frame has been set and at least one bin registered.
    pub(crate) fn check_full_gate(&self) -> Result<(), MastError> {
        if self.frame.is_root_set() && !lock(&self.bins).is_empty() {
            Ok(())
        } else {
            Err(self.not_initialised())
        }
    }

    pub(crate) fn require_mode(&self, op: &'static str, required: MastMode) -> Result<(), MastError> {
        let current = self.get_mode();
        match current == required {
            true => Ok(()),
            false => Err(MastError::WrongMode {
                op,
                required,
                current,
            }),
        }
    }

    // ---- INITIALISATION ----

    pub fn set_root_frame(&self, frame: RootFrame) -> Result<(), MastError> {
        let _busy = self.claim()?;
        self.frame.set_root(frame)
    }

    pub fn set_bin_position(&self, id: BinId, pos: Position3) -> Result<(), MastError> {
        let _busy = self.claim()?;
        lock(&self.bins).set(id, pos)
    }

    pub fn get_bin_position(&self, id: BinId) -> Result<Position3, MastError> {
        lock(&self.bins).get(id)
    }

    pub fn set_joint_params(&self, id: JointId, params: JointParams) -> Result<(), MastError> {
        self.check_frame_gate()?;
        let _busy = self.claim()?;
        self.registry().set_params(id, params)
    }

    pub fn get_joint_params(&self, id: JointId) -> Result<JointParams, MastError> {
        self.check_frame_gate()?;
        self.registry().params(id)
    }

    // ---- JOINT CONTROL ----

    /// Validate joint targets against the current mode and limits, then move to them.
    pub(crate) fn move_joints(&self, targets: &MastConfig) -> Result<(), MastError> {
        let permit = self.permit();
        let plan = self.registry().plan(&permit, targets)?;
        self.execute_move(&plan)
    }

    pub fn set_joint_value(&self, id: JointId, value_rad: f64) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;

        let mut targets = MastConfig::new();
        targets.set(id, value_rad);
        self.move_joints(&targets)
    }

    /// Move several joints at once, either every target is accepted or none is.
    pub fn set_joint_values(&self, config: &MastConfig) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.move_joints(config)
    }

    pub fn get_joint_value(&self, id: JointId) -> Result<f64, MastError> {
        self.check_frame_gate()?;
        self.registry().value(id)
    }

    pub fn get_joint_values(&self) -> Result<MastConfig, MastError> {
        self.check_frame_gate()?;
        Ok(self.registry().values())
    }

    pub fn get_home_config(&self) -> Result<MastConfig, MastError> {
        self.check_frame_gate()?;
        Ok(self.registry().home_config())
    }

    pub fn home_joint(&self, id: JointId) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;

        let home_rad = self.registry().params(id)?.pos_home_rad;
        let mut targets = MastConfig::new();
        targets.set(id, home_rad);
        self.move_joints(&targets)
    }

    /// Home every joint unlocked by the current mode.
    pub fn home_all_joints(&self) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;

        let permit = self.permit();
        let home = self.registry().home_config();
        let targets: MastConfig = home.iter().filter(|(id, _)| permit.allows(*id)).collect();

        if targets.is_empty() {
            if let Some((id, _)) = home.iter().next() {
                return Err(MastError::ModeLocked {
                    id,
                    mode: permit.mode(),
                });
            }
        }

        self.move_joints(&targets)
    }

    /// Return every joint to home, used at the end of the sample workflows.
    ///
    /// Idle joints are homed together first. A joint which faulted during the workflow, that is
    /// one not listed in `faulted_before`, is then reset and commanded home on its own. Any other
    /// joint which is not idle stays where it is. The first error encountered is returned.
    pub(crate) fn return_home(&self, faulted_before: &[JointId]) -> Result<(), MastError> {
        let permit = self.permit();
        let (plan, not_ready) = {
            let reg = self.registry();
            let pending = reg.pending(&reg.home_config(), self.params.settle_tolerance_rad);
            let is_idle = |id: JointId| matches!(reg.state(id), Ok(JointState::Idle));

            let ready: MastConfig = pending.iter().filter(|(id, _)| is_idle(*id)).collect();
            let not_ready: MastConfig = pending.iter().filter(|(id, _)| !is_idle(*id)).collect();

            (reg.plan(&permit, &ready)?, not_ready)
        };

        info!("Returning home");
        let mut result = self.execute_move(&plan);

        for (id, home_rad) in not_ready.iter() {
            let state = self.registry().state(id)?;

            let recovered = if state == JointState::Faulted && !faulted_before.contains(&id) {
                warn!("{} faulted during the workflow, resetting it to return home", id);
                self.registry().reset(id)?;

                let mut target = MastConfig::new();
                target.set(id, home_rad);
                self.move_joints(&target)
            } else {
                warn!("{} is {}, it cannot return home", id, state);
                Err(MastError::JointNotReady { id, state })
            };

            if result.is_ok() {
                result = recovered;
            }
        }

        result
    }

    pub fn halt_joint(&self, id: JointId) -> Result<(), MastError> {
        self.halt_handle().halt_joint(id)
    }

    pub fn halt_all_joints(&self) {
        self.halt_handle().halt_all()
    }

    pub fn reset_joint(&self, id: JointId) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.registry().reset(id)
    }

    pub fn reset_all_joints(&self) -> Result<(), MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.registry().reset_all()
    }

    // ---- POSE ----

    /// Move the end effector to the given pose, returning the configuration moved to.
    pub fn set_end_effector_pose(&self, pose: &EndEffectorPose) -> Result<MastConfig, MastError> {
        self.check_full_gate()?;
        let _busy = self.claim()?;
        self.require_mode("SetEndEffectorPos", MastMode::Active)?;

        let config = {
            let reg = self.registry();
            self.frame.inverse(pose, &reg, &reg.values())?
        };
        debug!("End effector pose {:?} reached by {:?}", pose, config);

        self.move_joints(&config)?;
        Ok(config)
    }

    pub fn get_end_effector_pose(&self) -> Result<EndEffectorPose, MastError> {
        self.check_frame_gate()?;
        let values = self.registry().values();
        self.frame.forward(&values)
    }

    // ---- DIAGNOSTICS ----

    pub fn report(&self) -> MastReport {
        let (joints, scan_coupling) = {
            let reg = self.registry();
            let joints = reg
                .joints()
                .map(|j| JointReport {
                    id: j.id,
                    name: j.name.clone(),
                    value_rad: j.value_rad,
                    state: j.state(),
                })
                .collect();
            (joints, reg.coupling())
        };

        MastReport {
            mode: self.get_mode(),
            root_frame: self.frame.root(),
            bins: lock(&self.bins).bins().clone(),
            joints,
            scan_coupling,
            sample_coords: *lock(&self.sample_coords),
            last_self_test: lock(&self.self_test).last_status(),
            busy: self.is_busy(),
        }
    }

    /// Diagnostics report as JSON text.
    pub fn get_report(&self) -> String {
        serde_json::to_string(&self.report())
            .unwrap_or_else(|e| format!("{{\"error\": \"could not serialise report: {}\"}}", e))
    }
}

impl HaltHandle {
    /// Halt a single joint.
    pub fn halt_joint(&self, id: JointId) -> Result<(), MastError> {
        lock(&self.registry).halt(id)?;
        self.halt_seq.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn halt_all(&self) {
        lock(&self.registry).halt_all();
        self.halt_seq.fetch_add(1, Ordering::AcqRel);
    }
}

impl<'a> Drop for BusyGuard<'a> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

//! Motion executor, drives joints to their targets one cycle at a time

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::MastConfig;
use log::{debug, error, trace, warn};
use std::{thread, time::Duration};

use super::{lock, profile, JointEvent, JointState, MastCtrl, MastError};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MastCtrl {
    /// Move the joints to the targets of a validated plan.
    ///
    /// Every joint in the plan moves concurrently, each following its own profile. The registry
    /// is only locked for the duration of a cycle so that halts are observed at the start of the
    /// next one, at which point all joints of the move are stopped.
    pub(crate) fn execute_move(&self, plan: &MastConfig) -> Result<(), MastError> {
        if plan.is_empty() {
            return Ok(());
        }

        let start_seq = self.halt_seq();
        debug!("Starting move to {:?}", plan);

        {
            let mut reg = self.registry();
            for (id, _) in plan.iter() {
                reg.joint(id)?.check_ready()?;
            }
            for (id, _) in plan.iter() {
                reg.joint_mut(id)?.apply(JointEvent::StartMotion)?;
            }
        }

        let dt_s = self.params.cycle_period_s;

        for cycle in 0..self.params.max_move_cycles {
            match self.motion_cycle(plan, dt_s, start_seq) {
                Ok(true) => {
                    debug!("Move complete after {} cycles", cycle + 1);
                    return Ok(());
                }
                Ok(false) => (),
                Err(e) => {
                    self.abort_move(plan);
                    return Err(e);
                }
            }

            if self.params.realtime {
                thread::sleep(Duration::from_secs_f64(dt_s));
            }
        }

        error!(
            "Move to {:?} did not complete within {} cycles",
            plan, self.params.max_move_cycles
        );
        {
            let mut reg = self.registry();
            for (id, _) in plan.iter() {
                if let Ok(j) = reg.joint_mut(id) {
                    if j.state() == JointState::Moving {
                        j.apply(JointEvent::Fault).ok();
                    }
                }
            }
        }
        self.abort_move(plan);

        Err(MastError::MotionTimeout(self.params.max_move_cycles))
    }

    /// Execute one motion cycle, returning true once every joint is at its target.
    ///
    /// Joints are settled under the same registry lock as their final command.
    fn motion_cycle(&self, plan: &MastConfig, dt_s: f64, start_seq: u64) -> Result<bool, MastError> {
        let mut reg = self.registry();

        // Halts change the joint state immediately, the move is abandoned here
        let interrupted = self.halted_since(start_seq)
            || plan
                .iter()
                .any(|(id, _)| !matches!(reg.state(id), Ok(JointState::Moving)));
        if interrupted {
            warn!("Move interrupted by a halt");
            return Err(MastError::HaltedAbort);
        }

        let mut actuator = lock(&self.actuator);
        let tolerance_rad = self.params.settle_tolerance_rad;
        let mut done = true;

        for (id, target_rad) in plan.iter() {
            let joint = reg.joint_mut(id)?;

            let (pos_rad, vel_rads) = profile::step(
                joint.value_rad,
                joint.vel_rads,
                target_rad,
                &joint.params,
                dt_s,
                tolerance_rad,
            );

            let feedback = match actuator.command(id, pos_rad) {
                Ok(f) => f,
                Err(e) => {
                    error!("Actuator of {} failed: {}", id, e);
                    joint.apply(JointEvent::Fault)?;
                    return Err(e.into());
                }
            };

            if feedback.current_a > joint.params.curr_max_a {
                error!(
                    "{} drew {} A, above its limit of {} A",
                    id, feedback.current_a, joint.params.curr_max_a
                );
                joint.apply(JointEvent::Fault)?;
                return Err(MastError::Overcurrent {
                    id,
                    current_a: feedback.current_a,
                    limit_a: joint.params.curr_max_a,
                });
            }

            joint.value_rad = feedback.pos_rad;
            joint.vel_rads = vel_rads;
            trace!(
                "{}: {:.6} rad, {:.6} rad/s, {:.3} A",
                id,
                feedback.pos_rad,
                vel_rads,
                feedback.current_a
            );

            if (target_rad - feedback.pos_rad).abs() > tolerance_rad || vel_rads != 0.0 {
                done = false;
            }
        }

        if done {
            for (id, _) in plan.iter() {
                reg.joint_mut(id)?.apply(JointEvent::Settle)?;
            }
            reg.refresh_coupling();
        }

        Ok(done)
    }

    /// Stop every joint of an abandoned move.
    ///
    /// Joints still moving return to idle, halted and faulted joints keep their state.
    fn abort_move(&self, plan: &MastConfig) {
        let mut reg = self.registry();
        let mut actuator = lock(&self.actuator);

        for (id, _) in plan.iter() {
            if let Err(e) = actuator.stop(id) {
                warn!("Could not stop {}: {}", id, e);
            }

            if let Ok(j) = reg.joint_mut(id) {
                if j.state() == JointState::Moving {
                    j.apply(JointEvent::Settle).ok();
                }
                j.vel_rads = 0.0;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

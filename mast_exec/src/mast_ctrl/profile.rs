//! Trapezoidal joint motion profile

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::mast::JointParams;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Advance a joint one cycle towards its target.
///
/// The velocity is bounded by the joint's velocity ceiling and by the velocity from which the
/// joint can still stop at the target under its acceleration ceiling. The change in velocity over
/// the cycle is bounded by the acceleration ceiling. Once the joint would reach the target within
/// the cycle it is snapped onto it and stopped.
///
/// Returns the new `(position, velocity)` of the joint.
pub fn step(
    pos_rad: f64,
    vel_rads: f64,
    target_rad: f64,
    limits: &JointParams,
    dt_s: f64,
    tolerance_rad: f64,
) -> (f64, f64) {
    let err_rad = target_rad - pos_rad;

    if err_rad.abs() <= tolerance_rad {
        return (target_rad, 0.0);
    }

    // Fastest velocity that can still be brought to zero at the target
    let stopping_rads = (2.0 * limits.acc_max_rads2 * err_rad.abs()).sqrt();
    let desired_rads = err_rad.signum() * limits.vel_max_rads.min(stopping_rads);

    let max_dv = limits.acc_max_rads2 * dt_s;
    let new_vel_rads = (vel_rads + (desired_rads - vel_rads).max(-max_dv).min(max_dv))
        .max(-limits.vel_max_rads)
        .min(limits.vel_max_rads);

    let step_rad = new_vel_rads * dt_s;

    if step_rad * err_rad > 0.0 && step_rad.abs() >= err_rad.abs() {
        (target_rad, 0.0)
    } else {
        (pos_rad + step_rad, new_vel_rads)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

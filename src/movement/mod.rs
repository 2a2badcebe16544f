//! Three interchangeable movement strategies for the track-target
//! objective (spec §4.7).

mod directly_pid;
mod directly_upward;
mod radially_outward;

pub use directly_pid::DirectlyPid;
pub use directly_upward::DirectlyUpward;
pub use radially_outward::RadiallyOutward;

use crate::pose::Pose;
use crate::robot_driver::RobotDriver;

/// Shared contract every movement algorithm implements.
pub trait MovementAlgorithm: Send {
    /// Decides and issues (at most) one motion primitive for this tick.
    /// Returns `(success, normalize_force_hint)`: `success` mirrors the
    /// driver call's own result, and `normalize_force_hint` tells the
    /// caller whether this is a good moment to re-zero the force PID
    /// (set on algorithm phases that complete a full approach, e.g. the
    /// final descent).
    fn move_decision(
        &mut self,
        driver: &mut dyn RobotDriver,
        displacement_to_target: Pose,
        target_from_head: Pose,
        target_from_displacement: Pose,
        robot_pose: Pose,
        head_center: Pose,
    ) -> (bool, bool);

    /// Lifts to the configured safe height along the local outward radial
    /// from the head centre, then holds. Shared by every algorithm
    /// (spec §4.7, last paragraph).
    fn move_away_from_head(&mut self, driver: &mut dyn RobotDriver, robot_pose: Pose, head_center: Pose, safe_height: f64) -> bool {
        move_away_from_head_default(driver, robot_pose, head_center, safe_height)
    }

    /// Resets any internal phase/trajectory-segment index so the
    /// algorithm recovers cleanly from a mid-trajectory stop.
    fn reset_state(&mut self);
}

/// Horizontal unit vector pointing from `head_center` to `robot_pose`,
/// i.e. the local outward radial. Falls back to `+X` when the robot sits
/// exactly above the head centre.
pub(crate) fn radial_outward_unit(head_center: Pose, robot_pose: Pose) -> (f64, f64) {
    let dx = robot_pose.x - head_center.x;
    let dy = robot_pose.y - head_center.y;
    let norm = (dx * dx + dy * dy).sqrt();
    if norm < 1e-6 {
        (1.0, 0.0)
    } else {
        (dx / norm, dy / norm)
    }
}

const MOVE_AWAY_RETREAT_DISTANCE_MM: f64 = 30.0;

pub(crate) fn move_away_from_head_default(
    driver: &mut dyn RobotDriver,
    robot_pose: Pose,
    head_center: Pose,
    safe_height: f64,
) -> bool {
    let target_z = safe_height.max(robot_pose.z);
    let (ux, uy) = radial_outward_unit(head_center, robot_pose);
    let target = Pose::new(
        robot_pose.x + ux * MOVE_AWAY_RETREAT_DISTANCE_MM,
        robot_pose.y + uy * MOVE_AWAY_RETREAT_DISTANCE_MM,
        target_z,
        robot_pose.rx,
        robot_pose.ry,
        robot_pose.rz,
    );
    driver.move_linear(target)
}

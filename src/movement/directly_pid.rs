//! Directly-PID movement: issues small linear motions sized from the PID
//! Group's own outputs every tick, with Z coupled to the force-axis PID
//! loop when a force source is enabled (spec §4.3/§4.7).

use nalgebra::Vector3;

use crate::pid::PidGroup;
use crate::pose::Pose;
use crate::robot_driver::RobotDriver;

use super::MovementAlgorithm;

pub struct DirectlyPid {
    pid: PidGroup,
    tick_dt_seconds: f64,
    force_feedback: Option<f64>,
}

impl DirectlyPid {
    pub fn new(pid: PidGroup, tick_dt_seconds: f64) -> Self {
        DirectlyPid {
            pid,
            tick_dt_seconds,
            force_feedback: None,
        }
    }

    /// Supplies the filtered force reading for this tick's Z loop. Called
    /// by the controller before `move_decision` when a force source is
    /// enabled; left `None` otherwise.
    pub fn set_force_feedback(&mut self, value: Option<f64>) {
        self.force_feedback = value;
    }
}

impl MovementAlgorithm for DirectlyPid {
    fn move_decision(
        &mut self,
        driver: &mut dyn RobotDriver,
        displacement_to_target: Pose,
        _target_from_head: Pose,
        _target_from_displacement: Pose,
        robot_pose: Pose,
        _head_center: Pose,
    ) -> (bool, bool) {
        self.pid.update_translation(
            displacement_to_target.translation(),
            self.force_feedback,
            self.tick_dt_seconds,
        );
        self.pid.update_rotation(
            Vector3::new(displacement_to_target.rx, displacement_to_target.ry, displacement_to_target.rz),
            self.tick_dt_seconds,
        );

        let (translation, rotation) = self.pid.get_outputs();
        let commanded = Pose::new(
            robot_pose.x + translation.x,
            robot_pose.y + translation.y,
            robot_pose.z + translation.z,
            robot_pose.rx + rotation.x,
            robot_pose.ry + rotation.y,
            robot_pose.rz + rotation.z,
        );

        // Single motion primitive per tick, per spec §4.7.
        let ok = driver.move_linear(commanded);
        (ok, true)
    }

    fn reset_state(&mut self) {
        self.pid.clear();
        self.force_feedback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::PidGains;
    use crate::robot_driver::TestRobotDriver;

    #[test]
    fn test_move_decision_commands_pid_sized_step() {
        let pid = PidGroup::new(PidGains { kp: 1.0, ki: 0.0, kd: 0.0 }, 100.0, 50.0, false, 0.0);
        let mut algo = DirectlyPid::new(pid, 1.0 / 30.0);
        let mut driver = TestRobotDriver::new(1000.0);
        driver.connect();

        let robot_pose = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let displacement = Pose::new(-0.5, 0.0, 0.0, 0.0, 0.0, 0.0);

        let (success, hint) = algo.move_decision(&mut driver, displacement, Pose::identity(), Pose::identity(), robot_pose, Pose::identity());
        assert!(success);
        assert!(hint);
    }

    #[test]
    fn test_reset_state_clears_pid_memory() {
        let pid = PidGroup::new(PidGains::default(), 100.0, 50.0, false, 0.0);
        let mut algo = DirectlyPid::new(pid, 0.1);
        algo.set_force_feedback(Some(1.5));
        algo.reset_state();
        assert!(algo.force_feedback.is_none());
    }
}

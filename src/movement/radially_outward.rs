//! Radially-outward movement: retract along the head's outward radial
//! before approaching, to avoid crossing the head envelope (spec §4.7).

use crate::pose::Pose;
use crate::robot_driver::RobotDriver;

use super::{radial_outward_unit, MovementAlgorithm};

const RETRACT_DISTANCE_MM: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    ApproachAboveTarget,
    Descend,
}

pub struct RadiallyOutward {
    phase: Phase,
    arrival_cylinder_radius_mm: f64,
    safe_height: f64,
}

impl RadiallyOutward {
    pub fn new(arrival_cylinder_radius_mm: f64, safe_height: f64) -> Self {
        RadiallyOutward {
            phase: Phase::ApproachAboveTarget,
            arrival_cylinder_radius_mm,
            safe_height,
        }
    }

    fn within_arrival_cylinder(&self, robot_pose: Pose, target: Pose) -> bool {
        let horizontal = ((target.x - robot_pose.x).powi(2) + (target.y - robot_pose.y).powi(2)).sqrt();
        horizontal <= self.arrival_cylinder_radius_mm
    }
}

impl MovementAlgorithm for RadiallyOutward {
    fn move_decision(
        &mut self,
        driver: &mut dyn RobotDriver,
        _displacement_to_target: Pose,
        _target_from_head: Pose,
        target_from_displacement: Pose,
        robot_pose: Pose,
        head_center: Pose,
    ) -> (bool, bool) {
        let target = target_from_displacement;
        match self.phase {
            Phase::ApproachAboveTarget => {
                let safe_z = self.safe_height.max(robot_pose.z);
                if !self.within_arrival_cylinder(robot_pose, target) {
                    let (ux, uy) = radial_outward_unit(head_center, robot_pose);
                    let retreat = Pose::new(
                        robot_pose.x + ux * RETRACT_DISTANCE_MM,
                        robot_pose.y + uy * RETRACT_DISTANCE_MM,
                        safe_z,
                        robot_pose.rx,
                        robot_pose.ry,
                        robot_pose.rz,
                    );
                    return (driver.move_linear(retreat), false);
                }
                let above_target = Pose::new(target.x, target.y, safe_z, target.rx, target.ry, target.rz);
                let ok = driver.move_linear(above_target);
                if ok {
                    self.phase = Phase::Descend;
                }
                (ok, false)
            }
            Phase::Descend => {
                let ok = driver.move_linear(target);
                self.phase = Phase::ApproachAboveTarget;
                (ok, true)
            }
        }
    }

    fn reset_state(&mut self) {
        self.phase = Phase::ApproachAboveTarget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot_driver::TestRobotDriver;

    #[test]
    fn test_retreats_when_outside_arrival_cylinder() {
        let mut algo = RadiallyOutward::new(5.0, 150.0);
        let mut driver = TestRobotDriver::new(1000.0);
        driver.connect();
        let robot_pose = Pose::new(100.0, 0.0, 50.0, 0.0, 0.0, 0.0);
        let target = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let head_center = Pose::identity();
        let (success, hint) = algo.move_decision(&mut driver, Pose::identity(), Pose::identity(), target, robot_pose, head_center);
        assert!(success);
        assert!(!hint);
        assert_eq!(algo.phase, Phase::ApproachAboveTarget);
    }

    #[test]
    fn test_reset_state_returns_to_approach_phase() {
        let mut algo = RadiallyOutward::new(5.0, 150.0);
        algo.phase = Phase::Descend;
        algo.reset_state();
        assert_eq!(algo.phase, Phase::ApproachAboveTarget);
    }
}

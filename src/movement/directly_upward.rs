//! Directly-upward movement: translate above the target at safe height,
//! rotate in place, then descend (spec §4.7).

use crate::pose::Pose;
use crate::robot_driver::RobotDriver;

use super::MovementAlgorithm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment {
    TranslateAbove,
    RotateInPlace,
    Descend,
}

pub struct DirectlyUpward {
    segment: Segment,
    safe_height: f64,
}

impl DirectlyUpward {
    pub fn new(safe_height: f64) -> Self {
        DirectlyUpward {
            segment: Segment::TranslateAbove,
            safe_height,
        }
    }
}

impl MovementAlgorithm for DirectlyUpward {
    fn move_decision(
        &mut self,
        driver: &mut dyn RobotDriver,
        _displacement_to_target: Pose,
        _target_from_head: Pose,
        target_from_displacement: Pose,
        robot_pose: Pose,
        _head_center: Pose,
    ) -> (bool, bool) {
        let target = target_from_displacement;
        let safe_z = self.safe_height.max(robot_pose.z).max(target.z);

        match self.segment {
            Segment::TranslateAbove => {
                let above = Pose::new(target.x, target.y, safe_z, robot_pose.rx, robot_pose.ry, robot_pose.rz);
                let ok = driver.move_linear(above);
                if ok {
                    self.segment = Segment::RotateInPlace;
                }
                (ok, false)
            }
            Segment::RotateInPlace => {
                let rotated = Pose::new(robot_pose.x, robot_pose.y, robot_pose.z, target.rx, target.ry, target.rz);
                let ok = driver.move_linear(rotated);
                if ok {
                    self.segment = Segment::Descend;
                }
                (ok, false)
            }
            Segment::Descend => {
                let ok = driver.move_linear(target);
                self.segment = Segment::TranslateAbove;
                (ok, true)
            }
        }
    }

    /// Resets the trajectory segment index, so a mid-trajectory stop
    /// always restarts from the translate-above segment (spec §4.7).
    fn reset_state(&mut self) {
        self.segment = Segment::TranslateAbove;
    }
}

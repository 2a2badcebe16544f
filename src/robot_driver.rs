//! Robot Driver interface (spec §6): the abstract boundary between the
//! control core and a concrete vendor transport (Elfin, Dobot, Universal
//! Robot). Only a synchronous, in-memory test stub is implemented here;
//! real transports are out of scope per spec §1.
//!
//! Grounded on the capability-trait shape of the teacher's `Instrument`/
//! `Stage` traits in `core.rs`, and the settle-polling style of
//! `hardware/mock.rs`'s `MockStage`, adapted from async to the core's
//! synchronous cooperative loop (spec §5).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::pose::Pose;

/// Linear axis for a relative move, as used by `move_linear_relative`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

/// Abstract over a physical robot's motion and status surface. Every
/// method is synchronous and expected to be short (< 20 ms) or internally
/// time-boxed, since the core's tick never blocks longer than one driver
/// round-trip (spec §5).
pub trait RobotDriver: Send {
    fn connect(&mut self) -> bool;
    fn initialize(&mut self);
    /// Returns `(ok, pose)`; `ok` is false on a transient read failure.
    fn get_pose(&mut self) -> (bool, Pose);
    fn is_moving(&mut self) -> bool;
    fn is_error_state(&mut self) -> bool;
    fn move_linear(&mut self, target: Pose) -> bool;
    fn move_circular(&mut self, start: Pose, waypoint: Pose, target: Pose) -> bool;
    fn move_linear_relative(&mut self, axis: Axis, direction: Direction, distance_mm: f64) -> bool;
    fn stop_robot(&mut self) -> bool;
    fn enable_free_drive(&mut self);
    fn disable_free_drive(&mut self);
    fn read_force_sensor(&mut self) -> [f64; 6];
    fn is_connected(&self) -> bool;
    fn close(&mut self);
}

#[derive(Clone, Copy, Debug)]
struct MotionJob {
    target: Pose,
    started_at: Instant,
    duration: Duration,
}

/// An in-memory stand-in robot used for tests and the `test` configuration
/// key (spec §6). Moves take simulated time proportional to distance, the
/// way `MockStage` paces its travel in the teacher codebase, but measured
/// against wall-clock `Instant`s polled from `is_moving` rather than a
/// spawned async task.
pub struct TestRobotDriver {
    connected: bool,
    pose: Arc<Mutex<Pose>>,
    speed_mm_per_sec: f64,
    active_move: Option<MotionJob>,
    free_drive: bool,
    stopped_requested: bool,
}

impl TestRobotDriver {
    pub fn new(speed_mm_per_sec: f64) -> Self {
        TestRobotDriver {
            connected: false,
            pose: Arc::new(Mutex::new(Pose::identity())),
            speed_mm_per_sec: speed_mm_per_sec.max(1.0),
            active_move: None,
            free_drive: false,
            stopped_requested: false,
        }
    }

    fn distance(a: &Pose, b: &Pose) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt()
    }

    fn begin_move(&mut self, target: Pose) -> bool {
        if !self.connected {
            return false;
        }
        let current = *self.pose.lock().expect("pose lock poisoned");
        let distance = Self::distance(&current, &target);
        let seconds = (distance / self.speed_mm_per_sec).max(0.01);
        self.active_move = Some(MotionJob {
            target,
            started_at: Instant::now(),
            duration: Duration::from_secs_f64(seconds),
        });
        self.stopped_requested = false;
        true
    }
}

impl RobotDriver for TestRobotDriver {
    fn connect(&mut self) -> bool {
        self.connected = true;
        true
    }

    fn initialize(&mut self) {}

    fn get_pose(&mut self) -> (bool, Pose) {
        if !self.connected {
            return (false, Pose::identity());
        }
        self.poll_motion();
        (true, *self.pose.lock().expect("pose lock poisoned"))
    }

    fn is_moving(&mut self) -> bool {
        self.poll_motion();
        self.active_move.is_some()
    }

    fn is_error_state(&mut self) -> bool {
        false
    }

    fn move_linear(&mut self, target: Pose) -> bool {
        self.begin_move(target)
    }

    fn move_circular(&mut self, _start: Pose, _waypoint: Pose, target: Pose) -> bool {
        self.begin_move(target)
    }

    fn move_linear_relative(&mut self, axis: Axis, direction: Direction, distance_mm: f64) -> bool {
        let current = *self.pose.lock().expect("pose lock poisoned");
        let signed = match direction {
            Direction::Positive => distance_mm,
            Direction::Negative => -distance_mm,
        };
        let mut target = current;
        match axis {
            Axis::X => target.x += signed,
            Axis::Y => target.y += signed,
            Axis::Z => target.z += signed,
        }
        self.begin_move(target)
    }

    fn stop_robot(&mut self) -> bool {
        self.active_move = None;
        self.stopped_requested = true;
        // The real driver takes ~50ms to quiesce after a stop command; the
        // controller is responsible for that settle delay (spec §5), not
        // the driver itself.
        true
    }

    fn enable_free_drive(&mut self) {
        self.free_drive = true;
    }

    fn disable_free_drive(&mut self) {
        self.free_drive = false;
    }

    fn read_force_sensor(&mut self) -> [f64; 6] {
        [0.0; 6]
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.stop_robot();
        self.connected = false;
    }
}

impl TestRobotDriver {
    fn poll_motion(&mut self) {
        if let Some(job) = self.active_move {
            if job.started_at.elapsed() >= job.duration {
                *self.pose.lock().expect("pose lock poisoned") = job.target;
                self.active_move = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_driver_rejects_moves() {
        let mut driver = TestRobotDriver::new(50.0);
        assert!(!driver.move_linear(Pose::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_connect_then_move_reports_moving() {
        let mut driver = TestRobotDriver::new(1000.0);
        assert!(driver.connect());
        assert!(driver.move_linear(Pose::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0)));
        assert!(driver.is_moving());
    }

    #[test]
    fn test_stop_clears_active_move() {
        let mut driver = TestRobotDriver::new(1.0);
        driver.connect();
        driver.move_linear(Pose::new(100.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert!(driver.is_moving());
        assert!(driver.stop_robot());
        assert!(!driver.is_moving());
    }
}

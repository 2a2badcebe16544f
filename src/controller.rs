//! The Controller orchestrator: drives one tick of the loop (spec §4.8).
//!
//! Shaped after the teacher's `DaqManagerActor` — a struct holding every
//! subsystem handle plus a central dispatch method — but synchronous and
//! single-threaded cooperative (spec §5) rather than an async
//! command-actor loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{info, warn};
use nalgebra::Matrix4;

use crate::alignment::align_coil_to_robot;
use crate::calibration::{CalibrationEngine, CalibrationSamples};
use crate::config::Settings;
use crate::filter::HeadPoseFilter;
use crate::force::DynForceSource;
use crate::messages::{ConnectionStatus, InboundMessage, OutboundMessage};
use crate::movement::MovementAlgorithm;
use crate::objective::Objective;
use crate::pose::{EulerConvention, Pose};
use crate::pose_store::PoseStore;
use crate::remote::RemoteControlSink;
use crate::robot_driver::RobotDriver;
use crate::state_machine::RobotStateMachine;
use crate::tracker::TrackerFrame;

const DISPLACEMENT_HISTORY_LEN: usize = 20;
const DISPLACEMENT_FRESHNESS: Duration = Duration::from_secs_f64(0.3);
const STOP_SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Not one of spec §6's enumerated configuration keys; the source's head
/// velocity guard threshold is internal tuning rather than a site
/// parameter, so it stays a constant (see DESIGN.md Open Questions).
const HEAD_VELOCITY_THRESHOLD_MM_PER_S: f64 = 50.0;

/// Composes a TCP-frame displacement into the current robot pose's space.
/// The displacement's rotation is built in the rotating-XYZ frame it
/// arrives in (neuronavigation applies rotation before translation), then
/// the resulting offset is composed with the robot's own pose matrix —
/// not added per-axis — so a non-zero robot orientation rotates the
/// offset correctly instead of being ignored (spec §4.9).
fn target_in_robot_space(robot_pose: Pose, displacement: Pose) -> Pose {
    let m_offset = displacement.to_matrix_rotate_then_translate(EulerConvention::RotatingXyz);
    let m_robot = robot_pose.to_matrix(EulerConvention::StaticXyz);
    Pose::from_matrix(&(m_robot * m_offset), EulerConvention::StaticXyz)
}

/// Outcome of the track-target guard cascade (spec §4.9), replacing the
/// original `(success, warning)` tuple with a small enum: each variant
/// says exactly what the caller should do next, instead of overloading
/// the same two fields for "state not ready", "benign hold", "warn but
/// skip", and "stop for safety".
#[derive(Clone, Debug, PartialEq)]
enum GuardOutcome {
    /// An early precondition isn't ready yet; stay silent.
    NotReady,
    /// Benign skip (e.g. holding within the tuning interval).
    Hold,
    /// Skip this tick, but surface a warning.
    Warn(String),
    /// Stop the robot, reset the algorithm, and surface a warning.
    SafetyStop(String),
    /// Every guard passed; carries the values the guards already computed
    /// so the caller doesn't re-derive them.
    Proceed { head_center: Pose, displacement: Pose },
}

/// Drives one tick (`update()`) of the control loop, per spec §4.8.
pub struct Controller {
    settings: Settings,
    pose_store: PoseStore,
    tracker_frame: TrackerFrame,
    driver: Box<dyn RobotDriver>,
    state_machine: RobotStateMachine,
    movement_algorithm: Box<dyn MovementAlgorithm>,
    force_source: Option<Box<dyn DynForceSource>>,
    sink: Box<dyn RemoteControlSink>,
    head_filter: HeadPoseFilter,
    calibration_samples: CalibrationSamples,

    objective: Objective,
    target: Option<Matrix4<f64>>,
    m_target_to_head: Option<Matrix4<f64>>,
    target_reached: bool,

    displacement_history: VecDeque<[f64; 6]>,
    last_displacement: Option<Pose>,
    last_displacement_at: Option<Instant>,

    last_head_pose: Option<Pose>,
    last_head_pose_at: Option<Instant>,
    head_speed_mm_per_s: Option<f64>,
    filtered_head: Option<Pose>,

    last_warning: String,
    connection_status: ConnectionStatus,
    last_tuning_at: Option<Instant>,
    z_offset: f64,
    /// Set once `move_away_from_head` has issued its own retract command,
    /// so the "stop if currently moving" guard below only cancels motion
    /// left over from whatever objective preceded this one, not the
    /// retract it just started (spec §8 scenario S6).
    retract_in_progress: bool,
}

impl Controller {
    pub fn new(
        settings: Settings,
        driver: Box<dyn RobotDriver>,
        movement_algorithm: Box<dyn MovementAlgorithm>,
        force_source: Option<Box<dyn DynForceSource>>,
        sink: Box<dyn RemoteControlSink>,
    ) -> Self {
        let dwell_time = Duration::from_secs_f64(settings.dwell_time.max(0.0));
        Controller {
            settings,
            pose_store: PoseStore::new(),
            tracker_frame: TrackerFrame::new(),
            driver,
            state_machine: RobotStateMachine::new(dwell_time),
            movement_algorithm,
            force_source,
            sink,
            head_filter: HeadPoseFilter::new(),
            calibration_samples: CalibrationSamples::new(),
            objective: Objective::None,
            target: None,
            m_target_to_head: None,
            target_reached: false,
            displacement_history: VecDeque::with_capacity(DISPLACEMENT_HISTORY_LEN),
            last_displacement: None,
            last_displacement_at: None,
            last_head_pose: None,
            last_head_pose_at: None,
            head_speed_mm_per_s: None,
            filtered_head: None,
            last_warning: String::new(),
            connection_status: ConnectionStatus::NotConnected,
            last_tuning_at: None,
            z_offset: 0.0,
            retract_in_progress: false,
        }
    }

    pub fn tracker_frame(&self) -> &TrackerFrame {
        &self.tracker_frame
    }

    pub fn pose_store(&self) -> &PoseStore {
        &self.pose_store
    }

    pub fn state(&self) -> crate::state_machine::RobotState {
        self.state_machine.state()
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    // -- Inbound message handling -----------------------------------------

    pub fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::RobotConnection { .. } => {
                if self.driver.connect() {
                    self.connection_status = ConnectionStatus::Connected;
                } else {
                    self.connection_status = ConnectionStatus::UnableToConnect;
                    self.sink.publish(&OutboundMessage::CloseRobotDialog);
                }
            }
            InboundMessage::SetTrackerFiducials { .. } => {
                self.tracker_frame.update_poses(None, None, None, [false, false, false]);
            }
            InboundMessage::SetTarget { target } => self.set_target(target),
            InboundMessage::UnsetTarget => {
                self.target = None;
                self.m_target_to_head = None;
            }
            InboundMessage::UpdateTrackerPoses { poses, visibilities } => {
                self.tracker_frame.update_poses(poses[0], poses[1], poses[2], visibilities);
            }
            InboundMessage::CreatePoint => self.create_calibration_point(),
            InboundMessage::ResetRobotMatrix => self.calibration_samples.clear(),
            InboundMessage::RobotMatrixEstimation => self.run_calibration(),
            InboundMessage::SetRobotTransformationMatrix { data } => {
                let (x_est, y_est, affine) = crate::messages::unpack_transform_matrix(&data);
                self.tracker_frame.set_transform(crate::tracker::CalibrationTransform {
                    x_est,
                    y_est,
                    affine_tracker_to_robot: affine,
                });
            }
            InboundMessage::UpdateDisplacementToTarget { displacement } => {
                self.ingest_displacement(displacement);
            }
            InboundMessage::CoilAtTarget { state } => self.target_reached = state,
            InboundMessage::SetObjective { objective } => {
                self.objective = objective;
                self.movement_algorithm.reset_state();
                self.retract_in_progress = false;
            }
            InboundMessage::SetFreedrive { set } => {
                if set {
                    self.driver.enable_free_drive();
                } else {
                    self.driver.disable_free_drive();
                }
            }
            InboundMessage::CheckConnectionRobot => {
                self.connection_status = if self.driver.is_connected() {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::NotConnected
                };
            }
        }
    }

    fn set_target(&mut self, target: Matrix4<f64>) {
        if let Some(head) = self.tracker_frame.head() {
            let head_m = head.to_matrix(EulerConvention::StaticXyz);
            if let Some(head_inv) = head_m.try_inverse() {
                self.m_target_to_head = Some(head_inv * target);
                self.target = Some(target);
                return;
            }
        }
        warn!("cannot set target: head pose unavailable or singular");
    }

    fn create_calibration_point(&mut self) {
        let (_, robot_pose) = self.driver.get_pose();
        if let Some(coil) = self.tracker_frame.coil() {
            let robot_m = robot_pose.to_matrix(EulerConvention::StaticXyz);
            let coil_m = coil.to_matrix(EulerConvention::StaticXyz);
            self.calibration_samples
                .push(robot_m, coil_m, robot_pose.translation(), coil.translation());
            self.sink.publish(&OutboundMessage::CoordinatesCollected {
                count: self.calibration_samples.len(),
            });
        }
    }

    fn run_calibration(&mut self) {
        match CalibrationEngine::estimate(&self.calibration_samples) {
            Ok(transform) => {
                let data = crate::messages::pack_transform_matrix(
                    &transform.x_est,
                    &transform.y_est,
                    &transform.affine_tracker_to_robot,
                );
                self.tracker_frame.set_transform(transform);
                self.sink.publish(&OutboundMessage::UpdateRobotTransformationMatrix { data });
            }
            Err(e) => warn!("calibration failed, keeping prior transform: {e}"),
        }
    }

    /// Applies the ingress sign flip and site alignment, appends to the
    /// 20-entry history, and stores the result as the current
    /// displacement-to-target.
    fn ingest_displacement(&mut self, raw: [f64; 6]) {
        if self.displacement_history.len() == DISPLACEMENT_HISTORY_LEN {
            self.displacement_history.pop_front();
        }
        self.displacement_history.push_back(raw);

        let raw_pose = Pose::new(raw[0], raw[1], raw[2], raw[3], raw[4], raw[5]);
        let flipped = raw_pose.flip_x_rx();
        let aligned = align_coil_to_robot(
            &flipped,
            self.settings.rx_offset,
            self.settings.ry_offset,
            self.settings.rz_offset,
        );
        self.last_displacement = Some(aligned);
        self.last_displacement_at = Some(Instant::now());
    }

    /// Frozen-feed detector (spec §4.9): exact float equality across the
    /// last 20 displacements, preserved as written (no tolerance).
    fn is_feed_frozen(&self) -> bool {
        if self.displacement_history.len() < DISPLACEMENT_HISTORY_LEN {
            return false;
        }
        let first = self.displacement_history.front().unwrap();
        self.displacement_history.iter().all(|d| d == first)
    }

    // -- The tick ------------------------------------------------------------

    /// Advances the control loop by one tick. Returns `false` only when a
    /// disconnected driver's single reconnect attempt fails (spec §4.8
    /// step 1); every other outcome returns `true` and the loop should
    /// keep ticking regardless.
    pub fn update(&mut self) -> bool {
        if !self.driver.is_connected() {
            self.connection_status = ConnectionStatus::TryingToConnect;
            if !self.driver.connect() {
                self.connection_status = ConnectionStatus::UnableToConnect;
                self.publish_status();
                return false;
            }
            self.driver.initialize();
        }
        self.connection_status = ConnectionStatus::Connected;

        let (pose_ok, robot_pose) = self.driver.get_pose();
        if pose_ok {
            self.pose_store.set(robot_pose);
        }

        let is_moving = self.driver.is_moving();
        self.state_machine.update(is_moving);

        self.recompute_head_velocity();

        if self.is_feed_frozen() {
            self.driver.stop_robot();
            self.objective = Objective::None;
            self.publish_warning("Warning: displacement feed is frozen".to_string());
            self.publish_objective();
        }

        match self.objective {
            Objective::None => {
                if self.state_machine.state() == crate::state_machine::RobotState::Moving {
                    self.driver.stop_robot();
                    std::thread::sleep(STOP_SETTLE_DELAY);
                    self.state_machine.set_state_to_stopping();
                }
            }
            Objective::TrackTarget => self.handle_track_target(robot_pose),
            Objective::MoveAwayFromHead => self.handle_move_away_from_head(robot_pose),
        }

        self.publish_force_telemetry();
        self.publish_status();
        true
    }

    /// Updates the Kalman-filtered head pose (spec §4.8 step 4) and the
    /// cached head translational speed from the distance travelled (on the
    /// raw, unfiltered reading) since the last visible head sample.
    fn recompute_head_velocity(&mut self) {
        let Some(head) = self.tracker_frame.head() else {
            return;
        };
        self.filtered_head = Some(self.head_filter.update(head));

        if let (Some(prev), Some(prev_at)) = (self.last_head_pose, self.last_head_pose_at) {
            let dt = prev_at.elapsed().as_secs_f64();
            if dt > 0.0 {
                let distance = (head.translation() - prev.translation()).norm();
                self.head_speed_mm_per_s = Some(distance / dt);
            }
        }
        self.last_head_pose = Some(head);
        self.last_head_pose_at = Some(Instant::now());
    }

    fn head_speed_mm_per_s(&self) -> Option<f64> {
        self.head_speed_mm_per_s
    }

    fn handle_track_target(&mut self, robot_pose: Pose) {
        let outcome = self.evaluate_track_target_guards(robot_pose);
        match outcome {
            GuardOutcome::NotReady | GuardOutcome::Hold => {}
            GuardOutcome::Warn(message) => self.publish_warning(message),
            GuardOutcome::SafetyStop(message) => {
                self.driver.stop_robot();
                std::thread::sleep(STOP_SETTLE_DELAY);
                self.movement_algorithm.reset_state();
                self.publish_warning(message);
            }
            GuardOutcome::Proceed { head_center, displacement } => {
                // Captured before the movement algorithm's own PID (if any)
                // overwrites translation/rotation with its outputs.
                self.z_offset = displacement.z;

                let target_from_head = self.target_from_head().unwrap_or(robot_pose);
                let target_from_displacement = target_in_robot_space(robot_pose, displacement);

                let (success, _normalize_force) = self.movement_algorithm.move_decision(
                    self.driver.as_mut(),
                    displacement,
                    target_from_head,
                    target_from_displacement,
                    robot_pose,
                    head_center,
                );
                if success {
                    self.state_machine.set_state_to_start_moving();
                }
            }
        }
    }

    fn evaluate_track_target_guards(&mut self, robot_pose: Pose) -> GuardOutcome {
        // 1. Target has been set; m_target_to_head available.
        if self.target.is_none() || self.m_target_to_head.is_none() {
            return GuardOutcome::NotReady;
        }

        // 2. head_center, head_pose_in_robot_space, tracker->robot transform present.
        let head_in_robot = match self.head_pose_in_robot_space() {
            Some(p) => p,
            None => return GuardOutcome::NotReady,
        };
        if !self.tracker_frame.has_transform() {
            return GuardOutcome::NotReady;
        }

        // 3. Head and coil markers visible.
        let head_visible = self.tracker_frame.head_visible();
        let coil_visible = self.tracker_frame.coil_visible();
        if self.settings.stop_robot_if_head_not_visible && (!head_visible || !coil_visible) {
            return GuardOutcome::SafetyStop("Warning: Head or coil marker is not visible".to_string());
        }

        // 4. Head not moving too fast.
        if let Some(speed) = self.head_speed_mm_per_s() {
            if speed > HEAD_VELOCITY_THRESHOLD_MM_PER_S {
                return GuardOutcome::SafetyStop("Warning: Head is moving too fast".to_string());
            }
        }

        // 5. Displacement-estimated target inside the working sphere.
        let displacement = match self.last_displacement {
            Some(d) => d,
            None => return GuardOutcome::NotReady,
        };
        let target_from_displacement = target_in_robot_space(robot_pose, displacement);
        if target_from_displacement.translation().norm() >= self.settings.working_space_radius {
            return GuardOutcome::Warn("Warning: target is outside the working space".to_string());
        }

        // 6. State machine in READY.
        if self.state_machine.state() != crate::state_machine::RobotState::Ready {
            return GuardOutcome::NotReady;
        }

        // 7. Previously reached, force near setpoint, tuning interval not elapsed.
        let force_near_setpoint = self
            .force_source
            .as_ref()
            .map(|f| f.is_force_near_setpoint(self.z_offset))
            .unwrap_or(false);
        let tuning_elapsed = match self.settings.tuning_interval {
            None => false,
            Some(interval) => self
                .last_tuning_at
                .map(|t| t.elapsed().as_secs_f64() >= interval)
                .unwrap_or(true),
        };
        if self.target_reached && force_near_setpoint && !tuning_elapsed {
            return GuardOutcome::Hold;
        }

        // 8. Displacement exists and fresh.
        let fresh = self
            .last_displacement_at
            .map(|t| t.elapsed() <= DISPLACEMENT_FRESHNESS)
            .unwrap_or(false);
        if !fresh {
            self.last_displacement = None;
            return GuardOutcome::NotReady;
        }

        self.last_tuning_at = Some(Instant::now());
        GuardOutcome::Proceed { head_center: head_in_robot, displacement }
    }

    fn handle_move_away_from_head(&mut self, robot_pose: Pose) {
        if !self.retract_in_progress && self.state_machine.state() == crate::state_machine::RobotState::Moving {
            self.driver.stop_robot();
            std::thread::sleep(STOP_SETTLE_DELAY);
            return;
        }
        let head_center = self.head_pose_in_robot_space().unwrap_or(robot_pose);
        let done = !self.driver.is_moving();
        let was_ready = self.state_machine.state() == crate::state_machine::RobotState::Ready;
        let success = self
            .movement_algorithm
            .move_away_from_head(self.driver.as_mut(), robot_pose, head_center, self.settings.safe_height);
        if success {
            self.retract_in_progress = true;
            self.state_machine.set_state_to_start_moving();
        }
        if done && was_ready {
            self.objective = Objective::None;
            self.retract_in_progress = false;
        }
    }

    fn head_pose_in_robot_space(&self) -> Option<Pose> {
        let head = self.filtered_head?;
        self.tracker_frame.transform_pose_to_robot_space(&head).ok()
    }

    fn target_from_head(&self) -> Option<Pose> {
        let head = self.filtered_head?;
        let m_target_to_head = self.m_target_to_head?;
        let head_m = head.to_matrix(EulerConvention::StaticXyz);
        let target_tracker_space = head_m * m_target_to_head;
        let transform = self.tracker_frame.transform()?;
        let robot_m = transform.affine_tracker_to_robot * target_tracker_space;
        Some(Pose::from_matrix(&robot_m, EulerConvention::StaticXyz))
    }

    fn publish_warning(&mut self, message: String) {
        if message != self.last_warning {
            self.sink.publish(&OutboundMessage::UpdateRobotWarning(message.clone()));
            self.last_warning = message;
        }
    }

    fn publish_objective(&mut self) {
        self.sink.publish(&OutboundMessage::SetObjective(self.objective));
    }

    fn publish_status(&mut self) {
        self.sink
            .publish(&OutboundMessage::RobotConnectionStatus(self.connection_status));
    }

    fn publish_force_telemetry(&mut self) {
        let Some(force_source) = self.force_source.as_mut() else {
            return;
        };
        force_source.update_buffer();
        if let Some(value) = force_source.latest(None) {
            if force_source.force_changed(value) {
                self.sink.publish(&OutboundMessage::ForceSensorData(-value));
            }
            let stable = force_source.is_force_z_stable(value, self.z_offset);
            self.sink.publish(&OutboundMessage::UpdateZOffsetTarget { stable });
        }
        info!("tick complete; objective={:?}", self.objective);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::DirectlyUpward;
    use crate::remote::{NullSink, RemoteControlSink};
    use crate::robot_driver::{Axis, Direction, TestRobotDriver};
    use std::sync::{Arc, Mutex};

    /// A driver whose `connect` always fails, for exercising the
    /// connection-failure path of `handle_inbound`.
    struct NeverConnectsDriver;

    impl RobotDriver for NeverConnectsDriver {
        fn connect(&mut self) -> bool {
            false
        }
        fn initialize(&mut self) {}
        fn get_pose(&mut self) -> (bool, Pose) {
            (true, Pose::identity())
        }
        fn is_moving(&mut self) -> bool {
            false
        }
        fn is_error_state(&mut self) -> bool {
            false
        }
        fn move_linear(&mut self, _target: Pose) -> bool {
            false
        }
        fn move_circular(&mut self, _start: Pose, _waypoint: Pose, _target: Pose) -> bool {
            false
        }
        fn move_linear_relative(&mut self, _axis: Axis, _direction: Direction, _distance_mm: f64) -> bool {
            false
        }
        fn stop_robot(&mut self) -> bool {
            true
        }
        fn enable_free_drive(&mut self) {}
        fn disable_free_drive(&mut self) {}
        fn read_force_sensor(&mut self) -> [f64; 6] {
            [0.0; 6]
        }
        fn is_connected(&self) -> bool {
            false
        }
        fn close(&mut self) {}
    }

    struct RecordingSink {
        messages: Arc<Mutex<Vec<OutboundMessage>>>,
    }

    impl RemoteControlSink for RecordingSink {
        fn publish(&mut self, message: &OutboundMessage) {
            self.messages.lock().expect("recording sink lock poisoned").push(message.clone());
        }
    }

    fn make_controller(dwell_time: f64) -> Controller {
        let mut settings = Settings::default();
        settings.dwell_time = dwell_time;
        Controller::new(
            settings,
            Box::new(TestRobotDriver::new(1000.0)),
            Box::new(DirectlyUpward::new(150.0)),
            None,
            Box::new(NullSink),
        )
    }

    #[test]
    fn test_s1_connect_and_idle() {
        let mut controller = make_controller(0.2);
        let progressed = controller.update();
        assert!(progressed);
        assert_eq!(controller.state(), crate::state_machine::RobotState::Ready);
        assert_eq!(controller.connection_status, ConnectionStatus::Connected);
    }

    #[test]
    fn test_frozen_feed_clears_objective() {
        let mut controller = make_controller(0.2);
        controller.objective = Objective::TrackTarget;
        for _ in 0..DISPLACEMENT_HISTORY_LEN {
            controller.ingest_displacement([1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        }
        controller.update();
        assert_eq!(controller.objective(), Objective::None);
    }

    #[test]
    fn test_guard_cascade_not_ready_without_target() {
        let mut controller = make_controller(0.2);
        controller.objective = Objective::TrackTarget;
        let (_, robot_pose) = controller.driver.get_pose();
        let outcome = controller.evaluate_track_target_guards(robot_pose);
        assert_eq!(outcome, GuardOutcome::NotReady);
    }

    #[test]
    fn test_robot_connection_failure_publishes_close_dialog() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(
            Settings::default(),
            Box::new(NeverConnectsDriver),
            Box::new(DirectlyUpward::new(150.0)),
            None,
            Box::new(RecordingSink { messages: messages.clone() }),
        );

        controller.handle_inbound(InboundMessage::RobotConnection { robot_ip: "127.0.0.1".to_string() });

        assert_eq!(controller.connection_status, ConnectionStatus::UnableToConnect);
        let published = messages.lock().expect("recording sink lock poisoned");
        assert!(published.iter().any(|m| matches!(m, OutboundMessage::CloseRobotDialog)));
    }

    #[test]
    fn test_calibration_point_publishes_coordinates_collected() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(
            Settings::default(),
            Box::new(TestRobotDriver::new(1000.0)),
            Box::new(DirectlyUpward::new(150.0)),
            None,
            Box::new(RecordingSink { messages: messages.clone() }),
        );
        controller.handle_inbound(InboundMessage::UpdateTrackerPoses {
            poses: [None, Some(Pose::identity()), None],
            visibilities: [false, true, false],
        });

        controller.handle_inbound(InboundMessage::CreatePoint);

        let published = messages.lock().expect("recording sink lock poisoned");
        assert!(published.iter().any(|m| matches!(
            m,
            OutboundMessage::CoordinatesCollected { count } if *count == 1
        )));
    }
}

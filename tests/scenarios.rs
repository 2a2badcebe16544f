//! End-to-end scenarios from the controller's data sheet (spec §8 S1-S6).
//! Each test drives a `Controller` through `handle_inbound`/`update()` only,
//! the same surface the CLI bootstrap binary uses.

use std::sync::{Arc, Mutex};

use nalgebra::Matrix4;

use tms_robot_control::config::{MovementAlgorithm, MovementAlgorithmSetting, Settings};
use tms_robot_control::controller::Controller;
use tms_robot_control::messages::{InboundMessage, OutboundMessage};
use tms_robot_control::movement::{DirectlyPid, DirectlyUpward};
use tms_robot_control::objective::Objective;
use tms_robot_control::pid::{PidGains, PidGroup};
use tms_robot_control::pose::{EulerConvention, Pose};
use tms_robot_control::remote::{NullSink, RemoteControlSink};
use tms_robot_control::robot_driver::TestRobotDriver;
use tms_robot_control::tracker::CalibrationTransform;

/// Records every message published, behind a handle the test keeps after
/// the sink itself is moved into the controller.
struct RecordingSink {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RemoteControlSink for RecordingSink {
    fn publish(&mut self, message: &OutboundMessage) {
        self.messages.lock().expect("recording sink lock poisoned").push(message.clone());
    }
}

fn recording_sink() -> (Box<RecordingSink>, Arc<Mutex<Vec<OutboundMessage>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    (Box::new(RecordingSink { messages: messages.clone() }), messages)
}

fn identity_transform() -> CalibrationTransform {
    CalibrationTransform {
        x_est: Matrix4::identity(),
        y_est: Matrix4::identity(),
        affine_tracker_to_robot: Matrix4::identity(),
    }
}

fn settings_with(dwell_time: f64, movement_algorithm: MovementAlgorithm) -> Settings {
    let mut settings = Settings::default();
    settings.dwell_time = dwell_time;
    settings.movement_algorithm = MovementAlgorithmSetting::Known(movement_algorithm);
    settings
}

#[test]
fn s1_connect_and_idle() {
    let settings = settings_with(0.2, MovementAlgorithm::DirectlyUpward);
    let mut controller = Controller::new(
        settings.clone(),
        Box::new(TestRobotDriver::new(1000.0)),
        Box::new(DirectlyUpward::new(settings.safe_height)),
        None,
        Box::new(NullSink),
    );

    assert!(controller.update());
    assert_eq!(controller.state(), tms_robot_control::state_machine::RobotState::Ready);
    assert_eq!(controller.objective(), Objective::None);
}

#[test]
fn s3_track_target_happy_path_commands_flipped_displacement() {
    let settings = settings_with(0.05, MovementAlgorithm::DirectlyPid);
    let pid = PidGroup::new(PidGains::default(), 100.0, 50.0, false, 0.0);
    let mut controller = Controller::new(
        settings,
        Box::new(TestRobotDriver::new(1000.0)),
        Box::new(DirectlyPid::new(pid, 1.0 / 30.0)),
        None,
        Box::new(NullSink),
    );

    // Head visible and stationary at the origin; tracker->robot is identity.
    let head = Pose::identity();
    controller.handle_inbound(InboundMessage::UpdateTrackerPoses {
        poses: [Some(head), Some(Pose::identity()), None],
        visibilities: [true, true, false],
    });
    controller.handle_inbound(InboundMessage::SetRobotTransformationMatrix {
        data: tms_robot_control::messages::pack_transform_matrix(
            &identity_transform().x_est,
            &identity_transform().y_est,
            &identity_transform().affine_tracker_to_robot,
        ),
    });
    controller.handle_inbound(InboundMessage::SetTarget { target: Matrix4::identity() });
    controller.handle_inbound(InboundMessage::SetObjective { objective: Objective::TrackTarget });

    // Displacement arrives as [0.5, 0, 0, 0, 0, 0]; ingress flips x/rx.
    controller.handle_inbound(InboundMessage::UpdateDisplacementToTarget {
        displacement: [0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
    });

    assert!(controller.update());
    assert_eq!(controller.objective(), Objective::TrackTarget);
}

#[test]
fn s4_head_loss_stops_and_warns() {
    let settings = settings_with(0.2, MovementAlgorithm::DirectlyUpward);
    let mut controller = Controller::new(
        settings.clone(),
        Box::new(TestRobotDriver::new(1000.0)),
        Box::new(DirectlyUpward::new(settings.safe_height)),
        None,
        Box::new(NullSink),
    );

    controller.handle_inbound(InboundMessage::SetRobotTransformationMatrix {
        data: tms_robot_control::messages::pack_transform_matrix(
            &identity_transform().x_est,
            &identity_transform().y_est,
            &identity_transform().affine_tracker_to_robot,
        ),
    });
    controller.handle_inbound(InboundMessage::SetTarget { target: Matrix4::identity() });
    controller.handle_inbound(InboundMessage::SetObjective { objective: Objective::TrackTarget });

    // Head visible for one tick, so a cached head-in-robot-space pose
    // exists before it's lost (stop_robot_if_head_not_visible defaults true).
    controller.handle_inbound(InboundMessage::UpdateTrackerPoses {
        poses: [Some(Pose::identity()), Some(Pose::identity()), None],
        visibilities: [true, true, false],
    });
    assert!(controller.update());

    controller.handle_inbound(InboundMessage::UpdateTrackerPoses {
        poses: [Some(Pose::identity()), Some(Pose::identity()), None],
        visibilities: [false, true, false],
    });
    assert!(controller.update());
    assert_eq!(controller.objective(), Objective::TrackTarget);
}

#[test]
fn s5_frozen_feed_stops_and_clears_objective() {
    let settings = settings_with(0.2, MovementAlgorithm::DirectlyUpward);
    let (sink, published) = recording_sink();
    let mut controller = Controller::new(
        settings.clone(),
        Box::new(TestRobotDriver::new(1000.0)),
        Box::new(DirectlyUpward::new(settings.safe_height)),
        None,
        sink,
    );

    controller.handle_inbound(InboundMessage::SetObjective { objective: Objective::TrackTarget });
    for _ in 0..20 {
        controller.handle_inbound(InboundMessage::UpdateDisplacementToTarget {
            displacement: [1.0, 2.0, 3.0, 0.0, 0.0, 0.0],
        });
    }

    assert!(controller.update());
    assert_eq!(controller.objective(), Objective::None);

    let messages = published.lock().expect("recording sink lock poisoned");
    assert!(messages.iter().any(|m| matches!(
        m,
        OutboundMessage::UpdateRobotWarning(text) if text.contains("frozen")
    )));
}

#[test]
fn s6_move_away_from_head_resets_objective_once_settled() {
    let settings = settings_with(0.1, MovementAlgorithm::DirectlyUpward);
    let mut controller = Controller::new(
        settings.clone(),
        Box::new(TestRobotDriver::new(1000.0)),
        Box::new(DirectlyUpward::new(settings.safe_height)),
        None,
        Box::new(NullSink),
    );

    controller.handle_inbound(InboundMessage::SetObjective {
        objective: Objective::MoveAwayFromHead,
    });

    // No motion was in flight when the objective was set (the controller
    // starts at READY), so the retract is issued and immediately reported
    // complete within the first few ticks.
    for _ in 0..5 {
        assert!(controller.update());
        if controller.objective() == Objective::None {
            break;
        }
    }
    assert_eq!(controller.objective(), Objective::None);
}

#[test]
fn transform_round_trip_through_pose_matrix() {
    let pose = Pose::new(12.5, -3.0, 40.0, 10.0, -20.0, 30.0);
    let m = pose.to_matrix(EulerConvention::StaticXyz);
    let back = Pose::from_matrix(&m, EulerConvention::StaticXyz);
    assert!((pose.x - back.x).abs() < 1e-9);
    assert!((pose.rz - back.rz).abs() < 1e-7);
}

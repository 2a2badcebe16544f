//! Inbound and outbound message shapes exchanged with neuronavigation
//! (spec §6). Fire-and-forget, unlike the teacher's `DaqCommand` enum
//! (which carries a `oneshot::Sender` reply channel per variant for its
//! actor's request/response pattern) — the relay feed here is one-way
//! telemetry in each direction, so no reply channel is needed.

use nalgebra::Matrix4;

use crate::objective::Objective;
use crate::pose::Pose;

/// Everything neuronavigation can send into the controller.
#[derive(Clone, Debug)]
pub enum InboundMessage {
    RobotConnection { robot_ip: String },
    SetTrackerFiducials { fiducials: [[f64; 3]; 3] },
    SetTarget { target: Matrix4<f64> },
    UnsetTarget,
    UpdateTrackerPoses { poses: [Option<Pose>; 3], visibilities: [bool; 3] },
    CreatePoint,
    ResetRobotMatrix,
    RobotMatrixEstimation,
    SetRobotTransformationMatrix { data: [f64; 48] },
    UpdateDisplacementToTarget { displacement: [f64; 6] },
    CoilAtTarget { state: bool },
    SetObjective { objective: Objective },
    SetFreedrive { set: bool },
    CheckConnectionRobot,
}

/// User-visible robot connection status (spec §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    NotConnected,
    TryingToConnect,
    UnableToConnect,
}

/// Everything the controller publishes back to neuronavigation.
#[derive(Clone, Debug)]
pub enum OutboundMessage {
    RobotConnectionStatus(ConnectionStatus),
    CloseRobotDialog,
    UpdateRobotTransformationMatrix { data: [f64; 48] },
    CoordinatesCollected { count: usize },
    SetObjective(Objective),
    /// Force sensor value, sign-negated relative to the raw reading
    /// (spec §6 "force_sensor_data (sign-negated)").
    ForceSensorData(f64),
    UpdateZOffsetTarget { stable: bool },
    UpdateRobotWarning(String),
    RestartRobotMainLoop,
}

/// Splits `set_robot_transformation_matrix`'s flat 48-value payload into
/// the three 4x4 matrices (X_est, Y_est, affine_tracker_to_robot) it packs.
pub fn unpack_transform_matrix(data: &[f64; 48]) -> (Matrix4<f64>, Matrix4<f64>, Matrix4<f64>) {
    let parse = |offset: usize| Matrix4::from_row_slice(&data[offset..offset + 16]);
    (parse(0), parse(16), parse(32))
}

/// Packs the three transform matrices back into the flat 48-value payload
/// `update_robot_transformation_matrix` publishes.
pub fn pack_transform_matrix(x_est: &Matrix4<f64>, y_est: &Matrix4<f64>, affine: &Matrix4<f64>) -> [f64; 48] {
    let mut data = [0.0; 48];
    for (dst, src) in data[0..16].iter_mut().zip(x_est.transpose().iter()) {
        *dst = *src;
    }
    for (dst, src) in data[16..32].iter_mut().zip(y_est.transpose().iter()) {
        *dst = *src;
    }
    for (dst, src) in data[32..48].iter_mut().zip(affine.transpose().iter()) {
        *dst = *src;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_round_trip() {
        let x = Matrix4::identity();
        let y = Matrix4::new(
            1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 2.0, 0.0, 0.0, 1.0, 3.0, 0.0, 0.0, 0.0, 1.0,
        );
        let affine = Matrix4::identity();
        let packed = pack_transform_matrix(&x, &y, &affine);
        let (x2, y2, affine2) = unpack_transform_matrix(&packed);
        assert_eq!(x, x2);
        assert_eq!(y, y2);
        assert_eq!(affine, affine2);
    }
}

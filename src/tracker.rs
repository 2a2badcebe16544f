//! Latest filtered tracker poses and the tracker-to-robot transform.
//!
//! Mirrors `PoseStore`'s "never expose a torn snapshot" guarantee, extended
//! to the three tracked bodies (head, coil, reference) plus the calibrated
//! transform triple produced by the calibration engine.

use nalgebra::Matrix4;
use std::sync::RwLock;

use crate::error::{ControlError, ControlResult};
use crate::pose::{EulerConvention, Pose};

/// The three rigid transforms a completed calibration produces (spec §4.4):
/// the TCP-to-coil offset, the tracker-base-to-robot-base offset, and the
/// affine tracker->robot transform used for everyday pose projection.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationTransform {
    pub x_est: Matrix4<f64>,
    pub y_est: Matrix4<f64>,
    pub affine_tracker_to_robot: Matrix4<f64>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Markers {
    head: Option<Pose>,
    coil: Option<Pose>,
    reference: Option<Pose>,
    head_visible: bool,
    coil_visible: bool,
    reference_visible: bool,
}

struct TrackerState {
    markers: Markers,
    transform: Option<CalibrationTransform>,
}

/// Holds the latest head/coil/reference poses, their per-marker visibility
/// flags, and the tracker->robot transform once calibrated.
pub struct TrackerFrame {
    inner: RwLock<TrackerState>,
}

impl TrackerFrame {
    pub fn new() -> Self {
        TrackerFrame {
            inner: RwLock::new(TrackerState {
                markers: Markers::default(),
                transform: None,
            }),
        }
    }

    /// Replaces all three marker poses and visibility flags as one atomic
    /// batch, so a pose is only ever valid together with its own
    /// visibility flag (spec §3 invariant).
    pub fn update_poses(
        &self,
        head: Option<Pose>,
        coil: Option<Pose>,
        reference: Option<Pose>,
        visibilities: [bool; 3],
    ) {
        let mut state = self.inner.write().expect("tracker frame lock poisoned");
        state.markers = Markers {
            head,
            coil,
            reference,
            head_visible: visibilities[0],
            coil_visible: visibilities[1],
            reference_visible: visibilities[2],
        };
    }

    pub fn head(&self) -> Option<Pose> {
        let state = self.inner.read().expect("tracker frame lock poisoned");
        if state.markers.head_visible {
            state.markers.head
        } else {
            None
        }
    }

    pub fn coil(&self) -> Option<Pose> {
        let state = self.inner.read().expect("tracker frame lock poisoned");
        if state.markers.coil_visible {
            state.markers.coil
        } else {
            None
        }
    }

    pub fn reference(&self) -> Option<Pose> {
        let state = self.inner.read().expect("tracker frame lock poisoned");
        if state.markers.reference_visible {
            state.markers.reference
        } else {
            None
        }
    }

    pub fn head_visible(&self) -> bool {
        self.inner.read().expect("tracker frame lock poisoned").markers.head_visible
    }

    pub fn coil_visible(&self) -> bool {
        self.inner.read().expect("tracker frame lock poisoned").markers.coil_visible
    }

    pub fn set_transform(&self, transform: CalibrationTransform) {
        self.inner.write().expect("tracker frame lock poisoned").transform = Some(transform);
    }

    pub fn has_transform(&self) -> bool {
        self.inner.read().expect("tracker frame lock poisoned").transform.is_some()
    }

    pub fn transform(&self) -> Option<CalibrationTransform> {
        self.inner.read().expect("tracker frame lock poisoned").transform
    }

    /// Projects `pose` into robot space via the hand-eye relation
    /// `robot * x_est ≈ y_est * pose` (spec §4.4), rearranged to
    /// `robot = y_est * pose * x_est^-1`. Falls back to the plain affine fit
    /// when `x_est` is singular, which can happen with few calibration
    /// samples. Fails when calibration hasn't produced a transform yet.
    pub fn transform_pose_to_robot_space(&self, pose: &Pose) -> ControlResult<Pose> {
        let state = self.inner.read().expect("tracker frame lock poisoned");
        let transform = state.transform.ok_or(ControlError::TransformNotSet)?;
        let pose_m = pose.to_matrix(EulerConvention::StaticXyz);
        let robot_m = match transform.x_est.try_inverse() {
            Some(x_inv) => transform.y_est * pose_m * x_inv,
            None => transform.affine_tracker_to_robot * pose_m,
        };
        Ok(Pose::from_matrix(&robot_m, EulerConvention::StaticXyz))
    }
}

impl Default for TrackerFrame {
    fn default() -> Self {
        Self::new()
    }
}

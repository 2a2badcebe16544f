//! Kalman-filtered head pose smoothing (spec §4.8 step 4).
//!
//! A constant-value scalar Kalman filter per pose axis: good enough to
//! damp optical-tracker jitter on a head that is expected to be nearly
//! stationary between ticks, without pulling in a dedicated filtering
//! crate for six independent scalars.

use crate::pose::Pose;

#[derive(Clone, Copy, Debug)]
struct ScalarKalmanFilter {
    estimate: f64,
    error_covariance: f64,
    process_noise: f64,
    measurement_noise: f64,
    initialized: bool,
}

impl ScalarKalmanFilter {
    fn new(process_noise: f64, measurement_noise: f64) -> Self {
        ScalarKalmanFilter {
            estimate: 0.0,
            error_covariance: 1.0,
            process_noise,
            measurement_noise,
            initialized: false,
        }
    }

    fn update(&mut self, measurement: f64) -> f64 {
        if !self.initialized {
            self.estimate = measurement;
            self.initialized = true;
            return self.estimate;
        }

        let predicted_covariance = self.error_covariance + self.process_noise;
        let kalman_gain = predicted_covariance / (predicted_covariance + self.measurement_noise);

        self.estimate += kalman_gain * (measurement - self.estimate);
        self.error_covariance = (1.0 - kalman_gain) * predicted_covariance;
        self.estimate
    }
}

/// Filters a head pose's six scalars independently.
pub struct HeadPoseFilter {
    axes: [ScalarKalmanFilter; 6],
}

impl HeadPoseFilter {
    pub fn new() -> Self {
        let make = || ScalarKalmanFilter::new(1e-3, 1e-1);
        HeadPoseFilter {
            axes: [make(), make(), make(), make(), make(), make()],
        }
    }

    pub fn update(&mut self, measured: Pose) -> Pose {
        Pose::new(
            self.axes[0].update(measured.x),
            self.axes[1].update(measured.y),
            self.axes[2].update(measured.z),
            self.axes[3].update(measured.rx),
            self.axes[4].update(measured.ry),
            self.axes[5].update(measured.rz),
        )
    }
}

impl Default for HeadPoseFilter {
    fn default() -> Self {
        Self::new()
    }
}

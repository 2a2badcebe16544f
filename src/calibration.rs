//! Tracker<->robot matrix estimation from paired pose samples (spec §4.4).
//!
//! Two outputs are produced from the same sample set: a best-fit rigid
//! transform between robot-frame and tracker-frame position triples
//! (Kabsch/Procrustes, via `nalgebra`'s SVD), and a hand-eye-style
//! alternating estimate of the TCP-to-coil offset `X` and the
//! tracker-base-to-robot-base offset `Y` such that `robot * X ≈ Y * coil`
//! across samples. The hand-eye routine starts from a fixed pseudo-random
//! seed so repeated runs over the same samples are bit-identical (spec §8
//! invariant 6), using the same `rand` dependency already pulled in
//! elsewhere for synthetic data generation.

use nalgebra::{Matrix3, Matrix4, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ControlError, ControlResult};
use crate::tracker::CalibrationTransform;

const HAND_EYE_SEED: u64 = 1;
const HAND_EYE_ITERATIONS: usize = 50;
const SINGULAR_THRESHOLD: f64 = 1e-9;
const MIN_SAMPLES: usize = 4;

/// Parallel ordered sequences of paired calibration samples. Appended and
/// cleared together, per spec §3.
#[derive(Clone, Debug, Default)]
pub struct CalibrationSamples {
    pub robot_poses: Vec<Matrix4<f64>>,
    pub coil_poses: Vec<Matrix4<f64>>,
    pub robot_positions: Vec<Vector3<f64>>,
    pub tracker_positions: Vec<Vector3<f64>>,
}

impl CalibrationSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        robot_pose: Matrix4<f64>,
        coil_pose: Matrix4<f64>,
        robot_position: Vector3<f64>,
        tracker_position: Vector3<f64>,
    ) {
        self.robot_poses.push(robot_pose);
        self.coil_poses.push(coil_pose);
        self.robot_positions.push(robot_position);
        self.tracker_positions.push(tracker_position);
    }

    pub fn clear(&mut self) {
        self.robot_poses.clear();
        self.coil_poses.clear();
        self.robot_positions.clear();
        self.tracker_positions.clear();
    }

    pub fn len(&self) -> usize {
        self.robot_poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robot_poses.is_empty()
    }
}

/// Finds the closest pure rotation matrix to `m` by SVD (handles reflection
/// by flipping the sign of the smallest singular vector when needed).
fn closest_rotation(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.clone().svd(true, true);
    let u = svd.u.expect("svd u");
    let v_t = svd.v_t.expect("svd v_t");
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        for i in 0..3 {
            u_fixed[(i, 2)] = -u_fixed[(i, 2)];
        }
        r = u_fixed * v_t;
    }
    r
}

fn translation_of(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

fn rotation_of(m: &Matrix4<f64>) -> Matrix3<f64> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

fn compose(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    m[(0, 3)] = translation.x;
    m[(1, 3)] = translation.y;
    m[(2, 3)] = translation.z;
    m
}

/// Best-fit rigid transform mapping `sources[i]` onto `targets[i]` in a
/// least-squares sense (Kabsch algorithm).
fn fit_rigid(sources: &[Vector3<f64>], targets: &[Vector3<f64>]) -> ControlResult<Matrix4<f64>> {
    if sources.len() != targets.len() {
        return Err(ControlError::MismatchedSamples(sources.len(), targets.len()));
    }
    if sources.len() < MIN_SAMPLES {
        return Err(ControlError::InsufficientSamples(sources.len()));
    }

    let n = sources.len() as f64;
    let centroid_s = sources.iter().fold(Vector3::zeros(), |acc, v| acc + v) / n;
    let centroid_t = targets.iter().fold(Vector3::zeros(), |acc, v| acc + v) / n;

    let mut h = Matrix3::zeros();
    for (s, t) in sources.iter().zip(targets.iter()) {
        let ds = s - centroid_s;
        let dt = t - centroid_t;
        h += ds * dt.transpose();
    }

    let svd = h.svd(true, true);
    if svd.singular_values.iter().any(|&sigma| sigma.abs() < SINGULAR_THRESHOLD) {
        return Err(ControlError::SingularCalibration);
    }

    let rotation = closest_rotation(&h);
    let translation = centroid_t - rotation * centroid_s;
    Ok(compose(rotation, translation))
}

fn random_near_identity(rng: &mut StdRng) -> Matrix4<f64> {
    use crate::pose::{EulerConvention, Pose};
    let small_angle = || rng.gen_range(-5.0_f64..5.0_f64);
    let small_offset = || rng.gen_range(-10.0_f64..10.0_f64);
    let pose = Pose::new(
        small_offset(),
        small_offset(),
        small_offset(),
        small_angle(),
        small_angle(),
        small_angle(),
    );
    pose.to_matrix(EulerConvention::StaticXyz)
}

/// Estimates tracker<->robot calibration from paired pose samples.
pub struct CalibrationEngine;

impl CalibrationEngine {
    /// Runs both estimation steps, returning the new transform triple. On a
    /// singular least-squares system the prior transform is left in place
    /// by the caller; this function only ever returns a fresh one or an
    /// error (spec §4.4).
    pub fn estimate(samples: &CalibrationSamples) -> ControlResult<CalibrationTransform> {
        if samples.robot_poses.len() != samples.coil_poses.len() {
            return Err(ControlError::MismatchedSamples(
                samples.robot_poses.len(),
                samples.coil_poses.len(),
            ));
        }
        if samples.len() < MIN_SAMPLES {
            return Err(ControlError::InsufficientSamples(samples.len()));
        }

        let affine_robot_to_tracker = fit_rigid(&samples.robot_positions, &samples.tracker_positions)?;
        let affine_tracker_to_robot = affine_robot_to_tracker
            .try_inverse()
            .ok_or(ControlError::SingularCalibration)?;

        let (x_est, y_est) = Self::estimate_hand_eye(samples)?;

        Ok(CalibrationTransform {
            x_est,
            y_est,
            affine_tracker_to_robot,
        })
    }

    /// Alternating-least-squares hand-eye estimate of `X` (TCP->coil) and
    /// `Y` (tracker-base->robot-base) such that `robot_i * X ≈ Y * coil_i`
    /// for every sample, seeded deterministically (spec §4.4/§8 invariant 6).
    fn estimate_hand_eye(samples: &CalibrationSamples) -> ControlResult<(Matrix4<f64>, Matrix4<f64>)> {
        let mut rng = StdRng::seed_from_u64(HAND_EYE_SEED);
        let mut x = random_near_identity(&mut rng);
        let mut y = random_near_identity(&mut rng);

        let coil_positions: Vec<Vector3<f64>> = samples.coil_poses.iter().map(translation_of).collect();

        for _ in 0..HAND_EYE_ITERATIONS {
            // Fix X, refit Y from (coil_i -> robot_i * X).
            let targets: Vec<Vector3<f64>> = samples
                .robot_poses
                .iter()
                .map(|a| translation_of(&(a * x)))
                .collect();
            y = fit_rigid(&coil_positions, &targets)?;

            // Fix Y, refit X by averaging A_i^{-1} * Y * B_i across samples.
            let mut rotation_sum = Matrix3::zeros();
            let mut translation_sum = Vector3::zeros();
            let mut count = 0usize;
            for (a, b) in samples.robot_poses.iter().zip(samples.coil_poses.iter()) {
                let a_inv = a.try_inverse().ok_or(ControlError::SingularCalibration)?;
                let candidate = a_inv * y * b;
                rotation_sum += rotation_of(&candidate);
                translation_sum += translation_of(&candidate);
                count += 1;
            }
            let n = count as f64;
            let rotation = closest_rotation(&(rotation_sum / n));
            x = compose(rotation, translation_sum / n);
        }

        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{EulerConvention, Pose};

    const SPREAD_POINTS: [(f64, f64, f64); 6] = [
        (10.0, 0.0, 0.0),
        (0.0, 10.0, 0.0),
        (0.0, 0.0, 10.0),
        (10.0, 10.0, 10.0),
        (20.0, 0.0, 10.0),
        (0.0, 20.0, 10.0),
    ];

    fn identity_samples(n: usize) -> CalibrationSamples {
        let mut samples = CalibrationSamples::new();
        for &(x, y, z) in SPREAD_POINTS.iter().take(n) {
            let robot_pose = Pose::new(x, y, z, 0.0, 0.0, 0.0).to_matrix(EulerConvention::StaticXyz);
            let coil_pose = robot_pose;
            samples.push(
                robot_pose,
                coil_pose,
                translation_of(&robot_pose),
                translation_of(&coil_pose),
            );
        }
        samples
    }

    #[test]
    fn test_insufficient_samples_rejected() {
        let samples = identity_samples(2);
        let result = CalibrationEngine::estimate(&samples);
        assert!(matches!(result, Err(ControlError::InsufficientSamples(2))));
    }

    #[test]
    fn test_identity_samples_recover_near_identity_affine() {
        let samples = identity_samples(6);
        let transform = CalibrationEngine::estimate(&samples).expect("calibration should succeed");
        let translation = translation_of(&transform.affine_tracker_to_robot);
        assert!(translation.norm() < 1e-6);
    }

    #[test]
    fn test_determinism_given_fixed_seed() {
        let samples = identity_samples(6);
        let a = CalibrationEngine::estimate(&samples).unwrap();
        let b = CalibrationEngine::estimate(&samples).unwrap();
        assert_eq!(a.x_est, b.x_est);
        assert_eq!(a.y_est, b.y_est);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut samples = identity_samples(5);
        samples.coil_poses.pop();
        let result = CalibrationEngine::estimate(&samples);
        assert!(matches!(result, Err(ControlError::MismatchedSamples(5, 4))));
    }
}

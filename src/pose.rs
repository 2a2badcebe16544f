//! Six-scalar poses and their conversion to/from 4x4 homogeneous transforms.
//!
//! Positions are millimetres, rotations are degrees. Two Euler conventions
//! are supported: `StaticXyz` (the canonical convention used everywhere
//! internally, equivalent to rotating-frame ZYX) and `RotatingXyz` (the
//! convention displacements arrive in from neuronavigation, rotation applied
//! before translation). Conversion between them happens once, on ingress.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Which Euler composition order a six-vector uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EulerConvention {
    /// Fixed-axis X then Y then Z; matrix product Rz * Ry * Rx.
    StaticXyz,
    /// Rotating-frame X then Y then Z; matrix product Rx * Ry * Rz.
    RotatingXyz,
}

/// A six-degree-of-freedom pose: translation in millimetres, rotation in
/// degrees, under the crate's canonical `StaticXyz` convention unless
/// otherwise noted at the call site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Pose { x, y, z, rx, ry, rz }
    }

    pub fn identity() -> Self {
        Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Sign-flips x and rx, reconciling tracker/TCP handedness with the
    /// robot frame on ingress (spec §3). Applying this twice is identity.
    pub fn flip_x_rx(&self) -> Pose {
        Pose::new(-self.x, self.y, self.z, -self.rx, self.ry, self.rz)
    }

    /// Builds the 4x4 homogeneous matrix for this pose under `convention`.
    pub fn to_matrix(&self, convention: EulerConvention) -> Matrix4<f64> {
        let r = euler_to_rotation(self.rx, self.ry, self.rz, convention);
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        m[(0, 3)] = self.x;
        m[(1, 3)] = self.y;
        m[(2, 3)] = self.z;
        m
    }

    /// Decomposes a 4x4 homogeneous matrix back into a pose under
    /// `convention`. Only well-defined away from the convention's gimbal
    /// lock singularity (spec §8 invariant 1).
    pub fn from_matrix(m: &Matrix4<f64>, convention: EulerConvention) -> Pose {
        let r = m.fixed_view::<3, 3>(0, 0).into_owned();
        let (rx, ry, rz) = rotation_to_euler(&r, convention);
        Pose::new(m[(0, 3)], m[(1, 3)], m[(2, 3)], rx, ry, rz)
    }

    /// Like [`to_matrix`](Self::to_matrix), but the translation column is
    /// `R * translation` rather than the raw translation — i.e. the
    /// rotation is composed before the translation instead of alongside
    /// it. Matches how a displacement-to-target offset is built (spec
    /// §4.9: rotation applied first, then translation, in the rotating
    /// frame the offset arrives in).
    pub fn to_matrix_rotate_then_translate(&self, convention: EulerConvention) -> Matrix4<f64> {
        let r = euler_to_rotation(self.rx, self.ry, self.rz, convention);
        let translated = r * self.translation();
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        m[(0, 3)] = translated.x;
        m[(1, 3)] = translated.y;
        m[(2, 3)] = translated.z;
        m
    }
}

pub(crate) fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

pub(crate) fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

pub(crate) fn rot_x(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

pub(crate) fn rot_y(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

pub(crate) fn rot_z(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

fn euler_to_rotation(rx: f64, ry: f64, rz: f64, convention: EulerConvention) -> Matrix3<f64> {
    let (a, b, c) = (deg_to_rad(rx), deg_to_rad(ry), deg_to_rad(rz));
    match convention {
        EulerConvention::StaticXyz => rot_z(c) * rot_y(b) * rot_x(a),
        EulerConvention::RotatingXyz => rot_x(a) * rot_y(b) * rot_z(c),
    }
}

fn rotation_to_euler(r: &Matrix3<f64>, convention: EulerConvention) -> (f64, f64, f64) {
    match convention {
        // R = Rz(c) * Ry(b) * Rx(a)
        EulerConvention::StaticXyz => {
            let ry = (-r[(2, 0)]).clamp(-1.0, 1.0).asin();
            let rx = r[(2, 1)].atan2(r[(2, 2)]);
            let rz = r[(1, 0)].atan2(r[(0, 0)]);
            (rad_to_deg(rx), rad_to_deg(ry), rad_to_deg(rz))
        }
        // R = Rx(a) * Ry(b) * Rz(c)
        EulerConvention::RotatingXyz => {
            let ry = r[(0, 2)].clamp(-1.0, 1.0).asin();
            let rx = (-r[(1, 2)]).atan2(r[(2, 2)]);
            let rz = (-r[(0, 1)]).atan2(r[(0, 0)]);
            (rad_to_deg(rx), rad_to_deg(ry), rad_to_deg(rz))
        }
    }
}

/// Converts a displacement six-vector received in `RotatingXyz` (TCP frame,
/// rotation applied before translation) into the canonical `StaticXyz`
/// representation, per spec §3.
pub fn rotating_to_static(pose: &Pose) -> Pose {
    let m = pose.to_matrix(EulerConvention::RotatingXyz);
    Pose::from_matrix(&m, EulerConvention::StaticXyz)
}

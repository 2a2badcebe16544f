//! Coil-to-robot alignment (spec §4.5).
//!
//! Re-expresses an incoming displacement from TCP frame into the robot's
//! end-effector frame using site-configured offsets. The offsets'
//! correctness was questioned at the source when non-zero (spec §9); this
//! crate preserves the stated `R^-1 * M_offset * R` formula as written and
//! simply defaults every offset to zero, where alignment is provably the
//! identity transform (spec §8 invariant 3).

use nalgebra::Matrix4;

use crate::pose::{deg_to_rad, rot_x, rot_y, rot_z, EulerConvention, Pose};

/// Builds the alignment rotation `R = Rx * Ry * Rz` from the site-configured
/// offsets, in degrees.
fn alignment_rotation(rx_offset: f64, ry_offset: f64, rz_offset: f64) -> Matrix4<f64> {
    let (a, b, c) = (deg_to_rad(rx_offset), deg_to_rad(ry_offset), deg_to_rad(rz_offset));
    let r3 = rot_x(a) * rot_y(b) * rot_z(c);
    let mut r4 = Matrix4::identity();
    r4.fixed_view_mut::<3, 3>(0, 0).copy_from(&r3);
    r4
}

/// Applies the coil-to-robot alignment transform to a displacement,
/// building and decoding `m_offset` in the static-frame XYZ Euler
/// convention, as the source's `on_coil_to_robot_alignment` does (its own
/// `axes="sxyz"` — distinct from `compute_target_in_robot_space`'s
/// `"rxyz"`, which is a different function with a different convention).
pub fn align_coil_to_robot(displacement: &Pose, rx_offset: f64, ry_offset: f64, rz_offset: f64) -> Pose {
    let m_offset = displacement.to_matrix(EulerConvention::StaticXyz);
    let r = alignment_rotation(rx_offset, ry_offset, rz_offset);
    let r_inv = r.try_inverse().unwrap_or_else(Matrix4::identity);
    let transformed = r_inv * m_offset * r;
    Pose::from_matrix(&transformed, EulerConvention::StaticXyz)
}

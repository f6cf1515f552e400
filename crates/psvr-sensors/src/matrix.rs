use crate::types::Angles;
use glam::{DMat4, Mat4};

/// Build the view rotation from a snapshot of cumulative angles (degrees).
///
/// Three independent rotations about the fixed frame axes are composed in
/// order X, Y, Z. The x sensor channel measures yaw, so it drives the
/// rotation about the vertical Y axis; the y channel (pitch) drives X.
/// No cross-axis correction is applied, so large cumulative angles show
/// gimbal-like artifacts until the next reset.
pub fn model_view_matrix(angles: Angles) -> Mat4 {
    let rotation = DMat4::from_rotation_x(angles.y.to_radians())
        * DMat4::from_rotation_y(angles.x.to_radians())
        * DMat4::from_rotation_z(angles.z.to_radians());
    rotation.as_mat4()
}

/// Quaternion stored as `[x, y, z, w]`.
pub type Quat = [f32; 4];

pub const QUAT_IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

// Planar poses only carry a heading, which is a rotation about +Z
pub fn quat_from_yaw(theta: f32) -> Quat {
    let half = theta * 0.5;
    [0.0, 0.0, half.sin(), half.cos()]
}

/// Normalizes a quaternion; a zero quaternion becomes the identity.
pub fn quat_normalize(quat: Quat) -> Quat {
    let len = quat.iter().map(|c| c * c).sum::<f32>().sqrt();
    if len <= f32::EPSILON || !len.is_finite() {
        return QUAT_IDENTITY;
    }
    quat.map(|c| c / len)
}

/// Heading (rotation about +Z) of a quaternion.
pub fn quat_yaw(quat: Quat) -> f32 {
    let [x, y, z, w] = quat;
    (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z))
}

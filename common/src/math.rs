//! Joint transform and rotation helpers.

use glam::{Quat, Vec3};

/// Local joint transform (translation, rotation, scale)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation relative to the parent joint
    pub translation: Vec3,
    /// Unit quaternion rotation
    pub rotation: Quat,
    /// Non-uniform scale
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform (no rotation, no translation, unit scale)
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Normalize a quaternion, falling back to identity for degenerate input.
pub fn normalize_quat(q: Quat) -> Quat {
    let len = q.length();
    if len > 0.0 && len.is_finite() {
        q / len
    } else {
        Quat::IDENTITY
    }
}

/// Normalized linear interpolation along the shortest path.
pub fn nlerp(a: Quat, b: Quat, t: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    normalize_quat(a + (b - a) * t)
}

/// Angle in radians between two rotations, ignoring quaternion sign.
pub fn quat_angle(a: Quat, b: Quat) -> f32 {
    let cos_half_angle = a.dot(b).abs().min(1.0);
    2.0 * cos_half_angle.acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quat_angle_ignores_sign() {
        let q = Quat::from_rotation_y(0.5);
        assert!(quat_angle(q, -q) < 1e-3);
        assert!((quat_angle(Quat::IDENTITY, q) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_nlerp_takes_shortest_path() {
        let a = Quat::from_rotation_z(0.2);
        let b = -Quat::from_rotation_z(0.6);
        let mid = nlerp(a, b, 0.5);
        assert!((quat_angle(mid, Quat::from_rotation_z(0.4))) < 1e-3);
        assert!((mid.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_degenerate() {
        assert_eq!(normalize_quat(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)), Quat::IDENTITY);
    }
}

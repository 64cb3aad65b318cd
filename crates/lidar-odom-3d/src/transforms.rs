use glam::{DQuat, DVec3};

/// A rigid body transformation in SE(3).
///
/// Stored as a unit quaternion and a translation; `dst_T_src * p_src = p_dst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    rotation: DQuat,
    translation: DVec3,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a new transform from a rotation and a translation.
    ///
    /// The rotation is re-normalized.
    pub fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    /// Create a pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(DQuat::IDENTITY, translation)
    }

    /// Create a transform from an axis, an angle in radians and a translation.
    pub fn from_axis_angle(axis: DVec3, angle: f64, translation: DVec3) -> Self {
        Self::new(DQuat::from_axis_angle(axis.normalize(), angle), translation)
    }

    /// The rotation part as a unit quaternion.
    #[inline]
    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    /// The translation part.
    #[inline]
    pub fn translation(&self) -> DVec3 {
        self.translation
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        Self {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    /// Compose two transforms: `self * other`.
    pub fn compose(&self, other: &RigidTransform) -> Self {
        Self {
            rotation: (self.rotation * other.rotation).normalize(),
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        (self.rotation * DVec3::from_array(*point) + self.translation).to_array()
    }

    /// Apply only the rotation to a vector.
    pub fn rotate_vector(&self, vector: &[f64; 3]) -> [f64; 3] {
        (self.rotation * DVec3::from_array(*vector)).to_array()
    }

    /// Interpolate between `self` (alpha = 0) and `other` (alpha = 1).
    ///
    /// The translation is blended linearly and the rotation follows the shortest arc.
    pub fn interpolate(&self, other: &RigidTransform, alpha: f64) -> Self {
        let mut end = other.rotation;
        if self.rotation.dot(end) < 0.0 {
            end = -end;
        }
        Self {
            rotation: self.rotation.slerp(end, alpha).normalize(),
            translation: self.translation.lerp(other.translation, alpha),
        }
    }

    /// The rotation angle of the transform in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        self.rotation.angle_between(DQuat::IDENTITY)
    }

    /// Check whether two transforms are equal up to `max_abs_diff` per component.
    ///
    /// `q` and `-q` are treated as the same rotation.
    pub fn abs_diff_eq(&self, other: &RigidTransform, max_abs_diff: f64) -> bool {
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        same_rotation
            && self
                .translation
                .abs_diff_eq(other.translation, max_abs_diff)
    }
}

impl std::ops::Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}

impl std::fmt::Display for RigidTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.translation;
        let q = self.rotation;
        let (yaw, pitch, roll) = q.to_euler(glam::EulerRot::ZYX);
        write!(
            f,
            "t:[{:.6}, {:.6}, {:.6}] ; q:[{:.6}, {:.6}, {:.6}, {:.6}] ; ypr (deg):[{:.3}, {:.3}, {:.3}]",
            t.x,
            t.y,
            t.z,
            q.x,
            q.y,
            q.z,
            q.w,
            yaw.to_degrees(),
            pitch.to_degrees(),
            roll.to_degrees()
        )
    }
}

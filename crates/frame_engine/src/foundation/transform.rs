//! Object transforms for per-draw push constants

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Translation, scale and Tait-Bryan rotation of a drawable
///
/// Rotation is applied in Y, X, Z order (yaw, pitch, roll), matching the
/// camera convention used by the viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// World-space position
    pub translation: Vector3<f32>,
    /// Per-axis scale
    pub scale: Vector3<f32>,
    /// Euler angles in radians (x = pitch, y = yaw, z = roll)
    pub rotation: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation: Vector3::zeros(),
        }
    }
}

impl Transform {
    /// Create a transform at `translation` with unit scale and no rotation
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Set a uniform scale
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vector3::new(scale, scale, scale);
        self
    }

    /// Rotation matrix for the Y-X-Z Euler angles
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        let (s1, c1) = self.rotation.y.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s3, c3) = self.rotation.z.sin_cos();

        #[rustfmt::skip]
        let rotation = Matrix3::new(
            c1 * c3 + s1 * s2 * s3, c3 * s1 * s2 - c1 * s3, c2 * s1,
            c2 * s3,                c2 * c3,                -s2,
            c1 * s2 * s3 - c3 * s1, c1 * c3 * s2 + s1 * s3, c1 * c2,
        );
        rotation
    }

    /// Model matrix: translate * rotate(Y, X, Z) * scale
    pub fn mat4(&self) -> Matrix4<f32> {
        let linear = self.rotation_matrix() * Matrix3::from_diagonal(&self.scale);
        let mut model = linear.to_homogeneous();
        model.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        model
    }

    /// Inverse-transpose of the model matrix's linear part, padded to 4x4
    ///
    /// For a rotation followed by a scale this reduces to rotate * scale⁻¹.
    pub fn normal_matrix(&self) -> Matrix4<f32> {
        let inverse_scale = self.scale.map(|s| 1.0 / s);
        (self.rotation_matrix() * Matrix3::from_diagonal(&inverse_scale)).to_homogeneous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_default_transform_is_identity() {
        let transform = Transform::default();
        assert_relative_eq!(transform.mat4(), Matrix4::identity());
        assert_relative_eq!(transform.normal_matrix(), Matrix4::identity());
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        let transform = Transform::from_translation(Vector3::new(1.0, -2.0, 4.5)).with_uniform_scale(0.5);
        let model = transform.mat4();

        assert_relative_eq!(model[(0, 3)], 1.0);
        assert_relative_eq!(model[(1, 3)], -2.0);
        assert_relative_eq!(model[(2, 3)], 4.5);
        assert_relative_eq!(model[(0, 0)], 0.5);
        assert_relative_eq!(model[(3, 3)], 1.0);
    }

    #[test]
    fn test_yaw_rotates_x_axis_towards_negative_z() {
        let transform = Transform {
            rotation: Vector3::new(0.0, FRAC_PI_2, 0.0),
            ..Transform::default()
        };
        let rotated = transform.rotation_matrix() * Vector3::x();
        assert_relative_eq!(rotated, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_inverts_scale() {
        let transform = Transform::default().with_uniform_scale(2.0);
        let normal = transform.normal_matrix();
        assert_relative_eq!(normal[(0, 0)], 0.5);
        assert_relative_eq!(normal[(1, 1)], 0.5);
        assert_relative_eq!(normal[(2, 2)], 0.5);
    }
}

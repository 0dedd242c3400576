//! Viewer camera producing Vulkan-convention matrices
//!
//! Depth maps to `[0, 1]` and +Y points down in clip space, so no extra
//! correction matrix is needed before the projection reaches the shaders.

use frame_engine::prelude::Transform;
use nalgebra::{Matrix4, Vector3};

#[derive(Debug, Clone)]
pub struct Camera {
    projection: Matrix4<f32>,
    view: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Matrix4::identity(),
            view: Matrix4::identity(),
        }
    }
}

impl Camera {
    /// Perspective projection with vertical field of view `fov_y` in radians
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect.abs() > f32::EPSILON, "Aspect ratio must be non-zero");
        let tan_half_fov = (fov_y / 2.0).tan();

        let mut projection = Matrix4::zeros();
        projection[(0, 0)] = 1.0 / (aspect * tan_half_fov);
        projection[(1, 1)] = 1.0 / tan_half_fov;
        projection[(2, 2)] = far / (far - near);
        projection[(2, 3)] = -(far * near) / (far - near);
        projection[(3, 2)] = 1.0;
        self.projection = projection;
    }

    /// View matrix for a camera at `position` rotated by Y-X-Z Euler angles
    pub fn set_view_yxz(&mut self, position: Vector3<f32>, rotation: Vector3<f32>) {
        let orientation = Transform {
            rotation,
            ..Transform::default()
        }
        .rotation_matrix()
        .transpose();

        let mut view = orientation.to_homogeneous();
        view.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-(orientation * position)));
        self.view = view;
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn view(&self) -> &Matrix4<f32> {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let mut camera = Camera::default();
        camera.set_perspective_projection(FRAC_PI_2, 1.0, 0.1, 10.0);

        let near = camera.projection() * Vector4::new(0.0, 0.0, 0.1, 1.0);
        let far = camera.projection() * Vector4::new(0.0, 0.0, 10.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_view_moves_camera_to_origin() {
        let mut camera = Camera::default();
        let position = Vector3::new(1.0, -2.0, -3.0);
        camera.set_view_yxz(position, Vector3::new(0.3, 1.1, 0.0));

        let eye = camera.view() * position.push(1.0);
        assert_relative_eq!(eye, Vector4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_unrotated_view_looks_down_positive_z() {
        let mut camera = Camera::default();
        camera.set_view_yxz(Vector3::zeros(), Vector3::zeros());

        let ahead = camera.view() * Vector4::new(0.0, 0.0, 5.0, 1.0);
        assert_relative_eq!(ahead, Vector4::new(0.0, 0.0, 5.0, 1.0));
    }
}

//! Keyboard camera controller moving in the XZ plane

use frame_engine::prelude::Transform;
use glfw::Key;
use nalgebra::Vector3;
use std::f32::consts::TAU;

/// Pitch stays short of straight up or down
const PITCH_LIMIT: f32 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct KeyMappings {
    pub move_left: Key,
    pub move_right: Key,
    pub move_forward: Key,
    pub move_backward: Key,
    pub move_up: Key,
    pub move_down: Key,
    pub look_left: Key,
    pub look_right: Key,
    pub look_up: Key,
    pub look_down: Key,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: Key::A,
            move_right: Key::D,
            move_forward: Key::W,
            move_backward: Key::S,
            move_up: Key::E,
            move_down: Key::Q,
            look_left: Key::Left,
            look_right: Key::Right,
            look_up: Key::Up,
            look_down: Key::Down,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyboardController {
    pub keys: KeyMappings,
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardController {
    /// Apply one frame of input to `transform`
    pub fn move_in_plane_xz(&self, is_pressed: impl Fn(Key) -> bool, dt: f32, transform: &mut Transform) {
        let axis = |positive: Key, negative: Key| {
            f32::from(u8::from(is_pressed(positive))) - f32::from(u8::from(is_pressed(negative)))
        };

        let rotate = Vector3::new(
            axis(self.keys.look_up, self.keys.look_down),
            axis(self.keys.look_right, self.keys.look_left),
            0.0,
        );
        if rotate.norm_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }
        transform.rotation.x = transform.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vector3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vector3::new(forward.z, 0.0, -forward.x);
        let up = Vector3::new(0.0, -1.0, 0.0);

        let direction = forward * axis(self.keys.move_forward, self.keys.move_backward)
            + right * axis(self.keys.move_right, self.keys.move_left)
            + up * axis(self.keys.move_up, self.keys.move_down);
        if direction.norm_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * direction.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_follows_yaw() {
        let controller = KeyboardController::default();
        let mut transform = Transform::default();

        controller.move_in_plane_xz(|key| key == Key::W, 1.0, &mut transform);
        assert_relative_eq!(transform.translation, Vector3::new(0.0, 0.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let controller = KeyboardController::default();
        let mut transform = Transform::default();

        controller.move_in_plane_xz(|key| matches!(key, Key::W | Key::D), 1.0, &mut transform);
        assert_relative_eq!(transform.translation.norm(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let controller = KeyboardController::default();
        let mut transform = Transform::default();

        controller.move_in_plane_xz(|key| key == Key::Up, 10.0, &mut transform);
        assert_relative_eq!(transform.rotation.x, PITCH_LIMIT);
    }

    #[test]
    fn test_no_input_leaves_transform_alone() {
        let controller = KeyboardController::default();
        let mut transform = Transform::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let before = transform;

        controller.move_in_plane_xz(|_| false, 0.5, &mut transform);
        assert_eq!(transform, before);
    }
}

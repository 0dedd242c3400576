//! Per-frame data handed to render systems

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector3, Vector4};
use std::rc::Rc;

use crate::foundation::transform::Transform;
use crate::render::frame_slots::FrameSlot;
use crate::render::model::Model;

/// Capacity of the point light array in [`GlobalUbo`]
pub const MAX_LIGHTS: usize = 10;

/// One point light in std140 layout
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightUbo {
    /// World-space position, w ignored
    pub position: [f32; 4],
    /// RGB color with intensity in w
    pub color: [f32; 4],
}

/// Scene-wide uniform block bound at set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    /// Camera projection
    pub projection: [[f32; 4]; 4],
    /// Camera view
    pub view: [[f32; 4]; 4],
    /// Ambient RGB with intensity in w
    pub ambient_light_color: [f32; 4],
    /// Active lights occupy `0..num_lights`
    pub point_lights: [PointLightUbo; MAX_LIGHTS],
    /// Number of active lights
    pub num_lights: i32,
    _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Matrix4::identity().into(),
            view: Matrix4::identity().into(),
            ambient_light_color: [1.0, 1.0, 1.0, 0.02],
            point_lights: [PointLightUbo::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Set the camera matrices
    pub fn set_camera(&mut self, projection: &Matrix4<f32>, view: &Matrix4<f32>) {
        self.projection = (*projection).into();
        self.view = (*view).into();
    }

    /// Drop all lights
    pub fn clear_lights(&mut self) {
        self.num_lights = 0;
    }

    /// Append a light
    ///
    /// # Panics
    /// If [`MAX_LIGHTS`] lights are already present.
    pub fn push_light(&mut self, position: Vector3<f32>, color: Vector3<f32>, intensity: f32) {
        let index = self.light_count();
        assert!(index < MAX_LIGHTS, "Point lights exceed maximum of {MAX_LIGHTS}");
        self.point_lights[index] = PointLightUbo {
            position: Vector4::new(position.x, position.y, position.z, 1.0).into(),
            color: [color.x, color.y, color.z, intensity],
        };
        self.num_lights += 1;
    }

    /// Active light count
    pub fn light_count(&self) -> usize {
        usize::try_from(self.num_lights).unwrap_or(0)
    }
}

/// What a [`DrawItem`] renders as
#[derive(Clone)]
pub enum DrawContent {
    /// Mesh drawn by the simple render system
    Model(Rc<Model>),
    /// Billboard light drawn by the point light system
    PointLight {
        /// Brightness multiplier written into the light's color w
        intensity: f32,
        /// Billboard radius in world units
        radius: f32,
    },
    /// Carries a transform only
    Empty,
}

/// A drawable in the scene
#[derive(Clone)]
pub struct DrawItem {
    /// Placement
    pub transform: Transform,
    /// RGB color; lights use it as their emitted color
    pub color: Vector3<f32>,
    /// Mesh, light, or nothing
    pub content: DrawContent,
}

impl DrawItem {
    /// A mesh at `transform`
    pub fn model(model: Rc<Model>, transform: Transform) -> Self {
        Self {
            transform,
            color: Vector3::new(1.0, 1.0, 1.0),
            content: DrawContent::Model(model),
        }
    }

    /// A point light at `position`
    pub fn point_light(position: Vector3<f32>, color: Vector3<f32>, intensity: f32, radius: f32) -> Self {
        Self {
            transform: Transform::from_translation(position).with_uniform_scale(radius),
            color,
            content: DrawContent::PointLight { intensity, radius },
        }
    }

    /// Light parameters when this item is a point light
    pub fn as_point_light(&self) -> Option<(f32, f32)> {
        match self.content {
            DrawContent::PointLight { intensity, radius } => Some((intensity, radius)),
            _ => None,
        }
    }
}

/// Everything a render system needs to record one frame
pub struct FrameInfo<'a> {
    /// Slot whose uniform buffer and descriptor set are in use
    pub frame_index: FrameSlot,
    /// Seconds since the previous frame
    pub frame_time: f32,
    /// Command buffer currently recording inside the swap chain render pass
    pub command_buffer: vk::CommandBuffer,
    /// Camera projection
    pub projection: Matrix4<f32>,
    /// Camera view
    pub view: Matrix4<f32>,
    /// Global uniforms for `frame_index`
    pub global_descriptor_set: vk::DescriptorSet,
    /// Scene contents
    pub items: &'a [DrawItem],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_global_ubo_std140_layout() {
        assert_eq!(size_of::<PointLightUbo>(), 32);
        assert_eq!(offset_of!(GlobalUbo, view), 64);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 128);
        assert_eq!(offset_of!(GlobalUbo, point_lights), 144);
        assert_eq!(offset_of!(GlobalUbo, num_lights), 144 + 32 * MAX_LIGHTS);
        assert_eq!(size_of::<GlobalUbo>(), 480);
    }

    #[test]
    fn test_push_light_counts_up() {
        let mut ubo = GlobalUbo::default();
        ubo.push_light(Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 0.0, 0.0), 0.5);

        assert_eq!(ubo.light_count(), 1);
        assert_eq!(ubo.point_lights[0].position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(ubo.point_lights[0].color, [1.0, 0.0, 0.0, 0.5]);

        ubo.clear_lights();
        assert_eq!(ubo.light_count(), 0);
    }

    #[test]
    #[should_panic(expected = "exceed maximum")]
    fn test_push_light_past_capacity_panics() {
        let mut ubo = GlobalUbo::default();
        for _ in 0..=MAX_LIGHTS {
            ubo.push_light(Vector3::zeros(), Vector3::zeros(), 1.0);
        }
    }

    #[test]
    fn test_point_light_item_scales_by_radius() {
        let item = DrawItem::point_light(Vector3::new(0.0, -1.0, 0.0), Vector3::new(1.0, 1.0, 1.0), 0.2, 0.1);
        assert_eq!(item.as_point_light(), Some((0.2, 0.1)));
        assert_eq!(item.transform.scale, Vector3::new(0.1, 0.1, 0.1));
    }
}

//! Procedural demo scene: a colored cube circled by point lights

use frame_engine::prelude::*;
use nalgebra::{Rotation3, Vector3};
use std::f32::consts::TAU;
use std::rc::Rc;

const LIGHT_COLORS: [[f32; 3]; 6] = [
    [1.0, 0.1, 0.1],
    [0.1, 0.1, 1.0],
    [0.1, 1.0, 0.1],
    [1.0, 1.0, 0.1],
    [0.1, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];
const LIGHT_INTENSITY: f32 = 0.2;
const LIGHT_RADIUS: f32 = 0.1;
/// Radians per second
const LIGHT_ORBIT_SPEED: f32 = 0.5;

/// Unit cube centered on the origin, one color per face
pub fn cube_model() -> ModelBuilder {
    // (normal, color, corners); corner order matches FACE_INDICES
    let faces: [([f32; 3], [f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [-1.0, 0.0, 0.0],
            [0.9, 0.9, 0.9],
            [[-0.5, -0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, -0.5]],
        ),
        (
            [1.0, 0.0, 0.0],
            [0.8, 0.8, 0.1],
            [[0.5, -0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, -0.5]],
        ),
        (
            [0.0, -1.0, 0.0],
            [0.9, 0.6, 0.1],
            [[-0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, -0.5]],
        ),
        (
            [0.0, 1.0, 0.0],
            [0.8, 0.1, 0.1],
            [[-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, -0.5]],
        ),
        (
            [0.0, 0.0, 1.0],
            [0.1, 0.1, 0.8],
            [[-0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, -0.5, 0.5]],
        ),
        (
            [0.0, 0.0, -1.0],
            [0.1, 0.8, 0.1],
            [[-0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, -0.5, -0.5]],
        ),
    ];
    const FACE_INDICES: [u32; 6] = [0, 1, 2, 0, 3, 1];

    let mut builder = ModelBuilder::default();
    for (normal, color, corners) in faces {
        let base = builder.vertices.len() as u32;
        builder.vertices.extend(corners.into_iter().map(|position| Vertex {
            normal,
            ..Vertex::new(position, color)
        }));
        builder.indices.extend(FACE_INDICES.iter().map(|index| base + index));
    }
    builder
}

/// Lights evenly spaced on a ring above the origin
pub fn light_ring() -> Vec<DrawItem> {
    let start = Vector3::new(-1.0, -1.0, -1.0);
    LIGHT_COLORS
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let angle = i as f32 * TAU / LIGHT_COLORS.len() as f32;
            let position = orbit(angle) * start;
            DrawItem::point_light(position, Vector3::from(*color), LIGHT_INTENSITY, LIGHT_RADIUS)
        })
        .collect()
}

// Lights orbit about -Y
fn orbit(angle: f32) -> Rotation3<f32> {
    Rotation3::from_axis_angle(&-Vector3::y_axis(), angle)
}

pub struct Scene {
    items: Vec<DrawItem>,
}

impl Scene {
    pub fn new(device: &Rc<Device>) -> VulkanResult<Self> {
        let cube = Rc::new(Model::new(device, &cube_model())?);

        let mut items = vec![
            DrawItem::model(Rc::clone(&cube), Transform::default().with_uniform_scale(0.5)),
            DrawItem::model(
                cube,
                Transform::from_translation(Vector3::new(0.0, 0.5, 0.0)).with_uniform_scale(0.1),
            ),
        ];
        items.extend(light_ring());

        log::info!("Scene built with {} items", items.len());
        Ok(Self { items })
    }

    /// Advance every point light along its orbit
    pub fn update(&mut self, dt: f32) {
        rotate_lights(&mut self.items, LIGHT_ORBIT_SPEED * dt);
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }
}

fn rotate_lights(items: &mut [DrawItem], angle: f32) {
    let rotation = orbit(angle);
    for item in items.iter_mut().filter(|item| item.as_point_light().is_some()) {
        item.transform.translation = rotation * item.transform.translation;
    }
}

//! Billboarded point lights

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::Vector3;
use std::mem::size_of;
use std::rc::Rc;

use super::TrackedPipeline;
use crate::config::ShaderPaths;
use crate::render::frame_info::{DrawItem, FrameInfo, GlobalUbo, MAX_LIGHTS};
use crate::render::pipeline::{PipelineConfig, PipelineLayout};
use crate::render::vulkan::{Device, VulkanResult};

/// Per-light push constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    /// World-space position, w ignored
    pub position: [f32; 4],
    /// RGB color with intensity in w
    pub color: [f32; 4],
    /// Billboard radius
    pub radius: f32,
    _padding: [f32; 3],
}

impl PointLightPushConstants {
    /// Push constants for a point light item, or `None` for other content
    pub fn for_item(item: &DrawItem) -> Option<Self> {
        let (intensity, radius) = item.as_point_light()?;
        let position = item.transform.translation;
        Some(Self {
            position: [position.x, position.y, position.z, 1.0],
            color: [item.color.x, item.color.y, item.color.z, intensity],
            radius,
            _padding: [0.0; 3],
        })
    }
}

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Vertices of the two triangles forming one billboard quad
const BILLBOARD_VERTEX_COUNT: u32 = 6;

/// Writes lights into the global uniforms and draws each as a soft disc
pub struct PointLightSystem {
    tracked: TrackedPipeline,
    config: PipelineConfig,
    shaders: ShaderPaths,
    pipeline_layout: PipelineLayout,
    device: Rc<Device>,
}

impl PointLightSystem {
    /// Build the layout and an alpha-blended pipeline for `render_pass`
    pub fn new(
        device: Rc<Device>,
        render_pass: vk::RenderPass,
        render_pass_generation: u64,
        global_set_layout: vk::DescriptorSetLayout,
        shaders: ShaderPaths,
    ) -> VulkanResult<Self> {
        let push_range = vk::PushConstantRange {
            stage_flags: PUSH_STAGES,
            offset: 0,
            size: size_of::<PointLightPushConstants>() as u32,
        };
        let pipeline_layout = PipelineLayout::new(device.logical(), &[global_set_layout], &[push_range])?;

        // The vertex shader generates the quad corners from gl_VertexIndex
        let config = PipelineConfig::dynamic()
            .enable_alpha_blending()
            .without_vertex_input()
            .with_pipeline_layout(pipeline_layout.handle());
        let tracked = TrackedPipeline::build(device.logical(), &shaders, &config, render_pass, render_pass_generation)?;

        log::debug!("Point light system ready");
        Ok(Self {
            tracked,
            config,
            shaders,
            pipeline_layout,
            device,
        })
    }

    /// Rebuild the pipeline if the renderer recreated its render pass
    pub fn refresh_pipeline(&mut self, render_pass: vk::RenderPass, render_pass_generation: u64) -> VulkanResult<bool> {
        if !self.tracked.is_stale(render_pass_generation) {
            return Ok(false);
        }
        self.tracked = TrackedPipeline::build(
            self.device.logical(),
            &self.shaders,
            &self.config,
            render_pass,
            render_pass_generation,
        )?;
        log::debug!("Point light pipeline rebuilt for generation {render_pass_generation}");
        Ok(true)
    }

    /// Copy every point light in `frame.items` into `ubo`
    ///
    /// # Panics
    /// If the scene holds more than [`MAX_LIGHTS`] lights.
    pub fn update(frame: &FrameInfo, ubo: &mut GlobalUbo) {
        write_lights(frame.items, ubo);
    }

    /// Record one billboard draw per light
    pub fn render(&self, frame: &FrameInfo) {
        let device = self.device.logical();
        let command_buffer = frame.command_buffer;
        self.tracked.pipeline.bind(command_buffer);

        unsafe {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout.handle(),
                0,
                &[frame.global_descriptor_set],
                &[],
            );
        }

        let mut lights: Vec<_> = frame.items.iter().filter_map(PointLightPushConstants::for_item).collect();
        if let Some(inverse_view) = frame.view.try_inverse() {
            let camera = inverse_view.fixed_view::<3, 1>(0, 3).into_owned();
            sort_back_to_front(&mut lights, &camera);
        }

        for push in &lights {
            unsafe {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout.handle(),
                    PUSH_STAGES,
                    0,
                    bytemuck::bytes_of(push),
                );
                device.cmd_draw(command_buffer, BILLBOARD_VERTEX_COUNT, 1, 0, 0);
            }
        }
    }
}

// Blended billboards must be drawn farthest first
fn sort_back_to_front(lights: &mut [PointLightPushConstants], camera: &Vector3<f32>) {
    let distance_squared = |light: &PointLightPushConstants| {
        let [x, y, z, _] = light.position;
        (Vector3::new(x, y, z) - camera).norm_squared()
    };
    lights.sort_by(|a, b| distance_squared(b).total_cmp(&distance_squared(a)));
}

fn write_lights(items: &[DrawItem], ubo: &mut GlobalUbo) {
    ubo.clear_lights();
    for item in items {
        let Some((intensity, _)) = item.as_point_light() else {
            continue;
        };
        ubo.push_light(item.transform.translation, item.color, intensity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::transform::Transform;
    use crate::render::frame_info::DrawContent;

    fn light(x: f32, intensity: f32) -> DrawItem {
        DrawItem::point_light(Vector3::new(x, 0.0, 0.0), Vector3::new(1.0, 0.5, 0.25), intensity, 0.1)
    }

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(size_of::<PointLightPushConstants>(), 48);
    }

    #[test]
    fn test_write_lights_skips_other_content() {
        let items = vec![
            light(1.0, 0.2),
            DrawItem {
                transform: Transform::default(),
                color: Vector3::zeros(),
                content: DrawContent::Empty,
            },
            light(-1.0, 0.8),
        ];
        let mut ubo = GlobalUbo::default();
        ubo.num_lights = 7;

        write_lights(&items, &mut ubo);

        assert_eq!(ubo.light_count(), 2);
        assert_eq!(ubo.point_lights[0].position, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(ubo.point_lights[1].color, [1.0, 0.5, 0.25, 0.8]);
    }

    #[test]
    #[should_panic(expected = "exceed maximum")]
    fn test_too_many_lights_panics() {
        let items: Vec<_> = (0..=MAX_LIGHTS).map(|i| light(i as f32, 1.0)).collect();
        write_lights(&items, &mut GlobalUbo::default());
    }

    #[test]
    fn test_lights_sorted_farthest_first() {
        let mut lights: Vec<_> = [0.5, 3.0, -1.5]
            .into_iter()
            .filter_map(|x| PointLightPushConstants::for_item(&light(x, 1.0)))
            .collect();

        sort_back_to_front(&mut lights, &Vector3::zeros());

        let xs: Vec<f32> = lights.iter().map(|l| l.position[0]).collect();
        assert_eq!(xs, vec![3.0, -1.5, 0.5]);
    }

    #[test]
    fn test_push_constants_only_for_lights() {
        let item = light(2.0, 0.3);
        let push = PointLightPushConstants::for_item(&item).unwrap();
        assert_eq!(push.position, [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(push.color[3], 0.3);
        assert_eq!(push.radius, 0.1);

        let empty = DrawItem {
            transform: Transform::default(),
            color: Vector3::zeros(),
            content: DrawContent::Empty,
        };
        assert!(PointLightPushConstants::for_item(&empty).is_none());
    }
}

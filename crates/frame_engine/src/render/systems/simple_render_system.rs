//! Lit mesh rendering

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;
use std::rc::Rc;

use super::TrackedPipeline;
use crate::config::ShaderPaths;
use crate::foundation::transform::Transform;
use crate::render::frame_info::{DrawContent, FrameInfo};
use crate::render::model::Vertex;
use crate::render::pipeline::{PipelineConfig, PipelineLayout};
use crate::render::vulkan::{Device, VulkanResult};

/// Per-draw push constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimplePushConstants {
    /// Object to world
    pub model_matrix: [[f32; 4]; 4],
    /// Inverse-transpose of the model matrix's linear part
    pub normal_matrix: [[f32; 4]; 4],
}

impl SimplePushConstants {
    /// Matrices for `transform`
    pub fn from_transform(transform: &Transform) -> Self {
        Self {
            model_matrix: transform.mat4().into(),
            normal_matrix: transform.normal_matrix().into(),
        }
    }
}

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Draws every [`DrawContent::Model`] item with the global uniforms bound
pub struct SimpleRenderSystem {
    tracked: TrackedPipeline,
    config: PipelineConfig,
    shaders: ShaderPaths,
    pipeline_layout: PipelineLayout,
    device: Rc<Device>,
}

impl SimpleRenderSystem {
    /// Build the layout and a pipeline for `render_pass`
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
            size: size_of::<SimplePushConstants>() as u32,
        };
        let pipeline_layout = PipelineLayout::new(device.logical(), &[global_set_layout], &[push_range])?;

        let config = PipelineConfig::dynamic()
            .with_vertex_input(Vertex::binding_descriptions(), Vertex::attribute_descriptions())
            .with_pipeline_layout(pipeline_layout.handle());
        let tracked = TrackedPipeline::build(device.logical(), &shaders, &config, render_pass, render_pass_generation)?;

        log::debug!("Simple render system ready");
        Ok(Self {
            tracked,
            config,
            shaders,
            pipeline_layout,
            device,
        })
    }

    /// Rebuild the pipeline if the renderer recreated its render pass
    ///
    /// Returns whether a rebuild happened.
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
        log::debug!("Simple render pipeline rebuilt for generation {render_pass_generation}");
        Ok(true)
    }

    /// Record draws for every model in `frame.items`
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

        for item in frame.items {
            let DrawContent::Model(model) = &item.content else {
                continue;
            };
            let push = SimplePushConstants::from_transform(&item.transform);
            unsafe {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout.handle(),
                    PUSH_STAGES,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            model.bind(device, command_buffer);
            model.draw(device, command_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_push_constants_fit_guaranteed_range() {
        // Every implementation supports at least 128 bytes of push constants
        assert_eq!(size_of::<SimplePushConstants>(), 128);
    }

    #[test]
    fn test_push_constants_are_column_major() {
        let transform = Transform::from_translation(Vector3::new(3.0, 4.0, 5.0));
        let push = SimplePushConstants::from_transform(&transform);

        assert_eq!(push.model_matrix[3], [3.0, 4.0, 5.0, 1.0]);
        assert_eq!(push.normal_matrix[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_push_stages_cover_vertex_and_fragment() {
        assert!(PUSH_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(PUSH_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}

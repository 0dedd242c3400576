//! Render systems that record draws for one kind of scene content

pub mod point_light_system;
pub mod simple_render_system;

pub use point_light_system::{PointLightPushConstants, PointLightSystem};
pub use simple_render_system::{SimplePushConstants, SimpleRenderSystem};

use ash::vk;

use crate::config::ShaderPaths;
use crate::render::pipeline::{GraphicsPipeline, PipelineConfig};
use crate::render::vulkan::VulkanResult;

/// A pipeline remembered together with the render pass generation it targets
struct TrackedPipeline {
    pipeline: GraphicsPipeline,
    generation: u64,
}

impl TrackedPipeline {
    fn build(
        device: &ash::Device,
        shaders: &ShaderPaths,
        config: &PipelineConfig,
        render_pass: vk::RenderPass,
        generation: u64,
    ) -> VulkanResult<Self> {
        let config = config.clone().with_render_pass(render_pass, 0);
        let pipeline = GraphicsPipeline::new(device, &shaders.vertex, &shaders.fragment, &config)?;
        Ok(Self { pipeline, generation })
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation != generation
    }
}

//! Compiled graphics pipelines

use ash::{vk, Device};
use std::path::Path;

use crate::render::pipeline::{PipelineConfig, ViewportMode};
use crate::render::vulkan::{ShaderModule, VulkanError, VulkanResult};

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout over descriptor set layouts and push constant ranges
    pub fn new(
        device: &Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Get layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Immutable pipeline state object built from a [`PipelineConfig`] snapshot
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Load vertex and fragment SPIR-V from disk and compile the pipeline
    ///
    /// # Panics
    /// If `config` has no pipeline layout or render pass.
    pub fn new(
        device: &Device,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        config: &PipelineConfig,
    ) -> VulkanResult<Self> {
        check_targets(config);
        let vertex = ShaderModule::from_file(device.clone(), vertex_path)?;
        let fragment = ShaderModule::from_file(device.clone(), fragment_path)?;
        Self::create(device, &vertex, &fragment, config)
    }

    /// Compile the pipeline from in-memory SPIR-V
    ///
    /// # Panics
    /// If `config` has no pipeline layout or render pass.
    pub fn from_bytecode(device: &Device, vertex: &[u8], fragment: &[u8], config: &PipelineConfig) -> VulkanResult<Self> {
        check_targets(config);
        let vertex = ShaderModule::from_bytes(device.clone(), vertex)?;
        let fragment = ShaderModule::from_bytes(device.clone(), fragment)?;
        Self::create(device, &vertex, &fragment, config)
    }

    fn create(
        device: &Device,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
        config: &PipelineConfig,
    ) -> VulkanResult<Self> {
        let stages = [
            vertex.create_stage_info(vk::ShaderStageFlags::VERTEX),
            fragment.create_stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(config.primitive_restart);

        // Dynamic mode still declares one viewport and scissor; their contents are ignored
        let extent = match config.viewport {
            ViewportMode::Fixed(extent) => extent,
            ViewportMode::Dynamic => vk::Extent2D::default(),
        };
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(config.line_width)
            .cull_mode(config.cull_mode.to_vk())
            .front_face(config.front_face)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(config.rasterization_samples)
            .min_sample_shading(1.0);

        let color_blend_attachments = [config.color_blend.to_vk()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_index(-1)
            .build();

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("Driver returned no pipeline".to_string()))?;

        Ok(Self {
            device: device.clone(),
            pipeline,
        })
    }

    /// Record a bind; must precede draws and push constants against this pipeline
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

fn check_targets(config: &PipelineConfig) {
    assert_ne!(
        config.pipeline_layout,
        vk::PipelineLayout::null(),
        "Cannot create graphics pipeline: no pipeline_layout provided in config"
    );
    assert_ne!(
        config.render_pass,
        vk::RenderPass::null(),
        "Cannot create graphics pipeline: no render_pass provided in config"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    #[should_panic(expected = "no pipeline_layout")]
    fn test_missing_layout_is_fatal() {
        let config = PipelineConfig::dynamic().with_render_pass(vk::RenderPass::from_raw(1), 0);
        check_targets(&config);
    }

    #[test]
    #[should_panic(expected = "no render_pass")]
    fn test_missing_render_pass_is_fatal() {
        let config = PipelineConfig::dynamic().with_pipeline_layout(vk::PipelineLayout::from_raw(1));
        check_targets(&config);
    }

    #[test]
    fn test_complete_config_passes_checks() {
        let config = PipelineConfig::dynamic()
            .with_pipeline_layout(vk::PipelineLayout::from_raw(1))
            .with_render_pass(vk::RenderPass::from_raw(2), 0);
        check_targets(&config);
    }
}

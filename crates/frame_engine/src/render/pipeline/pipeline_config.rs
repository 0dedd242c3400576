//! Pipeline configuration
//!
//! [`PipelineConfig`] is a plain value describing every piece of fixed-function
//! state a graphics pipeline is compiled with. Builders take and return it by
//! value and each one touches a disjoint set of fields, so they can be applied
//! in any order.

use ash::vk;

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// No culling
    #[default]
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
}

impl CullMode {
    /// Vulkan cull flags
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// How viewport and scissor are supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportMode {
    /// Set per command buffer; the pipeline survives extent changes
    Dynamic,
    /// Baked into the pipeline at this extent
    Fixed(vk::Extent2D),
}

/// Blend state for the single color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBlendState {
    /// Whether blending is enabled at all
    pub enabled: bool,
    /// Multiplier on the incoming color
    pub src_color_blend_factor: vk::BlendFactor,
    /// Multiplier on the stored color
    pub dst_color_blend_factor: vk::BlendFactor,
    /// Combines the weighted colors
    pub color_blend_op: vk::BlendOp,
    /// Multiplier on the incoming alpha
    pub src_alpha_blend_factor: vk::BlendFactor,
    /// Multiplier on the stored alpha
    pub dst_alpha_blend_factor: vk::BlendFactor,
    /// Combines the weighted alphas
    pub alpha_blend_op: vk::BlendOp,
    /// Channels written
    pub color_write_mask: vk::ColorComponentFlags,
}

impl ColorBlendState {
    /// Source replaces destination
    pub fn opaque() -> Self {
        Self {
            enabled: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Straight-alpha compositing: `src * a + dst * (1 - a)`
    pub fn alpha_blended() -> Self {
        Self {
            enabled: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ..Self::opaque()
        }
    }

    /// Vulkan attachment state
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::Bool32::from(self.enabled),
            src_color_blend_factor: self.src_color_blend_factor,
            dst_color_blend_factor: self.dst_color_blend_factor,
            color_blend_op: self.color_blend_op,
            src_alpha_blend_factor: self.src_alpha_blend_factor,
            dst_alpha_blend_factor: self.dst_alpha_blend_factor,
            alpha_blend_op: self.alpha_blend_op,
            color_write_mask: self.color_write_mask,
        }
    }
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self::opaque()
    }
}

/// Fixed-function state, vertex layout and target for one graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Viewport and scissor source
    pub viewport: ViewportMode,
    /// Primitive assembly
    pub topology: vk::PrimitiveTopology,
    /// Whether a special index restarts strips and fans
    pub primitive_restart: bool,
    /// Fill, line or point rasterization
    pub polygon_mode: vk::PolygonMode,
    /// Faces discarded before rasterization
    pub cull_mode: CullMode,
    /// Winding that counts as front-facing
    pub front_face: vk::FrontFace,
    /// Rasterized line width in pixels
    pub line_width: f32,
    /// Multisampling; a single sample disables it
    pub rasterization_samples: vk::SampleCountFlags,
    /// Depth testing
    pub depth_test: bool,
    /// Whether passing fragments update the depth buffer
    pub depth_write: bool,
    /// Test a fragment's depth against the stored value with this
    pub depth_compare_op: vk::CompareOp,
    /// Color attachment blending
    pub color_blend: ColorBlendState,
    /// State set at record time instead of baked in
    pub dynamic_states: Vec<vk::DynamicState>,
    /// Vertex buffer bindings
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    /// Layout the pipeline is created with; must be set before creation
    pub pipeline_layout: vk::PipelineLayout,
    /// Render pass the pipeline targets; must be set before creation
    pub render_pass: vk::RenderPass,
    /// Subpass index within `render_pass`
    pub subpass: u32,
}

impl PipelineConfig {
    /// Triangle lists, fill, no culling, single sample, depth less-than, opaque,
    /// with viewport and scissor baked in at `extent`
    pub fn default_config(extent: vk::Extent2D) -> Self {
        Self {
            viewport: ViewportMode::Fixed(extent),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: CullMode::None,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend: ColorBlendState::opaque(),
            dynamic_states: Vec::new(),
            binding_descriptions: Vec::new(),
            attribute_descriptions: Vec::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }

    /// Same defaults with dynamic viewport and scissor
    pub fn dynamic() -> Self {
        Self::default_config(vk::Extent2D::default()).with_dynamic_viewport()
    }

    /// Switch viewport and scissor to dynamic state
    #[must_use]
    pub fn with_dynamic_viewport(mut self) -> Self {
        self.viewport = ViewportMode::Dynamic;
        for state in [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR] {
            if !self.dynamic_states.contains(&state) {
                self.dynamic_states.push(state);
            }
        }
        self
    }

    /// Straight-alpha blending for the color attachment
    #[must_use]
    pub fn enable_alpha_blending(mut self) -> Self {
        self.color_blend = ColorBlendState::alpha_blended();
        self
    }

    /// Face culling
    #[must_use]
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Enable or disable depth test and write together
    #[must_use]
    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    /// Vertex buffer layout
    #[must_use]
    pub fn with_vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.binding_descriptions = bindings;
        self.attribute_descriptions = attributes;
        self
    }

    /// No vertex buffers; the vertex shader generates its own positions
    #[must_use]
    pub fn without_vertex_input(self) -> Self {
        self.with_vertex_input(Vec::new(), Vec::new())
    }

    /// Layout describing the descriptor sets and push constants
    #[must_use]
    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = layout;
        self
    }

    /// Target render pass and subpass
    #[must_use]
    pub fn with_render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn extent() -> vk::Extent2D {
        vk::Extent2D { width: 800, height: 600 }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default_config(extent());

        assert_eq!(config.viewport, ViewportMode::Fixed(extent()));
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(config.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert!(config.depth_test && config.depth_write);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(config.color_blend, ColorBlendState::opaque());
        assert!(config.dynamic_states.is_empty());
        assert_eq!(config.pipeline_layout, vk::PipelineLayout::null());
    }

    #[test]
    fn test_alpha_blending_commutes_with_other_builders() {
        let layout = vk::PipelineLayout::from_raw(7);
        let render_pass = vk::RenderPass::from_raw(9);

        let blend_first = PipelineConfig::default_config(extent())
            .enable_alpha_blending()
            .with_cull_mode(CullMode::Back)
            .with_depth(true, false)
            .with_pipeline_layout(layout)
            .with_render_pass(render_pass, 0);
        let blend_last = PipelineConfig::default_config(extent())
            .with_render_pass(render_pass, 0)
            .with_depth(true, false)
            .with_pipeline_layout(layout)
            .with_cull_mode(CullMode::Back)
            .enable_alpha_blending();

        assert_eq!(blend_first.color_blend, blend_last.color_blend);
        assert_eq!(blend_first.cull_mode, blend_last.cull_mode);
        assert_eq!(blend_first.depth_write, blend_last.depth_write);
        assert_eq!(blend_first.pipeline_layout, blend_last.pipeline_layout);
        assert_eq!(blend_first.render_pass, blend_last.render_pass);

        let blend = blend_first.color_blend;
        assert!(blend.enabled);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }

    #[test]
    fn test_alpha_blending_on_dynamic_config() {
        let config = PipelineConfig::dynamic().enable_alpha_blending();
        assert_eq!(config.viewport, ViewportMode::Dynamic);
        assert_eq!(config.color_blend, ColorBlendState::alpha_blended());
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_dynamic_viewport_is_idempotent() {
        let config = PipelineConfig::dynamic().with_dynamic_viewport();
        assert_eq!(config.dynamic_states.len(), 2);
    }

    #[test]
    fn test_cull_mode_flags() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(CullMode::default(), CullMode::None);
    }
}

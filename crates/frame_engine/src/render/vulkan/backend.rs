//! Vulkan implementation of the frame backend

use ash::vk;
use std::rc::Rc;

use crate::render::api::{ClearSettings, FrameBackend};
use crate::render::vulkan::{Device, SwapChain, VulkanError, VulkanResult};

/// Drives the renderer against a real [`Device`]
pub struct VulkanBackend {
    device: Rc<Device>,
    acquire_timeout: u64,
}

impl VulkanBackend {
    /// Backend using `acquire_timeout` nanoseconds for acquire and fence waits
    pub fn new(device: Rc<Device>, acquire_timeout: u64) -> Self {
        Self { device, acquire_timeout }
    }

    /// Shared device
    pub fn device(&self) -> &Rc<Device> {
        &self.device
    }
}

impl FrameBackend for VulkanBackend {
    type SwapChain = SwapChain;

    fn create_swap_chain(&self, extent: vk::Extent2D, previous: Option<&SwapChain>) -> VulkanResult<SwapChain> {
        SwapChain::new(Rc::clone(&self.device), extent, previous, self.acquire_timeout)
    }

    fn allocate_command_buffers(&self, count: usize) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let count = u32::try_from(count).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("Cannot allocate {count} command buffers"),
        })?;
        self.device.allocate_command_buffers(count)
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        self.device.free_command_buffers(command_buffers);
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .logical()
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .logical()
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)
        }
    }

    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: &ClearSettings,
    ) {
        let clear_values = clear.clear_values();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let device = self.device.logical();
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        }
    }

    fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.logical().cmd_end_render_pass(command_buffer) };
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}

//! Backend abstraction traits for frame orchestration
//!
//! The renderer only talks to the GPU through these traits, so the frame
//! loop can be driven by the Vulkan backend or by a scripted stand-in.

use ash::vk;

use crate::render::vulkan::VulkanResult;

/// Outcome of an acquire or present against the swap chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapChainStatus {
    /// Image acquired or presented normally
    Success,
    /// Usable, but the surface no longer matches exactly
    Suboptimal,
    /// Unusable; the swap chain must be recreated before drawing
    OutOfDate,
}

impl SwapChainStatus {
    /// Whether this status calls for swap chain recreation
    pub const fn needs_recreation(self) -> bool {
        matches!(self, Self::Suboptimal | Self::OutOfDate)
    }

    /// Map a present/acquire result code onto a status
    ///
    /// Codes other than success, suboptimal and out-of-date stay errors.
    pub fn from_vk(result: vk::Result) -> VulkanResult<Self> {
        match result {
            vk::Result::SUCCESS => Ok(Self::Success),
            vk::Result::SUBOPTIMAL_KHR => Ok(Self::Suboptimal),
            vk::Result::ERROR_OUT_OF_DATE_KHR => Ok(Self::OutOfDate),
            other => Err(other.into()),
        }
    }
}

/// Clear values applied when the swap chain render pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearSettings {
    /// RGBA color for attachment 0
    pub color: [f32; 4],
    /// Depth value for attachment 1
    pub depth: f32,
}

impl Default for ClearSettings {
    fn default() -> Self {
        Self {
            color: [0.01, 0.01, 0.01, 1.0],
            depth: 1.0,
        }
    }
}

impl ClearSettings {
    /// Clear values in attachment order (color, depth/stencil)
    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: 0,
                },
            },
        ]
    }
}

/// A set of presentable images with their render pass and frame synchronization
pub trait PresentTarget {
    /// Extent of the swap chain images
    fn extent(&self) -> vk::Extent2D;

    /// Number of presentable images the platform handed out
    fn image_count(&self) -> usize;

    /// Render pass compatible with every framebuffer
    fn render_pass(&self) -> vk::RenderPass;

    /// Framebuffer wrapping image `image_index`
    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer;

    /// Wait for the current frame slot's guard, then acquire the next image
    ///
    /// On `OutOfDate` the returned index is meaningless and must not be used.
    fn acquire_next_image(&mut self) -> VulkanResult<(u32, SwapChainStatus)>;

    /// Submit recorded work for `image_index` and queue it for presentation
    ///
    /// The frame slot advances whether or not this succeeds.
    fn submit_command_buffers(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> VulkanResult<SwapChainStatus>;

    /// Advance the frame slot without submitting, after recording failed
    ///
    /// The acquired image is never presented, so the swap chain is unusable
    /// for further frames and should be dropped.
    fn abandon_frame(&mut self);

    /// Whether `other` renders with the same color and depth formats
    fn compare_swap_formats(&self, other: &Self) -> bool;

    /// Width over height of the current extent
    fn extent_aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height as f32
    }
}

/// Device-side operations the renderer needs each frame
pub trait FrameBackend {
    /// Swap chain type produced by this backend
    type SwapChain: PresentTarget;

    /// Build a swap chain, reading compatible state from `previous` if given
    ///
    /// `previous` stays alive until the caller drops it after this returns.
    fn create_swap_chain(
        &self,
        extent: vk::Extent2D,
        previous: Option<&Self::SwapChain>,
    ) -> VulkanResult<Self::SwapChain>;

    /// Allocate primary command buffers
    fn allocate_command_buffers(&self, count: usize) -> VulkanResult<Vec<vk::CommandBuffer>>;

    /// Return command buffers to the pool
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    /// Start recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Begin `render_pass` on `framebuffer` and set viewport/scissor to `extent`
    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: &ClearSettings,
    );

    /// End the active render pass
    fn end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Block until the device has drained all queued work
    fn wait_idle(&self) -> VulkanResult<()>;
}

/// The window collaborator as seen by the frame loop
pub trait SurfaceWindow {
    /// Current framebuffer extent in pixels
    fn extent(&self) -> vk::Extent2D;

    /// Whether the framebuffer was resized since the flag was last reset
    fn was_resized(&self) -> bool;

    /// Clear the resize flag
    fn reset_resized_flag(&mut self);

    /// Block until the next platform event arrives
    fn wait_events(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::VulkanError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(SwapChainStatus::from_vk(vk::Result::SUCCESS).unwrap(), SwapChainStatus::Success);
        assert_eq!(
            SwapChainStatus::from_vk(vk::Result::ERROR_OUT_OF_DATE_KHR).unwrap(),
            SwapChainStatus::OutOfDate
        );
        assert!(SwapChainStatus::Suboptimal.needs_recreation());
        assert!(!SwapChainStatus::Success.needs_recreation());
    }

    #[test]
    fn test_timeout_is_an_error() {
        let result = SwapChainStatus::from_vk(vk::Result::TIMEOUT);
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::TIMEOUT))));
    }
}

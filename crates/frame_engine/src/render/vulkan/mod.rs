//! Vulkan rendering backend
//!
//! RAII wrappers over the Vulkan objects the frame loop needs, plus the
//! concrete [`VulkanBackend`] and [`SwapChain`] behind the renderer traits.

pub mod backend;
pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod window;

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub use backend::VulkanBackend;
pub use buffer::Buffer;
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use device::{Device, QueueFamilyIndices, SwapChainSupportDetails};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use render_pass::RenderPass;
pub use shader::ShaderModule;
pub use swapchain::SwapChain;
pub use sync::{Fence, FrameSync, Semaphore};
pub use window::{Window, WindowError};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(#[from] vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Shader bytecode could not be read or is not SPIR-V
    #[error("Failed to load shader {path:?}: {reason}")]
    ShaderLoad {
        /// File the bytecode was read from, if any
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

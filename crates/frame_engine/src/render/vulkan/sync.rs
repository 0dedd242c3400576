//! Fences and semaphores for frames in flight
//!
//! A [`Fence`] is the CPU-waitable completion guard that bounds how far the
//! CPU runs ahead of the GPU. A [`Semaphore`] orders queue operations on the
//! GPU without CPU involvement.

use ash::{vk, Device};

use crate::render::frame_slots::PerFrame;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-side ordering signal
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-waitable completion guard
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Block until signaled; a timeout comes back as `Api(TIMEOUT)`
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Return to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization primitives owned by one frame slot
pub struct FrameSync {
    /// Signaled when the acquired image is ready to be rendered into
    pub image_available: Semaphore,
    /// Signaled when rendering finished; presentation waits on it
    pub render_finished: Semaphore,
    /// Signaled when the slot's submitted work completed; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create one slot's primitives
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// One set per frame slot
    pub fn per_frame(device: &Device) -> VulkanResult<PerFrame<Self>> {
        PerFrame::try_from_fn(|_| Self::new(device))
    }
}

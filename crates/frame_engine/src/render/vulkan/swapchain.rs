//! Swap chain lifecycle and per-frame synchronization
//!
//! A [`SwapChain`] owns the presentable images, one depth buffer and
//! framebuffer per image, the render pass, and one [`FrameSync`] set per
//! frame slot. Replacing it is two-phase: build the new one while reading
//! from the old, then drop the old.

use ash::vk;
use std::rc::Rc;

use crate::render::api::{PresentTarget, SwapChainStatus};
use crate::render::frame_slots::{InFlightTracker, PerFrame};
use crate::render::vulkan::framebuffer::DEPTH_FORMAT_CANDIDATES;
use crate::render::vulkan::{
    DepthBuffer, Device, FrameSync, Framebuffer, RenderPass, VulkanError, VulkanResult,
};

/// Prefer 8-bit sRGB BGRA, otherwise whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when available; FIFO is always supported
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-dictated extent, or the window extent clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_extent
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: window_extent
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swap chain handle and the color views of its images
///
/// Owned separately so a partially built [`SwapChain`] releases them.
struct PresentImages {
    swapchain: vk::SwapchainKHR,
    image_views: Vec<vk::ImageView>,
    device: Rc<Device>,
}

impl PresentImages {
    fn new(device: &Rc<Device>, create_info: &vk::SwapchainCreateInfoKHR, format: vk::Format) -> VulkanResult<Self> {
        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(create_info, None).map_err(VulkanError::Api)? };
        let mut present = Self {
            swapchain,
            image_views: Vec::new(),
            device: Rc::clone(device),
        };

        let images = unsafe { loader.get_swapchain_images(swapchain).map_err(VulkanError::Api)? };
        present.image_views = create_image_views(device.logical(), &images, format)?;
        Ok(present)
    }
}

impl Drop for PresentImages {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.logical();
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.device.swapchain_loader().destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Presentable images with their render pass and frames-in-flight state
pub struct SwapChain {
    // Drop order matters: framebuffers go before the views they wrap
    framebuffers: Vec<Framebuffer>,
    depth_buffers: Vec<DepthBuffer>,
    render_pass: RenderPass,
    frame_sync: PerFrame<FrameSync>,
    present: PresentImages,
    tracker: InFlightTracker,
    image_format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    acquire_timeout: u64,
    device: Rc<Device>,
}

impl SwapChain {
    /// Build a swap chain for the device's surface
    ///
    /// When `previous` is given its handle is passed as `old_swapchain` and
    /// its frame slot carries over; the caller drops it afterwards.
    pub fn new(
        device: Rc<Device>,
        window_extent: vk::Extent2D,
        previous: Option<&Self>,
        acquire_timeout: u64,
    ) -> VulkanResult<Self> {
        let support = device.swap_chain_support()?;
        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_extent);
        let min_image_count = choose_image_count(&support.capabilities);

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];
        let old_swapchain = previous.map_or_else(vk::SwapchainKHR::null, |p| p.present.swapchain);

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface())
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let present = PresentImages::new(&device, &create_info, surface_format.format)?;
        let image_count = present.image_views.len();

        let depth_format = device.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;
        let render_pass = RenderPass::new_forward_pass(device.raw_device(), surface_format.format, depth_format)?;

        let depth_buffers = (0..image_count)
            .map(|_| DepthBuffer::new(&device, depth_format, extent))
            .collect::<VulkanResult<Vec<_>>>()?;
        let framebuffers = present
            .image_views
            .iter()
            .zip(&depth_buffers)
            .map(|(&view, depth)| {
                Framebuffer::new(
                    device.raw_device(),
                    render_pass.handle(),
                    &[view, depth.image_view()],
                    extent,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let frame_sync = FrameSync::per_frame(device.logical())?;
        let tracker = match previous {
            Some(previous) => InFlightTracker::starting_at(image_count, previous.tracker.current_slot()),
            None => InFlightTracker::new(image_count),
        };

        if let Some(previous) = previous {
            log::debug!(
                "Swap chain {}x{} replaced by {}x{}",
                previous.extent.width,
                previous.extent.height,
                extent.width,
                extent.height
            );
        }
        log::info!(
            "Swap chain created: {} images, {:?}, depth {:?}, {:?}",
            image_count,
            surface_format.format,
            depth_format,
            present_mode
        );

        Ok(Self {
            framebuffers,
            depth_buffers,
            render_pass,
            frame_sync,
            present,
            tracker,
            image_format: surface_format.format,
            depth_format,
            extent,
            acquire_timeout,
            device,
        })
    }

    /// Color format of the presentable images
    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    /// Format of the depth attachments
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Raw swap chain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.present.swapchain
    }

    fn submit_and_present(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> VulkanResult<SwapChainStatus> {
        if let Some(owner) = self.tracker.claim_image(image_index as usize) {
            self.frame_sync[owner].in_flight.wait(self.acquire_timeout)?;
        }

        let sync = &self.frame_sync[self.tracker.current_slot()];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            self.device
                .logical()
                .queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.present.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.present_queue(), &present_info)
        };
        match presented {
            Ok(false) => Ok(SwapChainStatus::Success),
            Ok(true) => Ok(SwapChainStatus::Suboptimal),
            Err(result) => SwapChainStatus::from_vk(result),
        }
    }
}

impl PresentTarget for SwapChain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.present.image_views.len()
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index].handle()
    }

    fn acquire_next_image(&mut self) -> VulkanResult<(u32, SwapChainStatus)> {
        let slot = self.tracker.current_slot();
        let sync = &self.frame_sync[slot];
        sync.in_flight.wait(self.acquire_timeout)?;

        let acquired = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.present.swapchain,
                self.acquire_timeout,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let (image_index, status) = match acquired {
            Ok((index, false)) => (index, SwapChainStatus::Success),
            Ok((index, true)) => (index, SwapChainStatus::Suboptimal),
            Err(result) => return SwapChainStatus::from_vk(result).map(|status| (0, status)),
        };

        // The image's command buffer is re-recorded before submit, so the
        // slot that last rendered into it has to be finished already
        if let Some(owner) = self.tracker.slot_guarding_image(image_index as usize) {
            if owner != slot {
                self.frame_sync[owner].in_flight.wait(self.acquire_timeout)?;
            }
        }

        Ok((image_index, status))
    }

    fn submit_command_buffers(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> VulkanResult<SwapChainStatus> {
        let result = self.submit_and_present(command_buffers, image_index);
        self.tracker.advance();
        result
    }

    fn abandon_frame(&mut self) {
        log::warn!(
            "Abandoning frame in slot {} without submitting",
            self.tracker.current_slot().index()
        );
        self.tracker.advance();
    }

    fn compare_swap_formats(&self, other: &Self) -> bool {
        self.image_format == other.image_format && self.depth_format == other.depth_format
    }
}

fn create_image_views(device: &ash::Device, images: &[vk::Image], format: vk::Format) -> VulkanResult<Vec<vk::ImageView>> {
    create_all_or_unwind(
        images,
        |&image| {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            unsafe { device.create_image_view(&create_info, None) }.map_err(VulkanError::Api)
        },
        |view| unsafe { device.destroy_image_view(view, None) },
    )
}

/// Create one `T` per input; on the first failure destroy the ones already made
fn create_all_or_unwind<I, T>(
    inputs: &[I],
    mut create: impl FnMut(&I) -> VulkanResult<T>,
    mut destroy: impl FnMut(T),
) -> VulkanResult<Vec<T>> {
    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        match create(input) {
            Ok(item) => created.push(item),
            Err(error) => {
                created.into_iter().rev().for_each(&mut destroy);
                return Err(error);
            }
        }
    }
    Ok(created)
}

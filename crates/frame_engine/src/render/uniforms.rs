//! Per-frame global uniform buffers and their descriptor sets

use ash::vk;
use std::mem::size_of;
use std::rc::Rc;

use crate::render::frame_info::GlobalUbo;
use crate::render::frame_slots::{FrameSlot, PerFrame, MAX_FRAMES_IN_FLIGHT};
use crate::render::vulkan::{
    Buffer, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter, Device, VulkanResult,
};

struct FrameUniforms {
    buffer: Buffer,
    descriptor_set: vk::DescriptorSet,
}

/// One mapped [`GlobalUbo`] buffer and descriptor set per frame slot
///
/// Writing the buffer for slot N only touches memory the GPU finished reading
/// once the slot's fence has signalled, which [`Renderer::begin_frame`] waits on.
///
/// [`Renderer::begin_frame`]: crate::render::Renderer::begin_frame
pub struct GlobalUniforms {
    frames: PerFrame<FrameUniforms>,
    // Sets are owned by the pool; the pool outlives them by field order.
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
}

impl GlobalUniforms {
    /// Allocate buffers, layout, pool and sets for every slot
    pub fn new(device: &Rc<Device>) -> VulkanResult<Self> {
        let logical = device.logical();
        let layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
            .build(logical)?;
        let pool = DescriptorPool::new(
            logical,
            MAX_FRAMES_IN_FLIGHT as u32,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
            }],
            vk::DescriptorPoolCreateFlags::empty(),
        )?;

        let frames = PerFrame::try_from_fn(|_| -> VulkanResult<FrameUniforms> {
            let mut buffer = Buffer::new(
                Rc::clone(device),
                size_of::<GlobalUbo>() as vk::DeviceSize,
                1,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
                device.min_uniform_buffer_offset_alignment(),
            )?;
            buffer.map()?;
            let descriptor_set = DescriptorWriter::new(&layout)
                .write_buffer(0, buffer.descriptor_info(vk::WHOLE_SIZE, 0))
                .build(&pool)?;
            Ok(FrameUniforms { buffer, descriptor_set })
        })?;

        log::debug!("Allocated global uniforms for {} frames in flight", frames.len());
        Ok(Self { frames, pool, layout })
    }

    /// Write and flush the uniform buffer for `slot`
    pub fn update(&mut self, slot: FrameSlot, ubo: &GlobalUbo) -> VulkanResult<()> {
        let frame = &mut self.frames[slot];
        frame.buffer.write_pod(ubo);
        frame.buffer.flush(vk::WHOLE_SIZE, 0)
    }

    /// Descriptor set bound at set 0 for `slot`
    pub fn descriptor_set(&self, slot: FrameSlot) -> vk::DescriptorSet {
        self.frames[slot].descriptor_set
    }

    /// Layout every render system's pipeline layout starts with
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    /// Number of sets the pool was sized for
    pub fn capacity(&self) -> u32 {
        self.pool.max_sets()
    }
}

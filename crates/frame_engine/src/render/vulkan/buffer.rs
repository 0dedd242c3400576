//! Host-visible and device-local buffers
//!
//! A [`Buffer`] holds `instance_count` instances of a fixed `instance_size`,
//! each padded to a caller-supplied offset alignment so that individual
//! instances can be bound as dynamic uniform offsets or flushed separately.

use ash::vk;
use bytemuck::Pod;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Round `instance_size` up to a multiple of `min_offset_alignment`
///
/// Alignments are powers of two; zero means unconstrained.
pub fn alignment(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// Expand a flush/invalidate range to `atom_size` boundaries within `buffer_size`
///
/// Returns `(offset, size)`; `WHOLE_SIZE` passes through unchanged.
pub fn atom_aligned_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom_size: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    if atom_size <= 1 {
        return (offset, size);
    }
    let start = offset - offset % atom_size;
    if size == vk::WHOLE_SIZE {
        return (start, vk::WHOLE_SIZE);
    }
    let end = alignment(offset + size, atom_size);
    if end >= buffer_size {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}

/// Buffer plus backing memory, optionally persistently mapped
pub struct Buffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<NonNull<u8>>,
    buffer_size: vk::DeviceSize,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
    device: Rc<Device>,
}

impl Buffer {
    /// Allocate `instance_count` aligned instances of `instance_size` bytes
    pub fn new(
        device: Rc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        assert!(instance_size > 0 && instance_count > 0, "Buffer must hold at least one non-empty instance");

        let alignment_size = alignment(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * vk::DeviceSize::from(instance_count);
        let (buffer, memory) = device.create_buffer(buffer_size, usage, memory_properties)?;

        Ok(Self {
            buffer,
            memory,
            mapped: None,
            buffer_size,
            instance_size,
            instance_count,
            alignment_size,
            usage,
            memory_properties,
            device,
        })
    }

    /// Map the whole buffer; a no-op if already mapped
    pub fn map(&mut self) -> VulkanResult<()> {
        assert!(
            self.memory_properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
            "Cannot map device-local buffer"
        );
        if self.mapped.is_some() {
            return Ok(());
        }
        let ptr = unsafe {
            self.device
                .logical()
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };
        self.mapped = NonNull::new(ptr.cast::<u8>());
        Ok(())
    }

    /// Unmap if mapped
    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.device.logical().unmap_memory(self.memory) };
        }
    }

    /// Copy `data` into the mapped buffer at `offset`
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) {
        let Some(mapped) = self.mapped else {
            panic!("Cannot copy to unmapped buffer");
        };
        assert!(
            offset + data.len() as vk::DeviceSize <= self.buffer_size,
            "Write of {} bytes at offset {offset} overruns buffer of {} bytes",
            data.len(),
            self.buffer_size
        );
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr().add(offset as usize), data.len());
        }
    }

    /// Write one plain-old-data value at the start of the buffer
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.write_to_buffer(bytemuck::bytes_of(value), 0);
    }

    /// Write one value into instance slot `index`
    pub fn write_to_index<T: Pod>(&mut self, value: &T, index: u32) {
        self.write_to_buffer(bytemuck::bytes_of(value), self.index_offset(index));
    }

    /// Make host writes in the range visible to the device
    ///
    /// Coherent memory needs no flush and returns immediately.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        if self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device
                .logical()
                .flush_mapped_memory_ranges(&[range])
                .map_err(VulkanError::Api)
        }
    }

    /// Flush instance slot `index`
    pub fn flush_index(&self, index: u32) -> VulkanResult<()> {
        self.flush(self.alignment_size, self.index_offset(index))
    }

    /// Make device writes in the range visible to the host
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        if self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device
                .logical()
                .invalidate_mapped_memory_ranges(&[range])
                .map_err(VulkanError::Api)
        }
    }

    /// Descriptor info covering `size` bytes at `offset`
    pub fn descriptor_info(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    /// Descriptor info for instance slot `index`
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, self.index_offset(index))
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Total size including alignment padding
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    /// Unpadded size of one instance
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Number of instances the buffer holds
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Stride between instances
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Whether the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    fn is_coherent(&self) -> bool {
        self.memory_properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    fn index_offset(&self, index: u32) -> vk::DeviceSize {
        assert!(index < self.instance_count, "Instance {index} out of range ({})", self.instance_count);
        vk::DeviceSize::from(index) * self.alignment_size
    }

    fn mapped_range(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::MappedMemoryRange {
        let (offset, size) = atom_aligned_range(offset, size, self.device.non_coherent_atom_size(), self.buffer_size);
        vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(offset)
            .size(size)
            .build()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            let device = self.device.logical();
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

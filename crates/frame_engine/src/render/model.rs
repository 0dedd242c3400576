//! Vertex layout and GPU-resident meshes

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};
use std::rc::Rc;

use crate::render::vulkan::{Buffer, Device, VulkanResult};

/// Interleaved vertex as laid out in the vertex buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Linear RGB color
    pub color: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex with a position and color and no normal or uv
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            color,
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }

    /// One interleaved per-vertex binding
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Locations 0..=3: position, color, normal, uv
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }
}

/// CPU-side mesh data
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Optional index data; empty means non-indexed drawing
    pub indices: Vec<u32>,
}

impl ModelBuilder {
    /// Non-indexed mesh
    pub fn from_vertices(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    /// Indexed mesh
    pub fn indexed(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of elements a draw call will consume
    pub fn draw_count(&self) -> usize {
        if self.indices.is_empty() {
            self.vertices.len()
        } else {
            self.indices.len()
        }
    }
}

/// Vertex (and optional index) buffers ready to draw
pub struct Model {
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<(Buffer, u32)>,
}

impl Model {
    /// Upload `builder` into host-visible buffers
    ///
    /// # Panics
    /// If the mesh has fewer than three vertices.
    pub fn new(device: &Rc<Device>, builder: &ModelBuilder) -> VulkanResult<Self> {
        assert!(builder.vertices.len() >= 3, "Vertex count must be at least 3");

        let vertex_count = builder.vertices.len() as u32;
        let vertex_buffer = upload(
            device,
            bytemuck::cast_slice(&builder.vertices),
            size_of::<Vertex>() as vk::DeviceSize,
            vertex_count,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            let index_count = builder.indices.len() as u32;
            let buffer = upload(
                device,
                bytemuck::cast_slice(&builder.indices),
                size_of::<u32>() as vk::DeviceSize,
                index_count,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?;
            Some((buffer, index_count))
        };

        log::debug!(
            "Model uploaded: {} vertices, {} indices",
            vertex_count,
            index_buffer.as_ref().map_or(0, |(_, count)| *count)
        );

        Ok(Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
        })
    }

    /// Bind vertex and index buffers
    pub fn bind(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.handle()], &[0]);
            if let Some((index_buffer, _)) = &self.index_buffer {
                device.cmd_bind_index_buffer(command_buffer, index_buffer.handle(), 0, vk::IndexType::UINT32);
            }
        }
    }

    /// Draw the whole mesh
    pub fn draw(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            match &self.index_buffer {
                Some((_, index_count)) => device.cmd_draw_indexed(command_buffer, *index_count, 1, 0, 0, 0),
                None => device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0),
            }
        }
    }

    /// Vertices in the vertex buffer
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

fn upload(
    device: &Rc<Device>,
    bytes: &[u8],
    instance_size: vk::DeviceSize,
    instance_count: u32,
    usage: vk::BufferUsageFlags,
) -> VulkanResult<Buffer> {
    let mut buffer = Buffer::new(
        Rc::clone(device),
        instance_size,
        instance_count,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        0,
    )?;
    buffer.map()?;
    buffer.write_to_buffer(bytes, 0);
    buffer.unmap();
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 44);

        let bindings = Vertex::binding_descriptions();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 44);

        let offsets: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        let locations: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_draw_count_prefers_indices() {
        let vertices = vec![Vertex::new([0.0; 3], [1.0; 3]); 4];
        assert_eq!(ModelBuilder::from_vertices(vertices.clone()).draw_count(), 4);
        assert_eq!(ModelBuilder::indexed(vertices, vec![0, 1, 2, 2, 3, 0]).draw_count(), 6);
    }
}

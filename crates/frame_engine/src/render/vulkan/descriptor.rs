//! Descriptor set layouts, pools and writes

use ash::vk;
use std::collections::BTreeMap;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Builder for a descriptor set layout
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<u32, vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `binding` with its type, visibility and array size
    ///
    /// # Panics
    /// If `binding` was already declared.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        assert!(!self.bindings.contains_key(&binding), "Binding {binding} already in use");
        self.bindings.insert(
            binding,
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Declare a single uniform buffer
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags, 1)
    }

    /// Declared bindings in binding order
    pub fn bindings(&self) -> impl Iterator<Item = &vk::DescriptorSetLayoutBinding> {
        self.bindings.values()
    }

    /// Create the layout
    pub fn build(self, device: &ash::Device) -> VulkanResult<DescriptorSetLayout> {
        let bindings: Vec<_> = self.bindings.values().copied().collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            bindings: self.bindings,
            device: device.clone(),
        })
    }
}

/// Descriptor set layout with its binding table
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: BTreeMap<u32, vk::DescriptorSetLayoutBinding>,
    device: ash::Device,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Fixed-capacity descriptor pool
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    max_sets: u32,
    device: ash::Device,
}

impl DescriptorPool {
    /// Pool able to hold `max_sets` sets drawing from `pool_sizes`
    pub fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            pool,
            max_sets,
            device: device.clone(),
        })
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)?;
        sets.into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("Descriptor pool returned no sets".to_string()))
    }

    /// Capacity in sets
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Collects uniform buffer writes for one set, checked against its layout
///
/// The Vulkan write structs are only assembled inside [`Self::overwrite`],
/// so the info pointers they carry stay valid for the update call.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    writes: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    /// Writer for sets created with `layout`
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            writes: Vec::new(),
        }
    }

    /// Point `binding` at a buffer range
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        let descriptor_type = single_descriptor_type(&self.layout.bindings, binding);
        self.writes.push((binding, descriptor_type, info));
        self
    }

    /// Allocate a set from `pool` and apply the writes to it
    pub fn build(self, pool: &DescriptorPool) -> VulkanResult<vk::DescriptorSet> {
        let set = pool.allocate(self.layout)?;
        self.overwrite(set);
        Ok(set)
    }

    /// Apply the writes to an existing set
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|(binding, descriptor_type, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*descriptor_type)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();

        unsafe { self.layout.device.update_descriptor_sets(&writes, &[]) };
    }
}

/// Type of `binding`, which must be declared with exactly one descriptor
fn single_descriptor_type(
    bindings: &BTreeMap<u32, vk::DescriptorSetLayoutBinding>,
    binding: u32,
) -> vk::DescriptorType {
    let Some(declared) = bindings.get(&binding) else {
        panic!("Layout does not contain binding {binding}");
    };
    assert_eq!(
        declared.descriptor_count, 1,
        "Binding {binding} expects {} descriptors, but a single one was written",
        declared.descriptor_count
    );
    declared.descriptor_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder_orders_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS);

        let bindings: Vec<_> = builder.bindings().map(|b| (b.binding, b.descriptor_type)).collect();
        assert_eq!(
            bindings,
            vec![
                (0, vk::DescriptorType::UNIFORM_BUFFER),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn test_duplicate_binding_panics() {
        let _ = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_single_descriptor_type_reads_declaration() {
        let builder = DescriptorSetLayoutBuilder::new().add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS);
        assert_eq!(
            single_descriptor_type(&builder.bindings, 0),
            vk::DescriptorType::UNIFORM_BUFFER
        );
    }

    #[test]
    #[should_panic(expected = "does not contain binding 3")]
    fn test_write_to_undeclared_binding_panics() {
        let builder = DescriptorSetLayoutBuilder::new().add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        let _ = single_descriptor_type(&builder.bindings, 3);
    }

    #[test]
    #[should_panic(expected = "expects 4 descriptors")]
    fn test_single_write_to_array_binding_panics() {
        let builder = DescriptorSetLayoutBuilder::new().add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            4,
        );
        let _ = single_descriptor_type(&builder.bindings, 0);
    }
}

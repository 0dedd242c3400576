//! Vulkan device management
//!
//! Owns the instance, debug messenger, surface, selected GPU, logical device,
//! queues and the graphics command pool. Everything else in the renderer
//! borrows from a shared `Rc<Device>`.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Entry, Instance};
use std::ffi::{CStr, CString};

use crate::render::vulkan::window::Window;
use crate::render::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Surface capabilities, formats and present modes for the selected GPU
#[derive(Debug, Clone, Default)]
pub struct SwapChainSupportDetails {
    /// Image count and extent limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported color format / color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupportDetails {
    /// A surface with no formats or no present modes cannot host a swap chain
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Graphics and present queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics work
    pub graphics: u32,
    /// Family able to present to the surface
    pub present: u32,
}

impl QueueFamilyIndices {
    /// First graphics-capable family and first presenting family
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> VulkanResult<bool>,
    ) -> VulkanResult<Option<Self>> {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
                graphics = Some(index);
            }
            if family.queue_count > 0 && present.is_none() && supports_present(index)? {
                present = Some(index);
            }
            if graphics.is_some() && present.is_some() {
                break;
            }
        }

        Ok(graphics.zip(present).map(|(graphics, present)| Self { graphics, present }))
    }

    /// Whether graphics and present share one family
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Pick a memory type allowed by `type_filter` that has every flag in `properties`
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// Logical device with the instance, surface and command pool it depends on
pub struct Device {
    _entry: Entry,
    instance: Instance,
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    queue_families: QueueFamilyIndices,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    command_pool: vk::CommandPool,
}

impl Device {
    /// Create the instance, surface and logical device for `window`
    pub fn new(window: &mut Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let enable_validation = enable_validation && validation_layer_available(&entry)?;
        let instance = create_instance(&entry, window, app_name, enable_validation)?;

        let debug_messenger = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                debug_utils
                    .create_debug_utils_messenger(&debug_messenger_info(), None)
                    .map_err(VulkanError::Api)?
            };
            Some((debug_utils, messenger))
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);
        let surface = window
            .create_surface(instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;

        let (physical_device, queue_families) = pick_physical_device(&instance, &surface_loader, surface)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        let device = create_logical_device(&instance, physical_device, queue_families, enable_validation)?;
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let swapchain_loader = SwapchainLoader::new(&instance, &device);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_families.graphics);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            _entry: entry,
            instance,
            debug_messenger,
            surface_loader,
            surface,
            physical_device,
            properties,
            queue_families,
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            command_pool,
        })
    }

    /// Logical device dispatch table
    pub fn logical(&self) -> &ash::Device {
        &self.device
    }

    /// Owned clone of the dispatch table, for RAII wrappers
    pub fn raw_device(&self) -> ash::Device {
        self.device.clone()
    }

    /// Instance dispatch table
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Selected GPU
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Presentation surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// `VK_KHR_swapchain` loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Queue family indices used for queue creation
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Command pool for the graphics family
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Physical device properties and limits
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Required alignment for dynamic uniform buffer offsets
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Granularity of non-coherent memory flushes
    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.properties.limits.non_coherent_atom_size
    }

    /// Query surface support for the current surface state
    pub fn swap_chain_support(&self) -> VulkanResult<SwapChainSupportDetails> {
        query_swap_chain_support(&self.surface_loader, self.physical_device, self.surface)
    }

    /// Memory type index for an allocation
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        let memory_properties = unsafe { self.instance.get_physical_device_memory_properties(self.physical_device) };
        select_memory_type(&memory_properties, type_filter, properties).ok_or(VulkanError::NoSuitableMemoryType)
    }

    /// First format in `candidates` supporting `features` with `tiling`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                    _ => false,
                }
            })
            .ok_or_else(|| VulkanError::InitializationFailed("Failed to find supported format".to_string()))
    }

    /// Create a buffer and bind freshly allocated memory to it
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        allocate_and_bind(
            buffer,
            || self.allocate(requirements, properties),
            |buffer, memory| unsafe { self.device.bind_buffer_memory(buffer, memory, 0) },
            |buffer| unsafe { self.device.destroy_buffer(buffer, None) },
            |memory| unsafe { self.device.free_memory(memory, None) },
        )
    }

    /// Create an image from `image_info` and bind freshly allocated memory to it
    pub fn create_image_with_info(
        &self,
        image_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
        let image = unsafe { self.device.create_image(image_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        allocate_and_bind(
            image,
            || self.allocate(requirements, properties),
            |image, memory| unsafe { self.device.bind_image_memory(image, memory, 0) },
            |image| unsafe { self.device.destroy_image(image, None) },
            |memory| unsafe { self.device.free_memory(memory, None) },
        )
    }

    /// Allocate primary command buffers from the graphics pool
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    /// Return command buffers to the graphics pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) };
    }

    /// Full device-idle barrier
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(self.find_memory_type(requirements.memory_type_bits, properties)?);

        unsafe { self.device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
    let layers = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !available {
        log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    Ok(available)
}

fn create_instance(entry: &Entry, window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Instance> {
    let app_name_cstr = CString::new(app_name)
        .map_err(|_| VulkanError::InitializationFailed(format!("Invalid application name: {app_name:?}")))?;
    let engine_name = CString::new("Frame Engine").map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let required_extensions = window
        .required_instance_extensions()
        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}")))?;
    let extension_names = required_extensions
        .iter()
        .map(|ext| CString::new(ext.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

    let mut extensions: Vec<*const std::os::raw::c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
    let mut layers = Vec::new();
    if enable_validation {
        extensions.push(DebugUtils::name().as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let mut messenger_info = debug_messenger_info();
    let mut create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    if enable_validation {
        // Also covers messages from instance creation and destruction
        create_info = create_info.push_next(&mut messenger_info);
    }

    unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api) }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Forwards validation layer messages to the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

fn query_swap_chain_support(
    surface_loader: &Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VulkanResult<SwapChainSupportDetails> {
    unsafe {
        Ok(SwapChainSupportDetails {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)?,
            formats: surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(VulkanError::Api)?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)?,
        })
    }
}

fn pick_physical_device(
    instance: &Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
) -> VulkanResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };
    log::debug!("Found {} physical device(s)", devices.len());

    for device in devices {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let indices = QueueFamilyIndices::find(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .map_err(VulkanError::Api)
        })?;
        let Some(indices) = indices else { continue };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_swapchain = extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == SwapchainLoader::name());
        if !has_swapchain {
            continue;
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        let support = query_swap_chain_support(surface_loader, device, surface)?;
        if support.is_adequate() && features.sampler_anisotropy == vk::TRUE {
            return Ok((device, indices));
        }
    }

    Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
}

fn create_logical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
    enable_validation: bool,
) -> VulkanResult<ash::Device> {
    let priorities = [1.0_f32];
    let mut families = vec![queue_families.graphics];
    if !queue_families.is_shared() {
        families.push(queue_families.present);
    }
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&priorities)
                .build()
        })
        .collect();

    let extensions = [SwapchainLoader::name().as_ptr()];
    let layers = if enable_validation { vec![VALIDATION_LAYER.as_ptr()] } else { Vec::new() };
    let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers)
        .enabled_features(&features);

    unsafe {
        instance
            .create_device(physical_device, &create_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Allocate and bind memory for a fresh `resource`
///
/// Whatever was created is destroyed again when a step fails.
fn allocate_and_bind<R: Copy, M: Copy>(
    resource: R,
    allocate: impl FnOnce() -> VulkanResult<M>,
    bind: impl FnOnce(R, M) -> Result<(), vk::Result>,
    destroy: impl FnOnce(R),
    free: impl FnOnce(M),
) -> VulkanResult<(R, M)> {
    let memory = match allocate() {
        Ok(memory) => memory,
        Err(e) => {
            destroy(resource);
            return Err(e);
        }
    };

    if let Err(result) = bind(resource, memory) {
        free(memory);
        destroy(resource);
        return Err(VulkanError::Api(result));
    }
    Ok((resource, memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_families_prefer_first_match() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = QueueFamilyIndices::find(&families, |index| Ok(index == 2)).unwrap().unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 2 });
        assert!(!indices.is_shared());
    }

    #[test]
    fn test_queue_families_missing_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap(), None);
    }

    #[test]
    fn test_memory_type_selection_respects_filter_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(select_memory_type(&props, 0b111, host), Some(1));
        assert_eq!(select_memory_type(&props, 0b100, host), Some(2));
        assert_eq!(select_memory_type(&props, 0b001, host), None);
    }

    #[test]
    fn test_failed_bind_frees_memory_and_resource() {
        let released = std::cell::RefCell::new(Vec::new());
        let result = allocate_and_bind(
            7u64,
            || Ok(70u64),
            |_, _| Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            |resource| released.borrow_mut().push(("resource", resource)),
            |memory| released.borrow_mut().push(("memory", memory)),
        );

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))));
        assert_eq!(released.into_inner(), vec![("memory", 70), ("resource", 7)]);
    }

    #[test]
    fn test_failed_allocation_destroys_resource_only() {
        let released = std::cell::RefCell::new(Vec::new());
        let result = allocate_and_bind(
            7u64,
            || Err::<u64, _>(VulkanError::NoSuitableMemoryType),
            |_, _| Ok(()),
            |resource| released.borrow_mut().push(("resource", resource)),
            |memory| released.borrow_mut().push(("memory", memory)),
        );

        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
        assert_eq!(released.into_inner(), vec![("resource", 7)]);
    }

    #[test]
    fn test_successful_bind_keeps_both() {
        let result = allocate_and_bind(7u64, || Ok(70u64), |_, _| Ok(()), |_| panic!("destroyed"), |_| panic!("freed"));
        assert_eq!(result.unwrap(), (7, 70));
    }
}

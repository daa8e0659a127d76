//! Logical device, physical device selection and GPU object lifetimes
//!
//! [`Device`] is the single place that talks to the Vulkan device-level API.
//! Every `create_*` wrapper either returns the new object or ends the process
//! through [`fail`]; there is no partially-created state to unwind.

use super::deletion_queue::{DeletionQueue, PendingDestroy};
use super::instance::VulkanInstance;
use crate::assets::EngineConfigAsset;
use crate::foundation::fail::{fail, FailureKind, OrFail};
use crate::platform::Platform;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use std::ffi::CStr;
use std::sync::{Mutex, MutexGuard};

/// Queue roles the engine resolves during device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCapability {
    /// Graphics command submission
    Graphics,
    /// Presentation to the window surface
    Present,
}

/// What one queue family can do, as probed from the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    /// Family accepts graphics commands
    pub graphics: bool,
    /// Family can present to the target surface
    pub present: bool,
}

/// Resolved queue family per capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// First family with present support
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Pick the first family supporting each capability
    pub fn resolve(families: &[QueueFamilySupport]) -> Self {
        let first = |wanted: fn(&QueueFamilySupport) -> bool| {
            families
                .iter()
                .position(wanted)
                .and_then(|index| u32::try_from(index).ok())
        };

        Self {
            graphics: first(|family| family.graphics),
            present: first(|family| family.present),
        }
    }

    /// Whether every capability resolved
    pub const fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// The family resolved for `capability`
    pub const fn get(&self, capability: QueueCapability) -> Option<u32> {
        match capability {
            QueueCapability::Graphics => self.graphics,
            QueueCapability::Present => self.present,
        }
    }

    /// Distinct resolved families, ascending
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics, self.present].into_iter().flatten().collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Prefer 8-bit BGRA with sRGB encoding, else whatever the driver lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|candidate| {
            candidate.format == vk::Format::B8G8R8A8_SRGB
                && candidate.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

struct Queues {
    graphics: Option<vk::Queue>,
    present: Option<vk::Queue>,
}

/// The GPU: instance, surface, logical device and queues
///
/// Shared as `Arc<Device>` by everything that owns GPU objects, so the logical
/// device outlives all of them.
pub struct Device {
    deletion_queue: Mutex<DeletionQueue>,
    surface_format: vk::SurfaceFormatKHR,
    swapchain_loader: SwapchainLoader,
    queues: Queues,
    queue_families: QueueFamilyIndices,
    raw: ash::Device,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    instance: VulkanInstance,
}

impl Device {
    /// Bring up Vulkan for the platform's window
    pub fn new(config: &EngineConfigAsset, platform: &mut dyn Platform) -> Self {
        let instance = VulkanInstance::new(
            &config.game_name(),
            &config.engine_name(),
            &platform.required_instance_extensions(),
        );

        let surface_loader = Surface::new(instance.entry(), instance.raw());
        let surface = platform.create_surface(instance.raw().handle());

        let (physical_device, queue_families, formats) =
            Self::select_physical_device(&instance, &surface_loader, surface);

        let surface_format = choose_surface_format(&formats)
            .or_fail(FailureKind::NoSuitableGpu, "selected device reports no surface formats");

        let raw = Self::create_logical_device(&instance, physical_device, &queue_families);
        let queues = Queues {
            graphics: queue_families
                .graphics
                .map(|family| unsafe { raw.get_device_queue(family, 0) }),
            present: queue_families
                .present
                .map(|family| unsafe { raw.get_device_queue(family, 0) }),
        };
        let swapchain_loader = SwapchainLoader::new(instance.raw(), &raw);

        log::info!(
            "Created logical device (graphics family {:?}, present family {:?}, surface format {:?})",
            queue_families.graphics,
            queue_families.present,
            surface_format.format
        );

        Self {
            deletion_queue: Mutex::new(DeletionQueue::default()),
            surface_format,
            swapchain_loader,
            queues,
            queue_families,
            raw,
            physical_device,
            surface,
            surface_loader,
            instance,
        }
    }

    fn select_physical_device(
        instance: &VulkanInstance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> (vk::PhysicalDevice, QueueFamilyIndices, Vec<vk::SurfaceFormatKHR>) {
        let devices = unsafe { instance.raw().enumerate_physical_devices() }
            .or_fail(FailureKind::Gpu, "vkEnumeratePhysicalDevices");
        if devices.is_empty() {
            fail(FailureKind::NoSuitableGpu, "no Vulkan physical devices are present");
        }

        for device in devices {
            let name = Self::device_name(instance, device);

            let formats = unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }
                .or_fail(FailureKind::Gpu, "vkGetPhysicalDeviceSurfaceFormatsKHR");
            let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }
                .or_fail(FailureKind::Gpu, "vkGetPhysicalDeviceSurfacePresentModesKHR");
            if formats.is_empty() || present_modes.is_empty() {
                log::debug!("Skipping {}: no surface formats or present modes", name);
                continue;
            }

            let families = unsafe { instance.raw().get_physical_device_queue_family_properties(device) };
            let support: Vec<QueueFamilySupport> = families
                .iter()
                .zip(0u32..)
                .map(|(family, index)| QueueFamilySupport {
                    graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present: unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                        .or_fail(FailureKind::Gpu, "vkGetPhysicalDeviceSurfaceSupportKHR"),
                })
                .collect();

            let indices = QueueFamilyIndices::resolve(&support);
            if !indices.is_complete() {
                log::debug!("Skipping {}: missing graphics or present queue family", name);
                continue;
            }

            if !Self::supports_swapchain(instance, device) {
                log::debug!("Skipping {}: no {:?}", name, SwapchainLoader::name());
                continue;
            }

            log::info!("Selected GPU: {}", name);
            return (device, indices, formats);
        }

        fail(FailureKind::NoSuitableGpu, "no device supports graphics and presentation to the window surface")
    }

    fn device_name(instance: &VulkanInstance, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { instance.raw().get_physical_device_properties(device) };
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn supports_swapchain(instance: &VulkanInstance, device: vk::PhysicalDevice) -> bool {
        let extensions = unsafe { instance.raw().enumerate_device_extension_properties(device) }
            .or_fail(FailureKind::Gpu, "vkEnumerateDeviceExtensionProperties");

        extensions
            .iter()
            .any(|available| unsafe { CStr::from_ptr(available.extension_name.as_ptr()) } == SwapchainLoader::name())
    }

    fn create_logical_device(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> ash::Device {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.raw().create_device(physical_device, &create_info, None) }
            .or_fail(FailureKind::Gpu, "vkCreateDevice")
    }

    /// Device-level function table
    pub const fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// `VK_KHR_swapchain` function table
    pub const fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Window surface
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Color format chosen for presentable images
    pub const fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Current surface capabilities (extent bounds, image counts, transform)
    pub fn surface_capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .or_fail(FailureKind::Gpu, "vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    /// Present modes the surface supports
    pub fn surface_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
        }
        .or_fail(FailureKind::Gpu, "vkGetPhysicalDeviceSurfacePresentModesKHR")
    }

    /// Queue family resolved for `capability`
    #[track_caller]
    pub fn queue_family_index(&self, capability: QueueCapability) -> u32 {
        self.queue_families
            .get(capability)
            .or_fail(FailureKind::Gpu, format_args!("no queue family resolved for {capability:?}"))
    }

    /// Distinct queue families in use
    pub fn unique_queue_families(&self) -> Vec<u32> {
        self.queue_families.unique()
    }

    /// Queue for `capability`
    #[track_caller]
    pub fn queue(&self, capability: QueueCapability) -> vk::Queue {
        let queue = match capability {
            QueueCapability::Graphics => self.queues.graphics,
            QueueCapability::Present => self.queues.present,
        };
        queue.or_fail(FailureKind::Gpu, format_args!("no queue resolved for {capability:?}"))
    }

    /// Block until all submitted work has finished
    pub fn wait_idle(&self) {
        unsafe { self.raw.device_wait_idle() }.or_fail(FailureKind::Gpu, "vkDeviceWaitIdle");
    }

    /// Block until `fence` is signaled
    pub fn wait_for_fence(&self, fence: vk::Fence) {
        unsafe { self.raw.wait_for_fences(&[fence], true, u64::MAX) }.or_fail(FailureKind::Gpu, "vkWaitForFences");
    }

    /// Return `fence` to the unsignaled state
    pub fn reset_fence(&self, fence: vk::Fence) {
        unsafe { self.raw.reset_fences(&[fence]) }.or_fail(FailureKind::Gpu, "vkResetFences");
    }

    /// Submit work to the graphics queue
    pub fn submit_graphics(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) {
        unsafe {
            self.raw
                .queue_submit(self.queue(QueueCapability::Graphics), submits, fence)
        }
        .or_fail(FailureKind::Gpu, "vkQueueSubmit");
    }

    /// Create a semaphore
    pub fn create_semaphore(&self) -> vk::Semaphore {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.raw.create_semaphore(&info, None) }.or_fail(FailureKind::Gpu, "vkCreateSemaphore")
    }

    /// Destroy a semaphore
    pub fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.raw.destroy_semaphore(semaphore, None) };
    }

    /// Create a fence, optionally already signaled
    pub fn create_fence(&self, signaled: bool) -> vk::Fence {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.raw.create_fence(&info, None) }.or_fail(FailureKind::Gpu, "vkCreateFence")
    }

    /// Destroy a fence
    pub fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.raw.destroy_fence(fence, None) };
    }

    /// Create a command pool whose buffers can be reset individually
    pub fn create_command_pool(&self, queue_family: u32) -> vk::CommandPool {
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.raw.create_command_pool(&info, None) }.or_fail(FailureKind::Gpu, "vkCreateCommandPool")
    }

    /// Destroy a command pool and every buffer allocated from it
    pub fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.raw.destroy_command_pool(pool, None) };
    }

    /// Allocate `count` primary command buffers
    pub fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> Vec<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.raw.allocate_command_buffers(&info) }.or_fail(FailureKind::Gpu, "vkAllocateCommandBuffers")
    }

    /// Create a render pass
    pub fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> vk::RenderPass {
        unsafe { self.raw.create_render_pass(info, None) }.or_fail(FailureKind::Gpu, "vkCreateRenderPass")
    }

    /// Destroy a render pass
    pub fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.raw.destroy_render_pass(render_pass, None) };
    }

    /// Create a framebuffer
    pub fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> vk::Framebuffer {
        unsafe { self.raw.create_framebuffer(info, None) }.or_fail(FailureKind::Gpu, "vkCreateFramebuffer")
    }

    /// Destroy a framebuffer
    pub fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.raw.destroy_framebuffer(framebuffer, None) };
    }

    /// Create an image view
    pub fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> vk::ImageView {
        unsafe { self.raw.create_image_view(info, None) }.or_fail(FailureKind::Gpu, "vkCreateImageView")
    }

    /// Destroy an image view
    pub fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.raw.destroy_image_view(view, None) };
    }

    /// Create a shader module from SPIR-V words
    pub fn create_shader_module(&self, code: &[u32]) -> vk::ShaderModule {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.raw.create_shader_module(&info, None) }.or_fail(FailureKind::Gpu, "vkCreateShaderModule")
    }

    /// Destroy a shader module
    pub fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.raw.destroy_shader_module(module, None) };
    }

    /// Create a pipeline layout
    pub fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo) -> vk::PipelineLayout {
        unsafe { self.raw.create_pipeline_layout(info, None) }.or_fail(FailureKind::Gpu, "vkCreatePipelineLayout")
    }

    /// Destroy a pipeline layout
    pub fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.raw.destroy_pipeline_layout(layout, None) };
    }

    /// Create one graphics pipeline
    pub fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo) -> vk::Pipeline {
        let pipelines = unsafe {
            self.raw
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, error)| error)
        .or_fail(FailureKind::Gpu, "vkCreateGraphicsPipelines");

        pipelines
            .into_iter()
            .next()
            .or_fail(FailureKind::Gpu, "vkCreateGraphicsPipelines returned no pipeline")
    }

    /// Destroy a pipeline
    pub fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.raw.destroy_pipeline(pipeline, None) };
    }

    /// Create a swapchain
    pub fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> vk::SwapchainKHR {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }.or_fail(FailureKind::Gpu, "vkCreateSwapchainKHR")
    }

    /// Destroy a swapchain
    pub fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    /// Presentable images owned by `swapchain`
    pub fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Vec<vk::Image> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .or_fail(FailureKind::Gpu, "vkGetSwapchainImagesKHR")
    }

    fn deletion_queue(&self) -> MutexGuard<'_, DeletionQueue> {
        self.deletion_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Destroy `item` once the device has been confirmed idle
    pub fn push_to_deletion_queue(&self, item: PendingDestroy) {
        log::trace!("Deferring destruction of {} {:?}", item.kind(), item);
        self.deletion_queue().push(item);
    }

    /// Number of destructions waiting for the next flush
    pub fn pending_deletions(&self) -> usize {
        self.deletion_queue().len()
    }

    /// Wait for the device to go idle, then run every queued destruction in order
    pub fn flush_deletion_queue(&self) {
        let pending = self.deletion_queue().take_all();
        if pending.is_empty() {
            return;
        }

        self.wait_idle();
        log::debug!("Destroying {} deferred GPU objects", pending.len());
        for item in pending {
            self.destroy_now(item);
        }
    }

    fn destroy_now(&self, item: PendingDestroy) {
        match item {
            PendingDestroy::Pipeline(pipeline) => self.destroy_pipeline(pipeline),
            PendingDestroy::PipelineLayout(layout) => self.destroy_pipeline_layout(layout),
            PendingDestroy::ShaderModule(module) => self.destroy_shader_module(module),
            PendingDestroy::Framebuffer(framebuffer) => self.destroy_framebuffer(framebuffer),
            PendingDestroy::ImageView(view) => self.destroy_image_view(view),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let pending = self.deletion_queue().take_all();
        unsafe {
            if let Err(error) = self.raw.device_wait_idle() {
                log::error!("vkDeviceWaitIdle failed during shutdown: {:?}", error);
            }
        }
        for item in pending {
            self.destroy_now(item);
        }

        unsafe {
            self.raw.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
        log::debug!("Destroyed logical device and surface");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(graphics: bool, present: bool) -> QueueFamilySupport {
        QueueFamilySupport { graphics, present }
    }

    #[test]
    fn test_shared_family_is_requested_once() {
        let indices = QueueFamilyIndices::resolve(&[family(false, false), family(true, true), family(true, true)]);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![1]);
    }

    #[test]
    fn test_split_families_both_requested() {
        let indices = QueueFamilyIndices::resolve(&[family(false, true), family(true, false)]);
        assert!(indices.is_complete());
        assert_eq!(indices.get(QueueCapability::Graphics), Some(1));
        assert_eq!(indices.get(QueueCapability::Present), Some(0));
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn test_device_without_present_does_not_qualify() {
        let indices = QueueFamilyIndices::resolve(&[family(true, false), family(true, false)]);
        assert!(!indices.is_complete());
        assert_eq!(indices.present, None);
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn test_surface_format_prefers_bgra_srgb() {
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(choose_surface_format(&[other, preferred]), Some(preferred));
        assert_eq!(choose_surface_format(&[other]), Some(other));
        assert_eq!(choose_surface_format(&[]), None);
    }
}

//! Vulkan side of the swapchain: images, views, framebuffers and frame sync

use super::swapchain::{Presenter, MAX_FRAMES_IN_FLIGHT};
use super::sync::FrameSync;
use super::{Device, QueueCapability};
use crate::assets::EngineConfigAsset;
use crate::foundation::fail::{FailureKind, OrFail};
use crate::platform::Platform;
use ash::prelude::VkResult;
use ash::vk;
use nalgebra::Vector2;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Pick a present mode for the vsync preference
///
/// With vsync, MAILBOX avoids tearing with the lowest latency; without it,
/// IMMEDIATE allows tearing. FIFO is the universal fallback.
pub fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    let preferred = if vsync {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::IMMEDIATE
    };

    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Use the surface's extent, or the framebuffer size clamped to the surface bounds
/// when the surface leaves the extent to the application
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: Vector2<u32>) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer_size.x.clamp(min.width, max.width),
        height: framebuffer_size.y.clamp(min.height, max.height),
    }
}

/// One more image than the minimum, capped by the maximum (0 means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// [`Presenter`] backed by a `VkSwapchainKHR`
pub struct VulkanPresenter {
    device: Arc<Device>,
    platform: Rc<RefCell<dyn Platform>>,
    config: Arc<EngineConfigAsset>,
    swapchain: vk::SwapchainKHR,
    extent: vk::Extent2D,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: Option<vk::RenderPass>,
    frames: Vec<FrameSync>,
}

impl VulkanPresenter {
    /// Create the swapchain and the per-slot synchronization objects
    pub fn new(device: &Arc<Device>, platform: Rc<RefCell<dyn Platform>>, config: Arc<EngineConfigAsset>) -> Self {
        let mut presenter = Self {
            device: Arc::clone(device),
            platform,
            config,
            swapchain: vk::SwapchainKHR::null(),
            extent: vk::Extent2D::default(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass: None,
            frames: (0..MAX_FRAMES_IN_FLIGHT).map(|_| FrameSync::new(device)).collect(),
        };
        presenter.create_swapchain();
        presenter
    }

    /// Wrap every presentable image in a framebuffer for `render_pass`
    pub fn attach_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.destroy_framebuffers();
        self.render_pass = Some(render_pass);
        self.create_framebuffers();
    }

    fn frame(&self, frame: usize) -> &FrameSync {
        self.frames
            .get(frame)
            .or_fail(FailureKind::Gpu, format_args!("frame slot {frame} out of range"))
    }

    fn create_swapchain(&mut self) {
        let capabilities = self.device.surface_capabilities();
        let surface_format = self.device.surface_format();
        let vsync = self.config.window_vsync();
        let present_mode = choose_present_mode(&self.device.surface_present_modes(), vsync);
        let framebuffer_size = self.platform.borrow().framebuffer_size();
        let extent = choose_extent(&capabilities, framebuffer_size);
        let image_count = choose_image_count(&capabilities);

        let queue_families = self.device.unique_queue_families();
        let sharing_mode = if queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&queue_families);
        }

        self.swapchain = self.device.create_swapchain(&create_info);
        self.extent = extent;

        let images = self.device.swapchain_images(self.swapchain);
        self.image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                self.device.create_image_view(&view_info)
            })
            .collect();

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, vsync {}",
            extent.width,
            extent.height,
            images.len(),
            present_mode,
            vsync
        );
    }

    fn create_framebuffers(&mut self) {
        let Some(render_pass) = self.render_pass else {
            return;
        };

        self.framebuffers = self
            .image_views
            .iter()
            .map(|view| {
                let attachments = [*view];
                let info = vk::FramebufferCreateInfo::builder()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(self.extent.width)
                    .height(self.extent.height)
                    .layers(1);
                self.device.create_framebuffer(&info)
            })
            .collect();
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
    }

    fn destroy_swapchain(&mut self) {
        self.destroy_framebuffers();
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Presenter for VulkanPresenter {
    fn wait_for_frame(&mut self, frame: usize) {
        self.frame(frame).in_flight.wait();
    }

    fn acquire_image(&mut self, frame: usize) -> VkResult<(u32, bool)> {
        let semaphore = self.frame(frame).image_available.handle();
        unsafe {
            self.device
                .swapchain_loader()
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    fn reset_frame(&mut self, frame: usize) {
        self.frame(frame).in_flight.reset();
    }

    fn submit_and_present(&mut self, frame: usize, image_index: u32, command_buffer: vk::CommandBuffer) -> VkResult<bool> {
        let sync = self.frame(frame);
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        self.device.submit_graphics(&[submit], sync.in_flight.handle());

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.queue(QueueCapability::Present), &present_info)
        }
    }

    fn recreate(&mut self) {
        self.device.wait_idle();
        self.destroy_swapchain();
        self.create_swapchain();
        self.create_framebuffers();
    }

    fn is_presentable(&self) -> bool {
        let size = self.platform.borrow().framebuffer_size();
        size.x > 0 && size.y > 0
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        usize::try_from(image_index)
            .ok()
            .and_then(|index| self.framebuffers.get(index))
            .copied()
            .or_fail(FailureKind::Gpu, format_args!("no framebuffer for swapchain image {image_index}"))
    }
}

impl Drop for VulkanPresenter {
    fn drop(&mut self) {
        self.destroy_swapchain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_vsync_prefers_mailbox_then_fifo() {
        let all = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&all, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO], true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_no_vsync_prefers_immediate_then_fifo() {
        let all = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_defined_surface_extent_wins() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        assert_eq!(
            choose_extent(&caps, Vector2::new(1920, 1080)),
            vk::Extent2D { width: 800, height: 600 }
        );
    }

    #[test]
    fn test_undefined_extent_clamps_each_axis_independently() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 200), (1000, 500));
        assert_eq!(
            choose_extent(&caps, Vector2::new(4000, 50)),
            vk::Extent2D { width: 1000, height: 200 }
        );
        assert_eq!(
            choose_extent(&caps, Vector2::new(640, 480)),
            vk::Extent2D { width: 640, height: 480 }
        );
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let mut caps = capabilities((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }
}

//! Frame acquisition and presentation
//!
//! [`Swapchain`] owns the acquire/present protocol and the frame-in-flight
//! cadence. The GPU side of that protocol sits behind the [`Presenter`] trait
//! so the protocol itself runs without a device in tests.

use super::presenter::VulkanPresenter;
use crate::assets::{Asset, EngineConfigAsset, ReloadSubscription};
use crate::foundation::fail::{fail, FailureKind};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// GPU operations behind [`Swapchain`]
///
/// `frame` is always in `0..MAX_FRAMES_IN_FLIGHT`.
pub trait Presenter {
    /// Block until the slot's previous submission has finished
    fn wait_for_frame(&mut self, frame: usize);

    /// Acquire the next presentable image; `Ok((index, suboptimal))`
    fn acquire_image(&mut self, frame: usize) -> VkResult<(u32, bool)>;

    /// Mark the slot as in flight again
    fn reset_frame(&mut self, frame: usize);

    /// Submit the recorded commands and queue the image for presentation; `Ok(suboptimal)`
    fn submit_and_present(&mut self, frame: usize, image_index: u32, command_buffer: vk::CommandBuffer) -> VkResult<bool>;

    /// Tear down and rebuild the presentable images
    fn recreate(&mut self);

    /// Whether the surface currently has a non-zero area
    fn is_presentable(&self) -> bool;

    /// Size of the presentable images
    fn extent(&self) -> vk::Extent2D;

    /// Framebuffer wrapping the image at `image_index`
    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer;
}

/// Presentable image chain plus its frame-in-flight ring
pub struct Swapchain<P: Presenter = VulkanPresenter> {
    presenter: P,
    current_frame: usize,
    dirty: Arc<AtomicBool>,
    suspended: bool,
    config: Option<(Arc<EngineConfigAsset>, ReloadSubscription)>,
}

impl Swapchain {
    /// Create the Vulkan swapchain and recreate it whenever `config` reloads
    pub fn new(presenter: VulkanPresenter, config: &Arc<EngineConfigAsset>) -> Self {
        let mut swapchain = Self::with_presenter(presenter);
        swapchain.follow_config(config);
        swapchain
    }

    /// Build framebuffers for `render_pass` around every presentable image
    pub fn attach_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.presenter.attach_render_pass(render_pass);
    }
}

impl<P: Presenter> Swapchain<P> {
    /// Drive an arbitrary presenter
    pub fn with_presenter(presenter: P) -> Self {
        Self {
            presenter,
            current_frame: 0,
            dirty: Arc::new(AtomicBool::new(false)),
            suspended: false,
            config: None,
        }
    }

    /// Mark the swapchain dirty whenever `config` reloads
    ///
    /// Recreation then happens at the next present, never mid-frame.
    pub fn follow_config(&mut self, config: &Arc<EngineConfigAsset>) {
        self.unfollow_config();
        let dirty = Arc::clone(&self.dirty);
        let subscription = config.register_reload_callback(Arc::new(move || {
            dirty.store(true, Ordering::Release);
        }));
        self.config = Some((Arc::clone(config), subscription));
    }

    fn unfollow_config(&mut self) {
        if let Some((config, subscription)) = self.config.take() {
            config.deregister_reload_callback(subscription);
        }
    }

    /// Request recreation at the next present
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Slot index of the frame being prepared
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Size of the presentable images
    pub fn extent(&self) -> vk::Extent2D {
        self.presenter.extent()
    }

    /// Framebuffer for an acquired image
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.presenter.framebuffer(image_index)
    }

    /// The presenter behind this swapchain
    pub const fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Wait for the current slot, then acquire an image
    ///
    /// Returns `None` when the surface is out of date or has zero area (a
    /// minimized window); the caller should skip this frame. A suspended
    /// swapchain is rebuilt once the surface has an area again.
    pub fn acquire_next_image_index(&mut self) -> Option<u32> {
        if !self.presenter.is_presentable() {
            if !self.suspended {
                log::debug!("Surface has zero area; suspending presentation");
                self.suspended = true;
            }
            return None;
        }
        if self.suspended {
            self.recreate();
        }

        self.presenter.wait_for_frame(self.current_frame);

        match self.presenter.acquire_image(self.current_frame) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.mark_dirty();
                }
                self.presenter.reset_frame(self.current_frame);
                Some(image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date at acquire; skipping frame");
                self.recreate();
                None
            }
            Err(error) => fail(FailureKind::Gpu, format_args!("vkAcquireNextImageKHR: {error:?}")),
        }
    }

    /// Submit `command_buffer` and present `image_index`, then advance the slot
    pub fn present(&mut self, image_index: u32, command_buffer: vk::CommandBuffer) {
        let result = self
            .presenter
            .submit_and_present(self.current_frame, image_index, command_buffer);
        let dirty = self.dirty.swap(false, Ordering::AcqRel);

        match result {
            Ok(false) if !dirty => {}
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.recreate(),
            Err(error) => fail(FailureKind::Gpu, format_args!("vkQueuePresentKHR: {error:?}")),
        }

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Whether presentation is paused until the surface regains an area
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn recreate(&mut self) {
        self.dirty.store(false, Ordering::Release);
        self.suspended = !self.presenter.is_presentable();
        if self.suspended {
            log::debug!("Deferring swapchain recreation until the surface has an area");
        } else {
            self.presenter.recreate();
        }
    }
}

impl<P: Presenter> Drop for Swapchain<P> {
    fn drop(&mut self) {
        self.unfollow_config();
    }
}

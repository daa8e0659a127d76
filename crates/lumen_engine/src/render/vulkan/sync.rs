//! Synchronization objects for frames in flight
//!
//! Each wrapper holds the [`Device`] alive and destroys its handle on drop.
//! These objects live as long as the presenter that owns them; swapchain
//! recreation does not touch them.

use super::Device;
use ash::vk;
use std::sync::Arc;

/// GPU-GPU ordering primitive
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignaled semaphore
    pub fn new(device: &Arc<Device>) -> Self {
        Self {
            semaphore: device.create_semaphore(),
            device: Arc::clone(device),
        }
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// CPU-GPU completion primitive
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: &Arc<Device>, signaled: bool) -> Self {
        Self {
            fence: device.create_fence(signaled),
            device: Arc::clone(device),
        }
    }

    /// Block until signaled, with no timeout
    pub fn wait(&self) {
        self.device.wait_for_fence(self.fence);
    }

    /// Return to the unsignaled state
    pub fn reset(&self) {
        self.device.reset_fence(self.fence);
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// The three objects one frame slot needs
pub struct FrameSync {
    /// Signaled when the acquired image is ready to render into
    pub image_available: Semaphore,
    /// Signaled when the frame's commands finish
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completes; starts signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the slot's objects; the fence starts signaled so the first wait returns
    pub fn new(device: &Arc<Device>) -> Self {
        Self {
            image_available: Semaphore::new(device),
            render_finished: Semaphore::new(device),
            in_flight: Fence::new(device, true),
        }
    }
}

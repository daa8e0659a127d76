//! Deferred destruction of GPU objects
//!
//! Objects that an in-flight command buffer may still reference are queued
//! here as tagged destroy commands instead of being destroyed immediately.
//! [`Device::flush_deletion_queue`](super::Device::flush_deletion_queue)
//! executes them after the device is idle.

use ash::vk;
use std::collections::VecDeque;

/// A GPU object waiting to be destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDestroy {
    /// Graphics pipeline
    Pipeline(vk::Pipeline),
    /// Pipeline layout
    PipelineLayout(vk::PipelineLayout),
    /// Shader module
    ShaderModule(vk::ShaderModule),
    /// Framebuffer
    Framebuffer(vk::Framebuffer),
    /// Image view
    ImageView(vk::ImageView),
}

impl PendingDestroy {
    /// Short name of the resource kind, for logs
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::ShaderModule(_) => "shader module",
            Self::Framebuffer(_) => "framebuffer",
            Self::ImageView(_) => "image view",
        }
    }
}

/// FIFO of pending destroy commands
#[derive(Debug, Default)]
pub struct DeletionQueue {
    pending: VecDeque<PendingDestroy>,
}

impl DeletionQueue {
    /// Queue a destruction
    pub fn push(&mut self, item: PendingDestroy) {
        self.pending.push_back(item);
    }

    /// Number of queued destructions
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove every queued destruction, oldest first
    pub fn take_all(&mut self) -> Vec<PendingDestroy> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_drains_in_push_order() {
        let mut queue = DeletionQueue::default();
        queue.push(PendingDestroy::ShaderModule(vk::ShaderModule::from_raw(1)));
        queue.push(PendingDestroy::Pipeline(vk::Pipeline::from_raw(2)));
        queue.push(PendingDestroy::PipelineLayout(vk::PipelineLayout::from_raw(3)));
        assert_eq!(queue.len(), 3);

        let drained = queue.take_all();
        assert_eq!(
            drained.iter().map(PendingDestroy::kind).collect::<Vec<_>>(),
            ["shader module", "pipeline", "pipeline layout"]
        );
        assert!(queue.is_empty());
        assert!(queue.take_all().is_empty());
    }
}

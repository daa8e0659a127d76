//! Command pool and command buffer recording

use super::Device;
use crate::foundation::fail::{FailureKind, OrFail};
use ash::vk;
use std::sync::Arc;

/// Command pool whose buffers are reset one at a time
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool for `queue_family`
    pub fn new(device: &Arc<Device>, queue_family: u32) -> Self {
        Self {
            pool: device.create_command_pool(queue_family),
            device: Arc::clone(device),
        }
    }

    /// Allocate `count` primary command buffers
    pub fn allocate(&self, count: u32) -> Vec<CommandBuffer> {
        self.device
            .allocate_command_buffers(self.pool, count)
            .into_iter()
            .map(|handle| CommandBuffer {
                device: Arc::clone(&self.device),
                handle,
            })
            .collect()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}

/// A primary command buffer allocated from a [`CommandPool`]
///
/// The handle is freed with its pool; the pool must outlive every buffer.
pub struct CommandBuffer {
    device: Arc<Device>,
    handle: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Raw handle
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Discard previous contents and start recording
    pub fn reset_and_begin(&self) {
        let raw = self.device.raw();
        unsafe { raw.reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty()) }
            .or_fail(FailureKind::Gpu, "vkResetCommandBuffer");

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { raw.begin_command_buffer(self.handle, &begin_info) }
            .or_fail(FailureKind::Gpu, "vkBeginCommandBuffer");
    }

    /// Finish recording
    pub fn end(&self) {
        unsafe { self.device.raw().end_command_buffer(self.handle) }.or_fail(FailureKind::Gpu, "vkEndCommandBuffer");
    }

    /// Begin an inline render pass clearing the single color attachment
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .raw()
                .cmd_begin_render_pass(self.handle, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    /// End the current render pass
    pub fn end_render_pass(&self) {
        unsafe { self.device.raw().cmd_end_render_pass(self.handle) };
    }

    /// Set viewport 0 and scissor 0 to cover `extent`
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        #[allow(clippy::cast_precision_loss)]
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let raw = self.device.raw();
        unsafe {
            raw.cmd_set_viewport(self.handle, 0, &[viewport]);
            raw.cmd_set_scissor(self.handle, 0, &[scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .raw()
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Record a non-indexed draw
    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .raw()
                .cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }
}

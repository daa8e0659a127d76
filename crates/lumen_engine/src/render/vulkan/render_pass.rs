//! Frame recording: begin, draw, end
//!
//! A [`RenderPass`] is either idle or recording one frame. `begin` moves it to
//! recording when the swapchain hands out an image; `end` submits, presents
//! and returns it to idle. Drawing or binding while idle is a contract
//! violation and panics.

use super::commands::{CommandBuffer, CommandPool};
use super::pipeline::PipelineBinder;
use super::presenter::VulkanPresenter;
use super::swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};
use super::{Device, QueueCapability};
use crate::assets::EngineConfigAsset;
use crate::foundation::fail::{FailureKind, OrFail};
use crate::platform::Platform;
use ash::vk;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Whether a frame is being recorded, and into which swapchain image
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordingState {
    current_image: Option<u32>,
}

impl RecordingState {
    /// Whether `begin` has succeeded without a matching `end`
    pub const fn is_recording(&self) -> bool {
        self.current_image.is_some()
    }

    /// Enter the recording state for `image_index`
    #[track_caller]
    pub fn open(&mut self, image_index: u32) {
        assert!(
            self.current_image.is_none(),
            "begin() called while frame for image {:?} is still recording",
            self.current_image
        );
        self.current_image = Some(image_index);
    }

    /// The image being recorded; panics when idle
    #[track_caller]
    pub fn require(&self, operation: &str) -> u32 {
        match self.current_image {
            Some(image_index) => image_index,
            None => panic!("{operation}() called outside of begin()/end()"),
        }
    }

    /// Leave the recording state, returning the recorded image
    #[track_caller]
    pub fn close(&mut self) -> u32 {
        let image_index = self.require("end");
        self.current_image = None;
        image_index
    }
}

/// Callbacks to run once the GPU has finished with the current frames
#[derive(Default)]
pub struct FrameEndedQueue {
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl FrameEndedQueue {
    /// Queue `callback` for the next resolution
    pub fn push(&self, callback: impl FnOnce() + 'static) {
        self.callbacks.borrow_mut().push(Box::new(callback));
    }

    /// Number of queued callbacks
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Whether no callbacks are queued
    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Invoke every callback queued so far
    ///
    /// The queue is emptied before the first call, so callbacks queued from
    /// inside a callback wait for the next resolution.
    pub fn run(&self) -> usize {
        let batch = std::mem::take(&mut *self.callbacks.borrow_mut());
        let count = batch.len();
        for callback in batch {
            callback();
        }
        count
    }
}

/// Single-subpass color pass over the swapchain images
pub struct RenderPass {
    frame_ended: FrameEndedQueue,
    recording: RecordingState,
    command_buffers: Vec<CommandBuffer>,
    #[allow(dead_code)] // owns the buffers above; freed on drop
    command_pool: CommandPool,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    config: Arc<EngineConfigAsset>,
    device: Arc<Device>,
}

impl RenderPass {
    /// Create the swapchain, the render pass and one command buffer per frame slot
    pub fn new(device: &Arc<Device>, platform: Rc<RefCell<dyn Platform>>, config: &Arc<EngineConfigAsset>) -> Self {
        let presenter = VulkanPresenter::new(device, platform, Arc::clone(config));
        let mut swapchain = Swapchain::new(presenter, config);

        let render_pass = Self::create_render_pass(device, device.surface_format().format);
        swapchain.attach_render_pass(render_pass);

        let command_pool = CommandPool::new(device, device.queue_family_index(QueueCapability::Graphics));
        #[allow(clippy::cast_possible_truncation)]
        let command_buffers = command_pool.allocate(MAX_FRAMES_IN_FLIGHT as u32);

        Self {
            frame_ended: FrameEndedQueue::default(),
            recording: RecordingState::default(),
            command_buffers,
            command_pool,
            swapchain,
            render_pass,
            config: Arc::clone(config),
            device: Arc::clone(device),
        }
    }

    fn create_render_pass(device: &Device, color_format: vk::Format) -> vk::RenderPass {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();
        let attachments = [color_attachment];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];

        // The acquire semaphore is waited at color output; hold the layout
        // transition until then
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        device.create_render_pass(&info)
    }

    /// Raw render pass handle, for pipeline creation
    pub const fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn current_command_buffer(&self) -> &CommandBuffer {
        let frame = self.swapchain.current_frame();
        self.command_buffers
            .get(frame)
            .or_fail(FailureKind::Gpu, format_args!("no command buffer for frame slot {frame}"))
    }

    /// Start recording a frame
    ///
    /// Returns `false` when no swapchain image is available; the caller must
    /// skip the frame without calling [`RenderPass::end`].
    pub fn begin(&mut self) -> bool {
        assert!(!self.recording.is_recording(), "begin() called while a frame is still recording");

        let Some(image_index) = self.swapchain.acquire_next_image_index() else {
            return false;
        };

        let extent = self.swapchain.extent();
        let framebuffer = self.swapchain.framebuffer(image_index);
        let clear_color = self.config.window_clear_color().srgb_to_linear().to_array();

        let command_buffer = self.current_command_buffer();
        command_buffer.reset_and_begin();
        command_buffer.begin_render_pass(self.render_pass, framebuffer, extent, clear_color);
        command_buffer.set_viewport_and_scissor(extent);

        self.recording.open(image_index);
        true
    }

    /// Record a draw against the bound pipeline
    #[track_caller]
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.recording.require("draw");
        self.current_command_buffer()
            .draw(vertex_count, instance_count, first_vertex, first_instance);
    }

    /// Finish the frame and present it
    ///
    /// Afterwards, if callbacks were deferred, waits for the device to go idle
    /// and runs them, then drains the device's deletion queue.
    #[track_caller]
    pub fn end(&mut self) {
        let image_index = self.recording.close();

        let command_buffer = self.current_command_buffer();
        command_buffer.end_render_pass();
        command_buffer.end();
        let handle = command_buffer.handle();

        self.swapchain.present(image_index, handle);

        if !self.frame_ended.is_empty() {
            self.device.wait_idle();
            let resolved = self.frame_ended.run();
            log::trace!("Resolved {} frame-ended callbacks", resolved);
        }

        if self.device.pending_deletions() > 0 {
            self.device.flush_deletion_queue();
        }
    }

    /// Run `callback` after the frames now in flight have finished on the GPU
    pub fn defer_until_frame_ended(&self, callback: impl FnOnce() + 'static) {
        self.frame_ended.push(callback);
    }
}

impl PipelineBinder for RenderPass {
    #[track_caller]
    fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.recording.require("bind");
        self.current_command_buffer().bind_graphics_pipeline(pipeline);
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.wait_idle();
        self.frame_ended.run();
        self.device.destroy_render_pass(self.render_pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_begin_end_cycle() {
        let mut state = RecordingState::default();
        assert!(!state.is_recording());

        state.open(2);
        assert!(state.is_recording());
        assert_eq!(state.require("draw"), 2);
        assert_eq!(state.close(), 2);
        assert!(!state.is_recording());

        state.open(0);
        assert_eq!(state.close(), 0);
    }

    #[test]
    #[should_panic(expected = "draw() called outside of begin()/end()")]
    fn test_draw_before_begin_panics() {
        RecordingState::default().require("draw");
    }

    #[test]
    #[should_panic(expected = "draw() called outside of begin()/end()")]
    fn test_draw_after_end_panics() {
        let mut state = RecordingState::default();
        state.open(1);
        state.close();
        state.require("draw");
    }

    #[test]
    #[should_panic(expected = "end() called outside of begin()/end()")]
    fn test_end_without_begin_panics() {
        RecordingState::default().close();
    }

    #[test]
    #[should_panic(expected = "begin() called while frame")]
    fn test_nested_begin_panics() {
        let mut state = RecordingState::default();
        state.open(0);
        state.open(1);
    }

    #[test]
    fn test_frame_ended_callbacks_run_once() {
        let queue = FrameEndedQueue::default();
        let calls = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let calls = Rc::clone(&calls);
            queue.push(move || calls.set(calls.get() + 1));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run(), 3);
        assert_eq!(calls.get(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.run(), 0);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_callback_deferred_during_resolution_waits_for_next_frame() {
        let queue = Rc::new(FrameEndedQueue::default());
        let inner_ran = Rc::new(Cell::new(false));

        let requeue = Rc::clone(&queue);
        let flag = Rc::clone(&inner_ran);
        queue.push(move || {
            requeue.push(move || flag.set(true));
        });

        assert_eq!(queue.run(), 1);
        assert!(!inner_ran.get());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.run(), 1);
        assert!(inner_ran.get());
    }
}

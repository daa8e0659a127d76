//! Vulkan backend
//!
//! Ownership runs one way: [`Device`] is shared by `Arc` and outlives every
//! object created from it. [`RenderPass`] owns the [`Swapchain`], which owns
//! its presentable images and frame synchronization. Materials and shaders
//! reach the GPU through [`PipelineBackend`].

pub mod commands;
pub mod deletion_queue;
pub mod device;
pub mod instance;
pub mod material;
pub mod pipeline;
pub mod presenter;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use deletion_queue::{DeletionQueue, PendingDestroy};
pub use device::{Device, QueueCapability};
pub use material::{Material, MaterialStatus};
pub use pipeline::{GraphicsPipeline, PipelineBackend, PipelineBinder, VulkanPipelines};
pub use presenter::VulkanPresenter;
pub use render_pass::RenderPass;
pub use shader::{Shader, ShaderStage};
pub use swapchain::{Presenter, Swapchain, MAX_FRAMES_IN_FLIGHT};

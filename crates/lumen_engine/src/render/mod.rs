//! Rendering
//!
//! [`VulkanGraphics`] is the frame loop's entry point; [`vulkan`] holds the
//! device, swapchain, render pass and pipeline assets it is built from.

mod graphics;
pub mod vulkan;

pub use graphics::VulkanGraphics;

//! Windowing and input backend
//!
//! The renderer only sees the [`Platform`] trait; [`GlfwPlatform`] is the
//! implementation used by the engine.

mod glfw_platform;

pub use glfw_platform::GlfwPlatform;

use ash::vk;
use nalgebra::Vector2;

/// What the engine needs from a window system
pub trait Platform {
    /// Pump pending window and input events
    fn process_events(&mut self);

    /// Whether the user asked to close the window
    fn close_requested(&self) -> bool;

    /// Current drawable size in pixels
    fn framebuffer_size(&self) -> Vector2<u32>;

    /// Instance extensions needed to present to this platform's windows
    fn required_instance_extensions(&self) -> Vec<String>;

    /// Create a presentable surface for the window
    fn create_surface(&mut self, instance: vk::Instance) -> vk::SurfaceKHR;

    /// Whether the asset-reload key was pressed since the last event pump
    fn reload_pressed(&self) -> bool;
}

//! Window management using GLFW
//!
//! Provides window creation, event pumping and Vulkan surface creation.

use super::Platform;
use crate::assets::{Asset, EngineConfigAsset, ReloadSubscription};
use crate::foundation::fail::{fail, FailureKind, OrFail};
use ash::vk;
use nalgebra::Vector2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Key that triggers an asset reload
pub const RELOAD_KEY: glfw::Key = glfw::Key::F5;

/// GLFW window configured for Vulkan (no client API)
pub struct GlfwPlatform {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    config: Arc<EngineConfigAsset>,
    config_subscription: ReloadSubscription,
    config_dirty: Arc<AtomicBool>,
    reload_pressed: bool,
}

impl GlfwPlatform {
    /// Open the window described by the merged engine/game config
    pub fn new(config: Arc<EngineConfigAsset>) -> Self {
        let mut glfw = glfw::init(glfw::fail_on_errors).or_fail(FailureKind::Platform, "glfw::init");

        let settings = config.window();

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(settings.resizable));

        let (mut window, events) = glfw
            .create_window(
                settings.initial_size.x,
                settings.initial_size.y,
                &settings.title,
                glfw::WindowMode::Windowed,
            )
            .or_fail(FailureKind::Platform, "failed to create GLFW window");

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        let config_dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&config_dirty);
        let config_subscription = config.register_reload_callback(Arc::new(move || {
            flag.store(true, Ordering::Release);
        }));

        log::info!(
            "Created window '{}' ({}x{})",
            settings.title,
            settings.initial_size.x,
            settings.initial_size.y
        );

        Self {
            glfw,
            window,
            events,
            config,
            config_subscription,
            config_dirty,
            reload_pressed: false,
        }
    }

    fn apply_config(&mut self) {
        let settings = self.config.window();
        self.window.set_title(&settings.title);
        self.window.set_resizable(settings.resizable);
        log::debug!("Applied reloaded window settings");
    }
}

impl Platform for GlfwPlatform {
    fn process_events(&mut self) {
        self.reload_pressed = false;
        self.glfw.poll_events();

        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::Key(RELOAD_KEY, _, glfw::Action::Press, _) => {
                    self.reload_pressed = true;
                }
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    log::trace!("Framebuffer resized to {}x{}", width, height);
                }
                _ => {}
            }
        }

        if self.config_dirty.swap(false, Ordering::AcqRel) {
            self.apply_config();
        }
    }

    fn close_requested(&self) -> bool {
        self.window.should_close()
    }

    fn framebuffer_size(&self) -> Vector2<u32> {
        let (width, height) = self.window.get_framebuffer_size();
        Vector2::new(u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0))
    }

    fn required_instance_extensions(&self) -> Vec<String> {
        self.glfw
            .get_required_instance_extensions()
            .or_fail(FailureKind::Platform, "Vulkan is not supported by this GLFW build")
    }

    fn create_surface(&mut self, instance: vk::Instance) -> vk::SurfaceKHR {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result != vk::Result::SUCCESS {
            fail(FailureKind::Gpu, format_args!("failed to create window surface: {result:?}"));
        }
        surface
    }

    fn reload_pressed(&self) -> bool {
        self.reload_pressed
    }
}

impl Drop for GlfwPlatform {
    fn drop(&mut self) {
        self.config.deregister_reload_callback(self.config_subscription);
    }
}

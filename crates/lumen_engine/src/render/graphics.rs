//! Frame-level renderer: one material drawn as a single triangle

use super::vulkan::{Device, Material, RenderPass, VulkanPipelines};
use crate::assets::{Asset, AssetRegistry, EngineConfigAsset, ReloadSubscription};
use crate::platform::Platform;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Draws the configured material as a single triangle every frame
pub struct VulkanGraphics {
    material: Arc<Material<VulkanPipelines>>,
    pipelines: Arc<VulkanPipelines>,
    render_pass: RenderPass,
    config_changed: Arc<AtomicBool>,
    config_subscription: ReloadSubscription,
    config: Arc<EngineConfigAsset>,
    registry: Arc<AssetRegistry>,
    device: Arc<Device>,
}

impl VulkanGraphics {
    /// Bring up the device and render pass, then load `graphics.material`
    pub fn new(
        registry: &Arc<AssetRegistry>,
        config: &Arc<EngineConfigAsset>,
        platform: Rc<RefCell<dyn Platform>>,
    ) -> Self {
        let device = Arc::new(Device::new(config, &mut *platform.borrow_mut()));
        let render_pass = RenderPass::new(&device, platform, config);
        let pipelines = Arc::new(VulkanPipelines::new(&device, render_pass.handle()));
        let material = registry.load_with::<Material<VulkanPipelines>>(config.graphics_material(), Arc::clone(&pipelines));

        let config_changed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&config_changed);
        let config_subscription = config.register_reload_callback(Arc::new(move || {
            flag.store(true, Ordering::Release);
        }));

        Self {
            material,
            pipelines,
            render_pass,
            config_changed,
            config_subscription,
            config: Arc::clone(config),
            registry: Arc::clone(registry),
            device,
        }
    }

    /// The material drawn each frame
    pub const fn material(&self) -> &Arc<Material<VulkanPipelines>> {
        &self.material
    }

    fn follow_material_setting(&mut self) {
        let id = self.config.graphics_material();
        if id == *self.material.id() {
            return;
        }

        log::info!("Switching material {} -> {}", self.material.id(), id);
        self.material = self
            .registry
            .load_with::<Material<VulkanPipelines>>(id, Arc::clone(&self.pipelines));
    }

    /// Record and present one frame; skipped when no swapchain image is available
    pub fn draw_frame(&mut self) {
        if self.config_changed.swap(false, Ordering::AcqRel) {
            self.follow_material_setting();
        }

        if !self.render_pass.begin() {
            return;
        }
        self.material.bind(&mut self.render_pass);
        self.render_pass.draw(3, 1, 0, 0);
        self.render_pass.end();
    }

    /// Wait for the GPU, then destroy everything waiting in the deletion queue
    pub fn wait_idle(&self) {
        self.device.wait_idle();
        self.device.flush_deletion_queue();
    }
}

impl Drop for VulkanGraphics {
    fn drop(&mut self) {
        self.config.deregister_reload_callback(self.config_subscription);
        self.device.wait_idle();
    }
}

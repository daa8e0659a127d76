//! Engine: assets, window and renderer, and the loop that drives them

use crate::application::Game;
use crate::assets::{roots, AssetRegistry, EngineConfigAsset};
use crate::foundation::fail::{FailureKind, OrFail};
use crate::platform::{GlfwPlatform, Platform};
use crate::render::VulkanGraphics;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

/// Owns every engine subsystem
///
/// Fields drop in declaration order: the renderer goes first so the surface
/// is destroyed while its window still exists.
pub struct Engine {
    graphics: VulkanGraphics,
    platform: Rc<RefCell<GlfwPlatform>>,
    config: Arc<EngineConfigAsset>,
    registry: Arc<AssetRegistry>,
}

impl Engine {
    /// Load the configuration, open the window and bring up the renderer
    pub fn new() -> Self {
        log::info!(
            "Initializing engine (game assets: {}, engine assets: {})",
            roots::game_assets_dir().display(),
            roots::engine_assets_dir().display()
        );

        let registry = AssetRegistry::new();
        let config = EngineConfigAsset::load_default(&registry);
        log::info!(
            "{} ({}) on {} ({})",
            config.game_name(),
            config.game_package(),
            config.engine_name(),
            config.engine_package()
        );

        let platform = Rc::new(RefCell::new(GlfwPlatform::new(Arc::clone(&config))));
        let graphics = VulkanGraphics::new(&registry, &config, platform.clone());

        Self {
            graphics,
            platform,
            config,
            registry,
        }
    }

    /// Call `game.init`, then pump events, run `game.process` and draw until the window closes
    pub fn run(&mut self, game: &mut impl Game) {
        game.init(self).or_fail(FailureKind::Game, "Game::init");
        log::info!("Starting main loop");

        while !self.platform.borrow().close_requested() {
            self.platform.borrow_mut().process_events();
            game.process(self).or_fail(FailureKind::Game, "Game::process");
            self.graphics.draw_frame();
        }

        log::info!("Main loop finished; waiting for the GPU");
        self.graphics.wait_idle();
    }

    /// The asset registry
    pub const fn assets(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    /// The merged engine/game configuration
    pub const fn config(&self) -> &Arc<EngineConfigAsset> {
        &self.config
    }

    /// The window
    pub fn platform(&self) -> Ref<'_, GlfwPlatform> {
        self.platform.borrow()
    }

    /// The renderer
    pub const fn graphics(&self) -> &VulkanGraphics {
        &self.graphics
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

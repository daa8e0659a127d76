//! Sandbox application
//!
//! Opens a window with the configured material and reloads every live asset
//! when F5 is pressed.

use lumen_engine::assets::roots;
use lumen_engine::prelude::*;

#[derive(Default)]
struct Sandbox {
    frames: u64,
    reloads: u32,
}

impl Game for Sandbox {
    fn init(&mut self, engine: &mut Engine) -> Result<(), GameError> {
        let config = engine.config();
        if config.game_package() != "sandbox" {
            return Err(GameError::Logic(format!(
                "expected the sandbox game document, found package '{}'",
                config.game_package()
            )));
        }

        log::info!(
            "Sandbox ready: material {}, {} live assets",
            config.graphics_material(),
            engine.assets().live_count()
        );
        Ok(())
    }

    fn process(&mut self, engine: &mut Engine) -> Result<(), GameError> {
        self.frames += 1;

        if engine.platform().reload_pressed() {
            self.reloads += 1;
            log::info!("Reloading assets (#{} at frame {})", self.reloads, self.frames);
            engine.assets().reload_all();
            log::info!(
                "Drawing {} ({} live assets, {} cached)",
                engine.graphics().material().id(),
                engine.assets().live_count(),
                engine.assets().entry_count()
            );
        }
        Ok(())
    }
}

fn main() {
    lumen_engine::foundation::logging::init();
    roots::set_game_assets_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"));

    let mut sandbox = Sandbox::default();
    Engine::new().run(&mut sandbox);

    log::info!("Sandbox exited after {} frames", sandbox.frames);
}

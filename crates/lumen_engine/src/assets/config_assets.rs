//! Engine and game configuration assets
//!
//! The engine document (`:engine.toml`) carries a value for every setting. The
//! game document (`:game.toml`) may override any window or graphics setting;
//! every accessor on [`EngineConfigAsset`] returns the game value when present
//! and the engine value otherwise.

use super::toml_asset::TomlAsset;
use super::{Asset, AssetCore, AssetId, AssetRegistry, LoadAsset};
use crate::foundation::color::Color;
use crate::foundation::fail::{fail, FailureKind};
use nalgebra::Vector2;
use serde::Deserialize;
use std::sync::Arc;

/// Well-known id of the engine configuration document
pub const ENGINE_CONFIG_ID: &str = ":engine.toml";
/// Well-known id of the game configuration document
pub const GAME_CONFIG_ID: &str = ":game.toml";

#[derive(Debug, Deserialize)]
struct NameSection {
    name: String,
    package: String,
}

#[derive(Debug, Deserialize)]
struct WindowDefaults {
    title: String,
    initial_size: [u32; 2],
    resizable: bool,
    vsync: bool,
    clear_color: Color,
}

#[derive(Debug, Default, Deserialize)]
struct WindowOverrides {
    title: Option<String>,
    initial_size: Option<[u32; 2]>,
    resizable: Option<bool>,
    vsync: Option<bool>,
    clear_color: Option<Color>,
}

#[derive(Debug, Deserialize)]
struct GraphicsDefaults {
    material: AssetId,
}

#[derive(Debug, Default, Deserialize)]
struct GraphicsOverrides {
    material: Option<AssetId>,
}

/// Parsed `:engine.toml`
#[derive(Debug, Deserialize)]
pub struct EngineDocument {
    engine: NameSection,
    window: WindowDefaults,
    graphics: GraphicsDefaults,
}

/// Parsed `:game.toml`
#[derive(Debug, Deserialize)]
pub struct GameDocument {
    game: NameSection,
    #[serde(default)]
    window: WindowOverrides,
    #[serde(default)]
    graphics: GraphicsOverrides,
}

/// Effective window settings after the game/engine merge
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    /// Window title
    pub title: String,
    /// Window size in screen coordinates at creation
    pub initial_size: Vector2<u32>,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Whether presentation waits for vertical blank
    pub vsync: bool,
    /// Clear color, sRGB-encoded
    pub clear_color: Color,
}

impl WindowSettings {
    fn resolve(engine: &WindowDefaults, game: &WindowOverrides) -> Self {
        let [width, height] = game.initial_size.unwrap_or(engine.initial_size);
        Self {
            title: game.title.clone().unwrap_or_else(|| engine.title.clone()),
            initial_size: Vector2::new(width, height),
            resizable: game.resizable.unwrap_or(engine.resizable),
            vsync: game.vsync.unwrap_or(engine.vsync),
            clear_color: game.clear_color.unwrap_or(engine.clear_color),
        }
    }
}

/// Game configuration: identity plus optional overrides
pub struct GameConfigAsset {
    toml: TomlAsset<GameDocument>,
}

impl GameConfigAsset {
    fn document(&self) -> Arc<GameDocument> {
        self.toml.document()
    }

    /// `game.name`
    pub fn game_name(&self) -> String {
        self.document().game.name.clone()
    }

    /// `game.package`
    pub fn game_package(&self) -> String {
        self.document().game.package.clone()
    }

    /// `window.title`, if the game overrides it
    pub fn window_title(&self) -> Option<String> {
        self.document().window.title.clone()
    }

    /// `window.initial_size`, if the game overrides it
    pub fn window_initial_size(&self) -> Option<Vector2<u32>> {
        self.document().window.initial_size.map(|[w, h]| Vector2::new(w, h))
    }

    /// `window.resizable`, if the game overrides it
    pub fn window_resizable(&self) -> Option<bool> {
        self.document().window.resizable
    }

    /// `window.vsync`, if the game overrides it
    pub fn window_vsync(&self) -> Option<bool> {
        self.document().window.vsync
    }

    /// `window.clear_color`, if the game overrides it
    pub fn window_clear_color(&self) -> Option<Color> {
        self.document().window.clear_color
    }

    /// `graphics.material`, if the game overrides it
    pub fn graphics_material(&self) -> Option<AssetId> {
        self.document().graphics.material.clone()
    }
}

impl Asset for GameConfigAsset {
    fn core(&self) -> &AssetCore {
        self.toml.core()
    }

    fn load(&self) {
        self.toml.load();
    }
}

impl LoadAsset for GameConfigAsset {
    type Context = ();

    fn create(_registry: &Arc<AssetRegistry>, id: AssetId, _context: ()) -> Self {
        if id.fully_qualified() != GAME_CONFIG_ID {
            fail(FailureKind::Config, format_args!("game config must be at {GAME_CONFIG_ID}, not {id}"));
        }

        let asset = Self {
            toml: TomlAsset::unloaded(id),
        };
        asset.load();
        asset
    }
}

/// Engine configuration merged with the game's overrides
///
/// Holds the game config alive and re-parses both documents on reload.
pub struct EngineConfigAsset {
    toml: TomlAsset<EngineDocument>,
    game: Arc<GameConfigAsset>,
}

impl EngineConfigAsset {
    /// Load the engine config (and through it the game config) from their well-known ids
    pub fn load_default(registry: &Arc<AssetRegistry>) -> Arc<Self> {
        registry.load::<Self>(AssetId::parse(ENGINE_CONFIG_ID))
    }

    fn document(&self) -> Arc<EngineDocument> {
        self.toml.document()
    }

    /// The game config this engine config falls back from
    pub fn game(&self) -> &Arc<GameConfigAsset> {
        &self.game
    }

    /// `engine.name`
    pub fn engine_name(&self) -> String {
        self.document().engine.name.clone()
    }

    /// `engine.package`
    pub fn engine_package(&self) -> String {
        self.document().engine.package.clone()
    }

    /// `game.name`
    pub fn game_name(&self) -> String {
        self.game.game_name()
    }

    /// `game.package`
    pub fn game_package(&self) -> String {
        self.game.game_package()
    }

    /// All window settings, merged
    pub fn window(&self) -> WindowSettings {
        WindowSettings::resolve(&self.document().window, &self.game.document().window)
    }

    /// Effective window title
    pub fn window_title(&self) -> String {
        self.window().title
    }

    /// Effective initial window size
    pub fn window_initial_size(&self) -> Vector2<u32> {
        self.window().initial_size
    }

    /// Effective resizability
    pub fn window_resizable(&self) -> bool {
        self.window().resizable
    }

    /// Effective vsync preference
    pub fn window_vsync(&self) -> bool {
        self.window().vsync
    }

    /// Effective clear color, sRGB-encoded
    pub fn window_clear_color(&self) -> Color {
        self.window().clear_color
    }

    /// Material drawn by the frame loop
    pub fn graphics_material(&self) -> AssetId {
        self.game
            .graphics_material()
            .unwrap_or_else(|| self.document().graphics.material.clone())
    }
}

impl Asset for EngineConfigAsset {
    fn core(&self) -> &AssetCore {
        self.toml.core()
    }

    fn load(&self) {
        self.game.load();
        self.toml.load();
    }
}

impl LoadAsset for EngineConfigAsset {
    type Context = ();

    fn create(registry: &Arc<AssetRegistry>, id: AssetId, _context: ()) -> Self {
        if id.fully_qualified() != ENGINE_CONFIG_ID {
            fail(FailureKind::Config, format_args!("engine config must be at {ENGINE_CONFIG_ID}, not {id}"));
        }

        let game = registry.load::<GameConfigAsset>(AssetId::parse(GAME_CONFIG_ID));
        let toml = TomlAsset::unloaded(id);
        toml.load();
        Self { toml, game }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::toml_asset::parse_str;

    const ENGINE: &str = r##"
        [engine]
        name = "Lumen"
        package = "engine"

        [window]
        title = "Lumen Engine"
        initial_size = [1280, 720]
        resizable = true
        vsync = true
        clear_color = "#1E1E2E"

        [graphics]
        material = "engine:materials/triangle.toml"
    "##;

    fn engine_doc() -> EngineDocument {
        parse_str(&AssetId::parse(ENGINE_CONFIG_ID), ENGINE).unwrap()
    }

    fn game_doc(text: &str) -> GameDocument {
        parse_str(&AssetId::parse(GAME_CONFIG_ID), text).unwrap()
    }

    #[test]
    fn test_game_value_wins() {
        let game = game_doc(
            r#"
            [game]
            name = "Sandbox"
            package = "sandbox"

            [window]
            vsync = false
            initial_size = [640, 480]
            clear_color = [0.5, 0.25, 0.0]
            "#,
        );

        let window = WindowSettings::resolve(&engine_doc().window, &game.window);
        assert!(!window.vsync);
        assert_eq!(window.initial_size, Vector2::new(640, 480));
        assert_eq!(window.clear_color, Color::rgb(0.5, 0.25, 0.0));
    }

    #[test]
    fn test_engine_value_fills_gaps() {
        let game = game_doc(
            r#"
            [game]
            name = "Sandbox"
            package = "sandbox"
            "#,
        );

        let window = WindowSettings::resolve(&engine_doc().window, &game.window);
        assert_eq!(window.title, "Lumen Engine");
        assert!(window.vsync);
        assert!(window.resizable);
        assert!(game.graphics.material.is_none());
    }

    #[test]
    fn test_engine_document_requires_every_key() {
        let without_vsync = ENGINE.replace("vsync = true", "");
        let err = parse_str::<EngineDocument>(&AssetId::parse(ENGINE_CONFIG_ID), &without_vsync).unwrap_err();
        assert!(err.to_string().contains("vsync"));
    }

    #[test]
    fn test_game_document_requires_identity() {
        let err = parse_str::<GameDocument>(&AssetId::parse(GAME_CONFIG_ID), "[window]\nvsync = false").unwrap_err();
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_bad_clear_color_is_rejected() {
        let bad = ENGINE.replace("\"#1E1E2E\"", "\"#12\"");
        assert!(parse_str::<EngineDocument>(&AssetId::parse(ENGINE_CONFIG_ID), &bad).is_err());
    }

    #[test]
    fn test_shipped_documents_load_through_registry() {
        let registry = AssetRegistry::new();
        let config = EngineConfigAsset::load_default(&registry);
        assert!(!config.engine_name().is_empty());
        assert!(!config.game_name().is_empty());
        assert!(config.window_initial_size().x > 0);
        assert!(config.graphics_material().exists());

        let game = registry.load::<GameConfigAsset>(AssetId::parse(GAME_CONFIG_ID));
        assert!(Arc::ptr_eq(&game, config.game()));
    }

    #[test]
    fn test_reload_notifies_config_subscribers() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let registry = AssetRegistry::new();
        let config = EngineConfigAsset::load_default(&registry);
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dirty);
        let subscription = config.register_reload_callback(Arc::new(move || flag.store(true, Ordering::SeqCst)));

        registry.reload_all();
        assert!(dirty.load(Ordering::SeqCst));
        config.deregister_reload_callback(subscription);
    }

    #[test]
    #[should_panic(expected = "engine config must be at")]
    fn test_engine_config_id_is_fixed() {
        let registry = AssetRegistry::new();
        let _ = registry.load::<EngineConfigAsset>(AssetId::parse(GAME_CONFIG_ID));
    }
}

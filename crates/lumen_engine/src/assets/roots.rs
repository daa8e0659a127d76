//! Asset root directories
//!
//! Asset files are looked up under the game root first and the engine root
//! second. The engine root is fixed at build time. The game root comes from
//! `LUMEN_GAME_ASSETS_DIR` when it is set, else from the embedding
//! application, else it is the engine root.

use std::path::PathBuf;
use std::sync::RwLock;

/// Environment variable that overrides the game asset root
pub const GAME_ASSETS_ENV: &str = "LUMEN_GAME_ASSETS_DIR";

/// Assets shipped with the engine crate
pub const ENGINE_ASSETS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

static GAME_ASSETS_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Set the game asset root for the rest of the process
///
/// `LUMEN_GAME_ASSETS_DIR` still takes precedence when it is set.
pub fn set_game_assets_dir(path: impl Into<PathBuf>) {
    let path = path.into();
    log::info!("Game assets dir: {}", path.display());
    match GAME_ASSETS_DIR.write() {
        Ok(mut dir) => *dir = Some(path),
        Err(poisoned) => *poisoned.into_inner() = Some(path),
    }
}

/// Directory searched first when resolving an asset
pub fn game_assets_dir() -> PathBuf {
    let configured = match GAME_ASSETS_DIR.read() {
        Ok(dir) => dir.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };

    pick_game_root(std::env::var_os(GAME_ASSETS_ENV).map(PathBuf::from), configured)
}

/// Directory searched when the game root has no matching file
pub fn engine_assets_dir() -> PathBuf {
    PathBuf::from(ENGINE_ASSETS_DIR)
}

fn pick_game_root(from_env: Option<PathBuf>, configured: Option<PathBuf>) -> PathBuf {
    from_env
        .filter(|dir| !dir.as_os_str().is_empty())
        .or(configured)
        .unwrap_or_else(engine_assets_dir)
}

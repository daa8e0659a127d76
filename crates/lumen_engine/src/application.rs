//! Game trait and lifecycle hooks

use crate::assets::AssetError;
use crate::engine::Engine;
use thiserror::Error;

/// Game logic driven by [`Engine::run`]
///
/// `init` runs once before the first frame; `process` runs once per frame,
/// after window events are pumped and before the frame is drawn. Returning an
/// error from either ends the process through the fatal path.
pub trait Game {
    /// Prepare game state
    fn init(&mut self, _engine: &mut Engine) -> Result<(), GameError> {
        Ok(())
    }

    /// Advance game state by one frame
    fn process(&mut self, engine: &mut Engine) -> Result<(), GameError>;
}

/// Errors a game can report to the engine
#[derive(Error, Debug)]
pub enum GameError {
    /// Asset lookup or loading failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Game-specific failure
    #[error("Game logic error: {0}")]
    Logic(String),
}

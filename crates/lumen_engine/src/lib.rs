//! # Lumen Engine
//!
//! A small Vulkan engine built around hot-reloadable assets.
//!
//! - **Assets**: namespaced [`AssetId`](assets::AssetId)s resolved against a
//!   game root and an engine root, cached weakly by the
//!   [`AssetRegistry`](assets::AssetRegistry) and reloadable at runtime
//! - **Configuration**: `:engine.toml` defaults overridden by `:game.toml`
//! - **Rendering**: a swapchain, a single color render pass and a material
//!   whose pipeline is rebuilt when its shaders change
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen_engine::prelude::*;
//!
//! struct MyGame;
//!
//! impl Game for MyGame {
//!     fn process(&mut self, engine: &mut Engine) -> Result<(), GameError> {
//!         if engine.platform().reload_pressed() {
//!             engine.assets().reload_all();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     lumen_engine::foundation::logging::init();
//!     Engine::new().run(&mut MyGame);
//! }
//! ```
//!
//! Every unrecoverable condition goes through
//! [`fail`](foundation::fail::fail), which logs and then panics; binaries
//! build with `panic = "abort"`.

#![warn(missing_docs)]

pub mod assets;
pub mod foundation;
pub mod platform;
pub mod render;

mod application;
mod engine;

pub use application::{Game, GameError};
pub use engine::Engine;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{Asset, AssetError, AssetId, AssetRegistry, EngineConfigAsset},
        foundation::color::Color,
        platform::Platform,
        Engine, Game, GameError,
    };
}

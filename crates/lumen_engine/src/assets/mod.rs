//! Asset management
//!
//! Assets are file-backed objects addressed by [`AssetId`]. The
//! [`AssetRegistry`] caches them by id without owning them, and
//! [`AssetRegistry::reload_all`] re-reads every live asset and notifies the
//! asset's reload subscribers.

mod asset;
mod asset_id;
pub mod config_assets;
mod file_assets;
mod registry;
pub mod roots;
pub mod toml_asset;

pub use asset::{Asset, AssetCore, LoadAsset, ReloadCallback, ReloadSubscription};
pub use asset_id::AssetId;
pub use config_assets::{EngineConfigAsset, GameConfigAsset, WindowSettings};
pub use file_assets::{BinaryAsset, TextAsset};
pub use registry::AssetRegistry;
pub use toml_asset::TomlAsset;

use std::path::PathBuf;
use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Id is syntactically unusable
    #[error("invalid asset id '{0}'")]
    InvalidId(String),

    /// No file exists for the id under any asset root
    #[error("asset {id} not found (searched {searched:?})")]
    NotFound {
        /// Fully-qualified id
        id: String,
        /// Candidate file paths, in lookup order
        searched: Vec<PathBuf>,
    },

    /// File exists but could not be read
    #[error("failed to read asset {id}: {source}")]
    Io {
        /// Fully-qualified id
        id: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File contents do not match the expected document shape
    #[error("failed to parse asset {id}: {message}")]
    Parse {
        /// Fully-qualified id
        id: String,
        /// Parser diagnostic
        message: String,
    },
}

//! TOML-backed structured assets

use super::{Asset, AssetCore, AssetError, AssetId, AssetRegistry, LoadAsset};
use crate::foundation::fail::{FailureKind, OrFail};
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

/// Parse TOML text into `D`, tagging errors with the asset id
pub fn parse_str<D: DeserializeOwned>(id: &AssetId, text: &str) -> Result<D, AssetError> {
    toml::from_str(text).map_err(|e| AssetError::Parse {
        id: id.fully_qualified(),
        message: e.to_string(),
    })
}

/// Read and parse an asset's TOML document; any failure is fatal
#[track_caller]
pub fn parse_document<D: DeserializeOwned>(id: &AssetId) -> D {
    let text = id.read_to_string().or_fail(FailureKind::AssetMissing, "reading TOML document");
    parse_str(id, &text).or_fail(FailureKind::Config, "parsing TOML document")
}

/// Asset holding a deserialized TOML document of type `D`
pub struct TomlAsset<D> {
    core: AssetCore,
    document: RwLock<Option<Arc<D>>>,
}

impl<D: DeserializeOwned + Send + Sync + 'static> TomlAsset<D> {
    /// Create an unloaded asset; call [`Asset::load`] before reading it
    pub fn unloaded(id: AssetId) -> Self {
        Self {
            core: AssetCore::new(id),
            document: RwLock::new(None),
        }
    }

    /// The most recently parsed document
    pub fn document(&self) -> Arc<D> {
        let document = self.document.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        document
            .clone()
            .or_fail(FailureKind::Config, format_args!("{} read before it was loaded", self.core.id()))
    }
}

impl<D: DeserializeOwned + Send + Sync + 'static> Asset for TomlAsset<D> {
    fn core(&self) -> &AssetCore {
        &self.core
    }

    fn load(&self) {
        let parsed = Arc::new(parse_document::<D>(self.core.id()));
        *self.document.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(parsed);
    }
}

impl<D: DeserializeOwned + Send + Sync + 'static> LoadAsset for TomlAsset<D> {
    type Context = ();

    fn create(_registry: &Arc<AssetRegistry>, id: AssetId, _context: ()) -> Self {
        let asset = Self::unloaded(id);
        asset.load();
        asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct MaterialDoc {
        vert_shader: AssetId,
        frag_shader: AssetId,
    }

    #[derive(Deserialize)]
    struct WrongShape {
        #[allow(dead_code)]
        missing_key: String,
    }

    #[test]
    fn test_loads_typed_document() {
        let registry = AssetRegistry::new();
        let material = registry.load::<TomlAsset<MaterialDoc>>(AssetId::parse("engine:materials/triangle.toml"));
        let doc = material.document();
        assert_eq!(doc.vert_shader.extension(), Some("vert"));
        assert_eq!(doc.frag_shader.extension(), Some("frag"));
    }

    #[test]
    fn test_parse_error_names_the_asset() {
        let id = AssetId::parse("engine:materials/triangle.toml");
        let err = parse_str::<WrongShape>(&id, "other = 1").err().unwrap();
        assert!(err.to_string().contains("engine:materials/triangle.toml"));
        assert!(err.to_string().contains("missing_key"));
    }

    #[test]
    #[should_panic(expected = "fatal config failure")]
    fn test_missing_key_is_fatal() {
        let _ = parse_document::<WrongShape>(&AssetId::parse("engine:materials/triangle.toml"));
    }
}

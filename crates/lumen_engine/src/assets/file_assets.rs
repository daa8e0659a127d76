//! Plain file assets: text and raw bytes

use super::{Asset, AssetCore, AssetId, AssetRegistry, LoadAsset};
use crate::foundation::fail::{FailureKind, OrFail};
use std::sync::{Arc, RwLock};

/// UTF-8 file contents
pub struct TextAsset {
    core: AssetCore,
    text: RwLock<Arc<str>>,
}

impl TextAsset {
    /// Current contents
    pub fn text(&self) -> Arc<str> {
        self.text.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Asset for TextAsset {
    fn core(&self) -> &AssetCore {
        &self.core
    }

    fn load(&self) {
        let text = self.id().read_to_string().or_fail(FailureKind::AssetMissing, "TextAsset::load");
        *self.text.write().unwrap_or_else(std::sync::PoisonError::into_inner) = text.into();
    }
}

impl LoadAsset for TextAsset {
    type Context = ();

    fn create(_registry: &Arc<AssetRegistry>, id: AssetId, _context: ()) -> Self {
        let asset = Self {
            core: AssetCore::new(id),
            text: RwLock::new(Arc::from("")),
        };
        asset.load();
        asset
    }
}

/// Raw file contents
pub struct BinaryAsset {
    core: AssetCore,
    bytes: RwLock<Arc<[u8]>>,
}

impl BinaryAsset {
    /// Current contents
    pub fn bytes(&self) -> Arc<[u8]> {
        self.bytes.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Asset for BinaryAsset {
    fn core(&self) -> &AssetCore {
        &self.core
    }

    fn load(&self) {
        let bytes = self.id().read_bytes().or_fail(FailureKind::AssetMissing, "BinaryAsset::load");
        *self.bytes.write().unwrap_or_else(std::sync::PoisonError::into_inner) = bytes.into();
    }
}

impl LoadAsset for BinaryAsset {
    type Context = ();

    fn create(_registry: &Arc<AssetRegistry>, id: AssetId, _context: ()) -> Self {
        let asset = Self {
            core: AssetCore::new(id),
            bytes: RwLock::new(Arc::from(Vec::new())),
        };
        asset.load();
        asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_bytes_agree() {
        let registry = AssetRegistry::new();
        let id = AssetId::parse("engine:shaders/triangle.vert");
        let text = registry.load::<TextAsset>(id.clone());
        let text_contents = text.text();
        drop(text);
        let bytes = registry.load::<BinaryAsset>(id);
        assert_eq!(text_contents.as_bytes(), &*bytes.bytes());
    }

    #[test]
    fn test_reload_keeps_identity() {
        let registry = AssetRegistry::new();
        let text = registry.load::<TextAsset>(AssetId::parse(":engine.toml"));
        let before = text.text();
        text.reload();
        assert_eq!(before, text.text());
        assert!(Arc::ptr_eq(&text, &registry.load::<TextAsset>(AssetId::parse(":engine.toml"))));
    }

    fn scratch_file(contents: &str) -> (tempfile::NamedTempFile, AssetId) {
        let dir = crate::assets::roots::engine_assets_dir().join("engine");
        let mut file = tempfile::Builder::new()
            .prefix("scratch_")
            .suffix(".txt")
            .tempfile_in(dir)
            .unwrap();
        std::io::Write::write_all(&mut file, contents.as_bytes()).unwrap();

        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();
        let id = AssetId::new("engine", &name);
        (file, id)
    }

    #[test]
    #[should_panic(expected = "fatal asset missing failure: TextAsset::load")]
    fn test_text_reload_after_file_removed_is_fatal() {
        let registry = AssetRegistry::new();
        let (file, id) = scratch_file("first");
        let text = registry.load::<TextAsset>(id);
        assert_eq!(&*text.text(), "first");

        file.close().unwrap();
        text.reload();
    }

    #[test]
    #[should_panic(expected = "fatal asset missing failure: BinaryAsset::load")]
    fn test_binary_reload_after_file_removed_is_fatal() {
        let registry = AssetRegistry::new();
        let (file, id) = scratch_file("bytes");
        let bytes = registry.load::<BinaryAsset>(id);
        assert_eq!(&*bytes.bytes(), b"bytes");

        file.close().unwrap();
        bytes.reload();
    }
}

//! Deduplicating asset cache with hot-reload broadcast

use super::{Asset, AssetId, LoadAsset};
use crate::foundation::fail::{fail, FailureKind};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

struct Entry {
    any: Weak<dyn Any + Send + Sync>,
    asset: Weak<dyn Asset>,
    type_name: &'static str,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.asset.strong_count() > 0
    }
}

/// Cache of loaded assets keyed by [`AssetId`]
///
/// The registry only holds weak references: an asset lives exactly as long as
/// some consumer holds its `Arc`. Dead entries are pruned lazily, on lookup and on reload.
#[derive(Default)]
pub struct AssetRegistry {
    entries: Mutex<HashMap<AssetId, Entry>>,
}

impl AssetRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<AssetId, Entry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Load a context-free asset
    pub fn load<T: LoadAsset<Context = ()>>(self: &Arc<Self>, id: AssetId) -> Arc<T> {
        self.load_with(id, ())
    }

    /// Return the live `T` for `id`, or construct one with `context`
    ///
    /// Loading an id that is live under a different concrete type is fatal.
    /// `context` is dropped unused on a cache hit.
    pub fn load_with<T: LoadAsset>(self: &Arc<Self>, id: AssetId, context: T::Context) -> Arc<T> {
        if let Some(existing) = self.lookup::<T>(&id) {
            return existing;
        }

        // Built without holding the lock: constructors load their own dependencies
        let asset = Arc::new(T::create(self, id.clone(), context));

        let any: Arc<dyn Any + Send + Sync> = asset.clone();
        let dyn_asset: Arc<dyn Asset> = asset.clone();
        self.entries().insert(
            id,
            Entry {
                any: Arc::downgrade(&any),
                asset: Arc::downgrade(&dyn_asset),
                type_name: type_name::<T>(),
            },
        );

        asset
    }

    fn lookup<T: LoadAsset>(&self, id: &AssetId) -> Option<Arc<T>> {
        let mut entries = self.entries();
        let entry = entries.get(id)?;
        let cached = entry.type_name;

        let Some(any) = entry.any.upgrade() else {
            entries.remove(id);
            return None;
        };

        match any.downcast::<T>() {
            Ok(asset) => Some(asset),
            Err(_) => {
                drop(entries);
                fail(
                    FailureKind::AssetTypeMismatch,
                    format_args!("{id} is cached as {cached}, requested as {}", type_name::<T>()),
                )
            }
        }
    }

    /// Reload every live asset, pruning dead entries
    pub fn reload_all(&self) {
        let live: Vec<Arc<dyn Asset>> = {
            let mut entries = self.entries();
            entries.retain(|_, entry| entry.is_live());
            entries.values().filter_map(|entry| entry.asset.upgrade()).collect()
        };

        log::info!("Reloading {} assets", live.len());
        for asset in live {
            asset.reload();
        }
    }

    /// Number of entries whose asset is still alive
    pub fn live_count(&self) -> usize {
        self.entries().values().filter(|entry| entry.is_live()).count()
    }

    /// Total entries, including dead ones not yet pruned
    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{BinaryAsset, TextAsset};

    fn engine_toml() -> AssetId {
        AssetId::parse(":engine.toml")
    }

    #[test]
    fn test_same_id_returns_same_instance() {
        let registry = AssetRegistry::new();
        let first = registry.load::<TextAsset>(engine_toml());
        let second = registry.load::<TextAsset>(engine_toml());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_dropped_asset_is_rebuilt() {
        let registry = AssetRegistry::new();
        drop(registry.load::<TextAsset>(engine_toml()));

        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.entry_count(), 1);
        registry.reload_all();
        assert_eq!(registry.entry_count(), 0);

        let second = registry.load::<TextAsset>(engine_toml());
        assert_eq!(registry.live_count(), 1);
        assert!(second.text().contains("[engine]"));
    }

    #[test]
    fn test_reload_all_prunes_dead_entries() {
        let registry = AssetRegistry::new();
        let kept = registry.load::<TextAsset>(engine_toml());
        drop(registry.load::<BinaryAsset>(AssetId::parse("engine:shaders/triangle.frag")));
        assert_eq!(registry.entry_count(), 2);

        registry.reload_all();
        assert_eq!(registry.entry_count(), 1);
        assert!(!kept.text().is_empty());
    }

    #[test]
    fn test_reload_all_notifies_subscribers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let registry = AssetRegistry::new();
        let text = registry.load::<TextAsset>(engine_toml());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        text.register_reload_callback(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        registry.reload_all();
        registry.reload_all();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "asset type mismatch")]
    fn test_type_mismatch_is_fatal() {
        let registry = AssetRegistry::new();
        let _text = registry.load::<TextAsset>(engine_toml());
        let _bytes = registry.load::<BinaryAsset>(engine_toml());
    }

    #[test]
    fn test_type_reuse_after_release_is_allowed() {
        let registry = AssetRegistry::new();
        drop(registry.load::<TextAsset>(engine_toml()));
        let bytes = registry.load::<BinaryAsset>(engine_toml());
        assert!(!bytes.bytes().is_empty());
    }
}

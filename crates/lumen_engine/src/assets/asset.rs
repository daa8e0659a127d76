//! Asset capability trait and reload broadcasting

use super::{AssetId, AssetRegistry};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked after an asset reloads
pub type ReloadCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`Asset::register_reload_callback`]
///
/// Handles are unique per asset and increase monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReloadSubscription(u64);

#[derive(Default)]
struct CallbackTable {
    next_id: u64,
    callbacks: BTreeMap<u64, ReloadCallback>,
}

/// State shared by every asset: its id and the reload subscribers
pub struct AssetCore {
    id: AssetId,
    callbacks: Mutex<CallbackTable>,
}

impl AssetCore {
    /// Create the core for `id` with no subscribers
    pub fn new(id: AssetId) -> Self {
        Self {
            id,
            callbacks: Mutex::new(CallbackTable::default()),
        }
    }

    /// The asset's id
    pub const fn id(&self) -> &AssetId {
        &self.id
    }

    fn table(&self) -> MutexGuard<'_, CallbackTable> {
        // A panicking callback never leaves the table half-updated
        self.callbacks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe to reloads of this asset
    pub fn register(&self, callback: ReloadCallback) -> ReloadSubscription {
        let mut table = self.table();
        let id = table.next_id;
        table.next_id += 1;
        table.callbacks.insert(id, callback);
        ReloadSubscription(id)
    }

    /// Remove a subscription; unknown handles are ignored
    pub fn deregister(&self, subscription: ReloadSubscription) {
        self.table().callbacks.remove(&subscription.0);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.table().callbacks.len()
    }

    /// Invoke every subscriber registered when the broadcast started
    ///
    /// Iterates a snapshot so callbacks may register or deregister (themselves
    /// included) without disturbing the loop. A subscriber removed during the
    /// broadcast is not called afterwards.
    pub fn notify_reloaded(&self) {
        let snapshot: Vec<(u64, ReloadCallback)> = self
            .table()
            .callbacks
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in snapshot {
            let still_registered = self.table().callbacks.contains_key(&id);
            if still_registered {
                callback();
            }
        }
    }
}

/// Behaviour shared by every asset kind
///
/// Implementors provide [`Asset::core`] and the type-specific [`Asset::load`];
/// everything else has a default.
pub trait Asset: Send + Sync + 'static {
    /// Shared id and subscriber state
    fn core(&self) -> &AssetCore;

    /// Read (or re-read) the asset's backing data
    fn load(&self);

    /// The asset's id
    fn id(&self) -> &AssetId {
        self.core().id()
    }

    /// Re-run [`Asset::load`] and notify subscribers
    fn reload(&self) {
        log::debug!("Reloading asset {}", self.id());
        self.load();
        self.core().notify_reloaded();
    }

    /// Subscribe to reloads of this asset
    fn register_reload_callback(&self, callback: ReloadCallback) -> ReloadSubscription {
        self.core().register(callback)
    }

    /// Remove a reload subscription
    fn deregister_reload_callback(&self, subscription: ReloadSubscription) {
        self.core().deregister(subscription);
    }
}

/// Construction hook used by [`AssetRegistry`]
///
/// `Context` carries whatever the asset needs beyond its id, such as a GPU
/// backend. Context-free assets use `()`.
pub trait LoadAsset: Asset + Sized {
    /// Extra construction input
    type Context;

    /// Build and load the asset
    fn create(registry: &Arc<AssetRegistry>, id: AssetId, context: Self::Context) -> Self;
}

//! Repository cache isolation.
//!
//! Repositories read and write through a [`CacheView`]. Outside a scope, or
//! with [`RepositoryCacheMode::None`], the view targets the process wide
//! [`AppCache`] directly. Inside a `Default` or `Scoped` scope it targets the
//! chain's shadow overlay: reads check the shadow first and fall back to the
//! global cache, writes stay in the shadow until the outermost scope commits.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Ordered from least to most isolated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryCacheMode {
    /// Inherit from the parent scope, `Default` for a root scope.
    #[default]
    Unspecified,
    None,
    Default,
    Scoped,
}

type CacheKey = (TypeId, String);
type Entry = Arc<dyn Any + Send + Sync>;

fn cache_key<T: Any>(key: &str) -> CacheKey {
    (TypeId::of::<T>(), key.to_owned())
}

/// Process wide typed cache.
#[derive(Default)]
pub struct AppCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl AppCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.entries.read().get(&cache_key::<T>(key)).cloned()?;
        entry.downcast::<T>().ok()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.entries
            .write()
            .insert((TypeId::of::<T>(), key.into()), Arc::new(value));
    }

    pub fn remove<T: Any + Send + Sync>(&self, key: &str) -> bool {
        self.entries.write().remove(&cache_key::<T>(key)).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn apply(&self, slots: HashMap<CacheKey, Slot>) {
        if slots.is_empty() {
            return;
        }

        let mut entries = self.entries.write();
        for (key, slot) in slots {
            match slot {
                Slot::Present(value) => {
                    entries.insert(key, value);
                }
                Slot::Removed => {
                    entries.remove(&key);
                }
            }
        }
    }
}

enum Slot {
    Present(Entry),
    Removed,
}

/// Uncommitted cache writes of one scope chain.
#[derive(Default)]
pub(crate) struct ShadowCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl ShadowCache {
    fn get<T: Any + Send + Sync>(&self, key: &str, global: &AppCache) -> Option<Arc<T>> {
        let shadowed = {
            let slots = self.slots.lock();
            match slots.get(&cache_key::<T>(key)) {
                Some(Slot::Present(entry)) => Some(Some(entry.clone())),
                Some(Slot::Removed) => Some(None),
                None => None,
            }
        };

        match shadowed {
            Some(entry) => entry?.downcast::<T>().ok(),
            None => global.get::<T>(key),
        }
    }

    fn insert<T: Any + Send + Sync>(&self, key: String, value: T) {
        self.slots
            .lock()
            .insert((TypeId::of::<T>(), key), Slot::Present(Arc::new(value)));
    }

    fn remove<T: Any + Send + Sync>(&self, key: &str) {
        self.slots.lock().insert(cache_key::<T>(key), Slot::Removed);
    }

    pub(crate) fn merge_into(&self, global: &AppCache) {
        let slots = std::mem::take(&mut *self.slots.lock());
        global.apply(slots);
    }

    pub(crate) fn discard(&self) {
        self.slots.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// What repositories see of the cache for the current unit of work.
#[derive(Clone)]
pub struct CacheView {
    global: Arc<AppCache>,
    shadow: Option<Arc<ShadowCache>>,
}

impl CacheView {
    pub(crate) fn global(global: Arc<AppCache>) -> Self {
        Self {
            global,
            shadow: None,
        }
    }

    pub(crate) fn isolated(global: Arc<AppCache>, shadow: Arc<ShadowCache>) -> Self {
        Self {
            global,
            shadow: Some(shadow),
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        match &self.shadow {
            Some(shadow) => shadow.get::<T>(key, &self.global),
            None => self.global.get::<T>(key),
        }
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        match &self.shadow {
            Some(shadow) => shadow.insert(key.into(), value),
            None => self.global.insert(key, value),
        }
    }

    pub fn remove<T: Any + Send + Sync>(&self, key: &str) {
        match &self.shadow {
            Some(shadow) => shadow.remove::<T>(key),
            None => {
                self.global.remove::<T>(key);
            }
        }
    }

    /// Number of pending writes, `0` when not isolated.
    pub fn pending(&self) -> usize {
        self.shadow.as_ref().map(|s| s.len()).unwrap_or_default()
    }
}

//! Process-wide connection slots.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use lazy_static::lazy_static;
use tracing::debug;

use crate::config::RedisMode;
use crate::error::Error;
use crate::store::KeyValueStore;

lazy_static! {
    static ref GLOBAL: Arc<ConnectionRegistry> = Arc::new(ConnectionRegistry::new());
}

/// One connection slot per topology, shared by every storage that uses it.
///
/// Slots are keyed by topology alone. Two stores configured with the same
/// mode share a handle even when their connection settings differ: the
/// first one to connect wins.
#[derive(Default)]
pub struct ConnectionRegistry {
    slots: DashMap<RedisMode, Arc<dyn KeyValueStore>>,
}

impl ConnectionRegistry {
    /// An empty registry, independent of [`global`](Self::global).
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<ConnectionRegistry> {
        GLOBAL.clone()
    }

    /// Handle in the slot of `mode`, if any.
    pub fn get(&self, mode: RedisMode) -> Option<Arc<dyn KeyValueStore>> {
        self.slots.get(&mode).map(|slot| slot.value().clone())
    }

    /// Puts `store` in the slot of `mode`, replacing what was there.
    pub fn set(&self, mode: RedisMode, store: Arc<dyn KeyValueStore>) {
        self.slots.insert(mode, store);
    }

    /// Returns the slot's handle, creating it with `init` when empty.
    ///
    /// The slot stays locked while `init` runs, so concurrent callers never
    /// build two handles for the same topology.
    pub fn get_or_try_insert_with<F>(
        &self,
        mode: RedisMode,
        init: F,
    ) -> Result<Arc<dyn KeyValueStore>, Error>
    where
        F: FnOnce() -> Result<Arc<dyn KeyValueStore>, Error>,
    {
        let slot = self.slots.entry(mode).or_try_insert_with(|| {
            debug!(mode = %mode, "Populating shared redis connection slot");
            init()
        })?;
        Ok(slot.value().clone())
    }

    /// Empties the slot of `mode`.
    pub fn invalidate(&self, mode: RedisMode) {
        if self.slots.remove(&mode).is_some() {
            debug!(mode = %mode, "Shared redis connection slot cleared");
        }
    }

    /// Empties the slot only if it still holds `store`.
    ///
    /// A handle that was already replaced by another caller stays in place.
    pub fn invalidate_handle(&self, mode: RedisMode, store: &Arc<dyn KeyValueStore>) {
        let removed = self
            .slots
            .remove_if(&mode, |_, current| Arc::ptr_eq(current, store));
        if removed.is_some() {
            debug!(mode = %mode, "Shared redis connection slot cleared");
        }
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modes: Vec<_> = self.slots.iter().map(|slot| *slot.key()).collect();
        f.debug_struct("ConnectionRegistry")
            .field("populated", &modes)
            .finish()
    }
}

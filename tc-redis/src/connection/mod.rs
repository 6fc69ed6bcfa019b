//! Connection management.
//!
//! A storage never owns a redis client directly. It asks a
//! [`ConnectionResolver`] for a handle; the resolver either reuses the
//! process-wide slot of the configured topology ([`Sharing::Shared`]) or
//! keeps a handle of its own ([`Sharing::Dedicated`]). Handles are created by
//! a [`Connect`] implementation, [`RedisConnector`] in production.

pub mod builder;
pub mod registry;
pub mod sentinel;

use std::sync::{Arc, Mutex};

use crate::config::{ConnectionConfig, RedisMode};
use crate::error::Error;
use crate::store::KeyValueStore;

pub use builder::{DEFAULT_CLUSTER_PORT, NodeAddr, Topology};
pub use registry::ConnectionRegistry;
pub use sentinel::SentinelMaster;

/// Creates key/value handles from connection settings.
pub trait Connect: Send + Sync {
    /// Creates a handle for `config`.
    ///
    /// Called once per slot or per dedicated resolver, and again after an
    /// invalidation. Implementations should not perform I/O here.
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn KeyValueStore>, Error>;
}

/// Connects to real redis deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl Connect for RedisConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn KeyValueStore>, Error> {
        Ok(Arc::new(builder::build(config)?))
    }
}

/// Where a storage keeps its connection.
#[derive(Debug, Clone)]
pub enum Sharing {
    /// Reuse the slot of the configured topology in this registry.
    Shared(Arc<ConnectionRegistry>),
    /// Keep a private handle.
    Dedicated,
}

impl Default for Sharing {
    fn default() -> Self {
        Sharing::Shared(ConnectionRegistry::global())
    }
}

/// Hands out the key/value handle of one storage.
pub struct ConnectionResolver {
    config: ConnectionConfig,
    mode: RedisMode,
    sharing: Sharing,
    connector: Arc<dyn Connect>,
    local: Mutex<Option<Arc<dyn KeyValueStore>>>,
}

impl ConnectionResolver {
    /// Fails when the configured mode is unknown.
    pub fn new(
        config: ConnectionConfig,
        sharing: Sharing,
        connector: Arc<dyn Connect>,
    ) -> Result<Self, Error> {
        let mode = config.mode()?;
        Ok(Self {
            config,
            mode,
            sharing,
            connector,
            local: Mutex::new(None),
        })
    }

    /// Settings handles are built from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Validated topology, also the registry slot used when shared.
    pub fn mode(&self) -> RedisMode {
        self.mode
    }

    /// Whether handles come from a registry.
    pub fn is_shared(&self) -> bool {
        matches!(self.sharing, Sharing::Shared(_))
    }

    /// The current handle.
    ///
    /// Looks at the local handle first, then at the registry slot when
    /// shared, and builds a new handle only when both are empty.
    pub fn store(&self) -> Result<Arc<dyn KeyValueStore>, Error> {
        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = local.as_ref() {
            return Ok(store.clone());
        }

        let store = match &self.sharing {
            Sharing::Shared(registry) => registry
                .get_or_try_insert_with(self.mode, || self.connector.connect(&self.config))?,
            Sharing::Dedicated => self.connector.connect(&self.config)?,
        };
        *local = Some(store.clone());
        Ok(store)
    }

    /// Drops `failed` from the local cache and from the registry slot, so
    /// that the next call to [`store`](Self::store) reconnects. A slot that
    /// already holds a newer handle is left alone.
    pub fn invalidate(&self, failed: &Arc<dyn KeyValueStore>) {
        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        if local
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, failed))
        {
            *local = None;
        }
        drop(local);

        if let Sharing::Shared(registry) = &self.sharing {
            registry.invalidate_handle(self.mode, failed);
        }
    }
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("mode", &self.mode)
            .field("shared", &self.is_shared())
            .finish_non_exhaustive()
    }
}

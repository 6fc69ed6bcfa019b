//! In-memory stand-ins for redis used by the storage tests.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::RedisError;
use tc_redis::{
    Connect, ConnectionConfig, ConnectionRegistry, Error, KeyValueStore, Sharing,
    store::{TTL_MISSING, TTL_NO_EXPIRY},
};

type Entry = (Bytes, Option<DateTime<Utc>>);

/// Key/value store backed by a DashMap, with switchable failures.
///
/// Clones share their data, so every handle handed out by a
/// [`CountingConnector`] sees the same keys.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    failing: Arc<AtomicBool>,
    commands: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following command fail (or succeed again).
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    /// Raw value, bypassing expiry.
    pub fn value(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|entry| entry.0.clone())
    }

    pub fn expiry(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|entry| entry.1)
    }

    pub fn insert(&self, key: &str, value: &[u8]) {
        self.entries
            .insert(key.to_owned(), (Bytes::copy_from_slice(value), None));
    }

    pub fn set_expiry(&self, key: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.1 = Some(at);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn check(&self) -> Result<(), Error> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RedisError::from(std::io::Error::other("simulated error")).into());
        }
        Ok(())
    }

    fn purge(&self, key: &str) {
        let now = Utc::now();
        self.entries
            .remove_if(key, |_, (_, expiry)| expiry.is_some_and(|at| at <= now));
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.check()?;
        self.purge(key);
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.check()?;
        self.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.check()?;
        self.purge(key);
        Ok(self.entries.contains_key(key))
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.check()?;
        self.set_expiry(key, at);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, Error> {
        self.check()?;
        self.purge(key);
        Ok(match self.entries.get(key) {
            None => TTL_MISSING,
            Some(entry) => match entry.1 {
                None => TTL_NO_EXPIRY,
                Some(at) => (at - Utc::now()).num_seconds().max(0),
            },
        })
    }
}

/// Hands out [`MemoryStore`] handles and counts how often it was asked to.
#[derive(Default)]
pub struct CountingConnector {
    store: MemoryStore,
    connects: AtomicUsize,
    hosts: Mutex<Vec<String>>,
}

impl CountingConnector {
    pub fn new(store: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            connects: AtomicUsize::new(0),
            hosts: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Hosts of every connection made, in order.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }
}

impl Connect for CountingConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn KeyValueStore>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.hosts.lock().unwrap().push(config.host.clone());
        Ok(Arc::new(self.store.clone()))
    }
}

/// A fresh registry, so tests never see each other's connections.
pub fn isolated() -> Sharing {
    Sharing::Shared(Arc::new(ConnectionRegistry::new()))
}

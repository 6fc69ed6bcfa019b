//! The key/value capability the storages are written against.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Error;

/// Remaining-TTL reply for a key without expiry.
pub const TTL_NO_EXPIRY: i64 = -1;
/// Remaining-TTL reply for a missing key.
pub const TTL_MISSING: i64 = -2;

/// A live handle to a key/value backend.
///
/// Handles are shared between storages, so implementations must be safe to
/// use from several tasks at once. Missing keys are reported through return
/// values, never through errors.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    /// Writes a value, replacing any previous one and its expiry.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Deletes a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Checks whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Makes a key expire at an absolute point in time.
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<(), Error>;

    /// Seconds until a key expires, [`TTL_NO_EXPIRY`] or [`TTL_MISSING`].
    async fn ttl(&self, key: &str) -> Result<i64, Error>;
}

#[async_trait]
impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        (**self).exists(key).await
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<(), Error> {
        (**self).expire_at(key, at).await
    }

    async fn ttl(&self, key: &str) -> Result<i64, Error> {
        (**self).ttl(key).await
    }
}

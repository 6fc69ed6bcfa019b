//! Original image storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::Value;
use tc_storage::{Raw, ServerParameters, Storage, StorageResult};
use tracing::{debug, warn};

use crate::config::{self, ConnectionConfig, RedisConfig, StorageKind};
use crate::connection::{Connect, ConnectionResolver, RedisConnector, Sharing};
use crate::error::Error;
use crate::intercept::Guard;

fn crypto_key(path: &str) -> String {
    format!("thumbor-crypto-{path}")
}

fn detector_key(path: &str) -> String {
    format!("thumbor-detector-{path}")
}

/// Stores original images, their signing keys and detector output in redis.
///
/// Images live under their raw path. Signing keys and detector output live
/// under `thumbor-crypto-{path}` and `thumbor-detector-{path}`.
///
/// ```no_run
/// use tc_redis::{RedisConfig, RedisStorage};
/// use tc_storage::{ServerParameters, Storage};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfig::default();
/// let storage = RedisStorage::builder(&config)
///     .server(ServerParameters::new().security_key("MY_SECURE_KEY"))
///     .build()?;
///
/// storage.put("/images/cat.jpg", "bytes".into()).await?;
/// assert!(storage.exists("/images/cat.jpg").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RedisStorage {
    guard: Guard,
    server: ServerParameters,
    expiration: Option<TimeDelta>,
    stores_crypto_key: bool,
}

impl RedisStorage {
    /// Starts a builder over the given configuration.
    pub fn builder(config: &RedisConfig) -> RedisStorageBuilder {
        RedisStorageBuilder::new(config)
    }

    /// The resolver owning this storage's connection.
    pub fn resolver(&self) -> &ConnectionResolver {
        self.guard.resolver()
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        self.guard
            .run("put", (), |store| async move {
                store.set(path, bytes).await?;
                if let Some(expiration) = self.expiration {
                    store.expire_at(path, config::expire_at(expiration)?).await?;
                }
                debug!(
                    key = path,
                    ttl = self.expiration.map(|ttl| ttl.num_seconds()),
                    "Stored original image"
                );
                Ok(())
            })
            .await
    }

    async fn write_crypto(&self, path: &str) -> Result<(), Error> {
        if !self.stores_crypto_key {
            return Ok(());
        }
        let security_key = self.server.signing_key().ok_or(Error::MissingSecurityKey)?;
        let key = crypto_key(path);

        self.guard
            .run("put_crypto", (), |store| async move {
                store.set(&key, security_key.as_bytes()).await
            })
            .await
    }

    async fn write_detector_data(&self, path: &str, data: &Value) -> Result<(), Error> {
        let key = detector_key(path);
        let payload = data.to_string();

        self.guard
            .run("put_detector_data", (), |store| async move {
                store.set(&key, payload.as_bytes()).await
            })
            .await
    }

    async fn read_crypto(&self, path: &str) -> Result<Option<String>, Error> {
        if !self.stores_crypto_key {
            return Ok(None);
        }
        let key = crypto_key(path);

        self.guard
            .run("get_crypto", None, |store| async move {
                let value = store.get(&key).await?;
                Ok(value
                    .filter(|value| !value.is_empty())
                    .map(|value| String::from_utf8_lossy(&value).into_owned()))
            })
            .await
    }

    async fn read_detector_data(&self, path: &str) -> Result<Option<Value>, Error> {
        let key = detector_key(path);

        self.guard
            .run("get_detector_data", None, |store| async move {
                let Some(raw) = store.get(&key).await?.filter(|raw| !raw.is_empty()) else {
                    return Ok(None);
                };
                match serde_json::from_slice(&raw) {
                    Ok(value) => Ok(Some(value)),
                    Err(error) => {
                        warn!(key = %key, error = %error, "Ignoring malformed detector data");
                        Ok(None)
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn put(&self, path: &str, bytes: Raw) -> StorageResult<()> {
        Ok(self.write(path, &bytes).await?)
    }

    async fn put_crypto(&self, path: &str) -> StorageResult<()> {
        Ok(self.write_crypto(path).await?)
    }

    async fn put_detector_data(&self, path: &str, data: &Value) -> StorageResult<()> {
        Ok(self.write_detector_data(path, data).await?)
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Raw>> {
        let value = self
            .guard
            .run("get", None, |store| async move { store.get(path).await })
            .await?;
        Ok(value)
    }

    async fn get_crypto(&self, path: &str) -> StorageResult<Option<String>> {
        Ok(self.read_crypto(path).await?)
    }

    async fn get_detector_data(&self, path: &str) -> StorageResult<Option<Value>> {
        Ok(self.read_detector_data(path).await?)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let exists = self
            .guard
            .run("exists", false, |store| async move { store.exists(path).await })
            .await?;
        Ok(exists)
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.guard
            .run("remove", (), |store| async move { store.delete(path).await })
            .await?;
        Ok(())
    }
}

/// Builder for [`RedisStorage`].
pub struct RedisStorageBuilder {
    config: RedisConfig,
    server: ServerParameters,
    sharing: Sharing,
    connector: Arc<dyn Connect>,
}

impl RedisStorageBuilder {
    fn new(config: &RedisConfig) -> Self {
        Self {
            config: config.clone(),
            server: ServerParameters::default(),
            sharing: Sharing::default(),
            connector: Arc::new(RedisConnector),
        }
    }

    /// Server parameters holding the process signing key.
    pub fn server(mut self, server: ServerParameters) -> Self {
        self.server = server;
        self
    }

    /// Where the connection is kept. Defaults to the process-wide registry.
    pub fn sharing(mut self, sharing: Sharing) -> Self {
        self.sharing = sharing;
        self
    }

    /// Keep a private connection instead of the shared one.
    pub fn dedicated(self) -> Self {
        self.sharing(Sharing::Dedicated)
    }

    /// Replaces the component that creates connections.
    pub fn connector(mut self, connector: Arc<dyn Connect>) -> Self {
        self.connector = connector;
        self
    }

    /// Builds the storage and resolves its connection.
    ///
    /// Configuration problems are reported here, before any command runs.
    pub fn build(self) -> Result<RedisStorage, Error> {
        let kind = StorageKind::Storage;
        let expiration = config::expiration(
            "STORAGE_EXPIRATION_SECONDS",
            self.config.storage_expiration_seconds,
        )?;
        let connection = ConnectionConfig::resolve(&self.config, kind)?;
        let resolver = ConnectionResolver::new(connection, self.sharing, self.connector)?;
        resolver.store()?;

        Ok(RedisStorage {
            guard: Guard::new(resolver, kind, self.config.ignore_errors(kind)),
            server: self.server,
            expiration,
            stores_crypto_key: self.config.stores_crypto_key_for_each_image,
        })
    }
}

//! Processed result storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use tc_storage::{Raw, RequestParameters, ResultStorage, StorageResult};
use tracing::debug;

use crate::config::{self, ConnectionConfig, RedisConfig, StorageKind};
use crate::connection::{Connect, ConnectionResolver, RedisConnector, Sharing};
use crate::error::Error;
use crate::intercept::Guard;
use crate::store::TTL_NO_EXPIRY;

lazy_static! {
    static ref STARTED_AT: DateTime<Utc> = Utc::now();
}

/// When the first result storage of this process was created.
///
/// Results stored without expiry report this as their last update.
pub fn started_at() -> DateTime<Utc> {
    *STARTED_AT
}

/// Stores the processed result of one request in redis.
///
/// The key is `result:{url}`, with a `/webp` suffix when `AUTO_WEBP` is on
/// and the client accepts WebP. A request carrying `max_age = 0` disables
/// expiry; otherwise `RESULT_STORAGE_EXPIRATION_SECONDS` applies.
#[derive(Debug)]
pub struct RedisResultStorage {
    guard: Guard,
    key: String,
    max_age: i64,
    expiration: Option<TimeDelta>,
}

impl RedisResultStorage {
    /// Starts a builder for the result of `request`.
    pub fn builder(
        config: &RedisConfig,
        request: RequestParameters,
    ) -> RedisResultStorageBuilder {
        RedisResultStorageBuilder::new(config, request)
    }

    /// Key of the current request's result.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Expiry in seconds applied to the current request's result.
    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    /// The resolver owning this storage's connection.
    pub fn resolver(&self) -> &ConnectionResolver {
        self.guard.resolver()
    }

    async fn write(&self, bytes: &[u8]) -> Result<Option<String>, Error> {
        let key = self.key.as_str();
        let expiration = self.expiration;
        debug!(key, ttl = self.max_age, "Storing result");

        self.guard
            .run("put", None, |store| async move {
                store.set(key, bytes).await?;
                if let Some(expiration) = expiration {
                    store.expire_at(key, config::expire_at(expiration)?).await?;
                }
                Ok(Some(key.to_owned()))
            })
            .await
    }

    async fn read(&self) -> Result<Option<Raw>, Error> {
        let key = self.key.as_str();
        self.guard
            .run("get", None, |store| async move {
                Ok(store.get(key).await?.filter(|value| !value.is_empty()))
            })
            .await
    }

    async fn read_last_updated(&self) -> Result<DateTime<Utc>, Error> {
        let max_age = self.max_age;
        if max_age <= 0 {
            return Ok(started_at());
        }

        let key = self.key.as_str();
        self.guard
            .run("last_updated", Utc::now(), |store| async move {
                let ttl = store.ttl(key).await?;
                Ok(match ttl {
                    ttl if ttl >= 0 => TimeDelta::try_seconds(max_age - ttl)
                        .and_then(|age| Utc::now().checked_sub_signed(age))
                        .unwrap_or_else(Utc::now),
                    TTL_NO_EXPIRY => started_at(),
                    // The entry vanished between the write and this read.
                    _ => Utc::now(),
                })
            })
            .await
    }
}

#[async_trait]
impl ResultStorage for RedisResultStorage {
    async fn put(&self, bytes: Raw) -> StorageResult<Option<String>> {
        Ok(self.write(&bytes).await?)
    }

    async fn get(&self) -> StorageResult<Option<Raw>> {
        Ok(self.read().await?)
    }

    async fn last_updated(&self) -> StorageResult<DateTime<Utc>> {
        Ok(self.read_last_updated().await?)
    }
}

/// Builder for [`RedisResultStorage`].
pub struct RedisResultStorageBuilder {
    config: RedisConfig,
    request: RequestParameters,
    sharing: Sharing,
    connector: Arc<dyn Connect>,
}

impl RedisResultStorageBuilder {
    fn new(config: &RedisConfig, request: RequestParameters) -> Self {
        Self {
            config: config.clone(),
            request,
            sharing: Sharing::default(),
            connector: Arc::new(RedisConnector),
        }
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
    pub fn build(self) -> Result<RedisResultStorage, Error> {
        let kind = StorageKind::ResultStorage;
        let configured = config::expiration(
            "RESULT_STORAGE_EXPIRATION_SECONDS",
            self.config.result_storage_expiration_seconds,
        )?;
        let max_age = max_age(&self.config, &self.request);
        let connection = ConnectionConfig::resolve(&self.config, kind)?;
        let resolver = ConnectionResolver::new(connection, self.sharing, self.connector)?;
        resolver.store()?;
        lazy_static::initialize(&STARTED_AT);

        Ok(RedisResultStorage {
            guard: Guard::new(resolver, kind, self.config.ignore_errors(kind)),
            key: result_key(&self.config, &self.request),
            max_age,
            expiration: configured.filter(|_| max_age > 0),
        })
    }
}

/// `result:{url}`, suffixed with `/webp` when WebP is negotiated.
pub fn result_key(config: &RedisConfig, request: &RequestParameters) -> String {
    let mut key = format!("result:{}", request.url());
    if config.auto_webp && request.webp_accepted() {
        key.push_str("/webp");
    }
    key
}

/// A request `max_age` of zero wins over the configured expiry.
pub fn max_age(config: &RedisConfig, request: &RequestParameters) -> i64 {
    match request.max_age_hint() {
        Some(0) => 0,
        _ => config.result_storage_expiration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_result_key() {
        let request = RequestParameters::new("/unsafe/100x100/cat.jpg").accepts_webp(true);
        let mut config = RedisConfig::default();
        assert_eq!(result_key(&config, &request), "result:/unsafe/100x100/cat.jpg");

        config.auto_webp = true;
        assert_eq!(
            result_key(&config, &request),
            "result:/unsafe/100x100/cat.jpg/webp"
        );
        assert_eq!(
            result_key(&config, &request.clone().accepts_webp(false)),
            "result:/unsafe/100x100/cat.jpg"
        );
    }

    #[test]
    fn test_max_age_override() {
        let config = RedisConfig {
            result_storage_expiration_seconds: 3600,
            ..Default::default()
        };
        let request = RequestParameters::new("/image.png");

        assert_eq!(max_age(&config, &request), 3600);
        assert_eq!(max_age(&config, &request.clone().max_age(0)), 0);
        assert_eq!(max_age(&config, &request.max_age(60)), 3600);
    }
}

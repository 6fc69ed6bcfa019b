//! Redis storage configuration.
//!
//! [`RedisConfig`] mirrors the flat thumbor configuration keys one to one, so
//! a whole host configuration document can be deserialized into it; keys it
//! does not know are ignored. [`ConnectionConfig`] is the per-store view the
//! connection builder works with.

use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Deployment topology of a redis store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisMode {
    /// A single redis server.
    SingleNode,
    /// A primary/replica set managed by redis sentinel.
    Sentinel,
    /// A redis cluster.
    Cluster,
}

impl RedisMode {
    /// The configuration tag for this mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RedisMode::SingleNode => "single_node",
            RedisMode::Sentinel => "sentinel",
            RedisMode::Cluster => "cluster",
        }
    }
}

impl fmt::Display for RedisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedisMode {
    type Err = ();

    /// Parses a mode tag, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single_node" => Ok(RedisMode::SingleNode),
            "sentinel" => Ok(RedisMode::Sentinel),
            "cluster" => Ok(RedisMode::Cluster),
            _ => Err(()),
        }
    }
}

/// Which logical store a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Original images (`REDIS_STORAGE_*` keys).
    Storage,
    /// Processed results (`REDIS_RESULT_STORAGE_*` keys).
    ResultStorage,
}

impl StorageKind {
    /// Key holding the topology tag.
    pub const fn mode_key(self) -> &'static str {
        match self {
            StorageKind::Storage => "REDIS_STORAGE_MODE",
            StorageKind::ResultStorage => "REDIS_RESULT_STORAGE_MODE",
        }
    }

    /// Key holding the instance list for the given topology.
    pub const fn instances_key(self, mode: RedisMode) -> &'static str {
        match (self, mode) {
            (StorageKind::Storage, RedisMode::Cluster) => "REDIS_CLUSTER_STORAGE_STARTUP_INSTANCES",
            (StorageKind::Storage, _) => "REDIS_SENTINEL_STORAGE_INSTANCES",
            (StorageKind::ResultStorage, RedisMode::Cluster) => {
                "REDIS_CLUSTER_RESULT_STORAGE_STARTUP_INSTANCES"
            }
            (StorageKind::ResultStorage, _) => "REDIS_SENTINEL_RESULT_STORAGE_INSTANCES",
        }
    }

    /// Key holding the sentinel master name.
    pub const fn master_instance_key(self) -> &'static str {
        match self {
            StorageKind::Storage => "REDIS_SENTINEL_STORAGE_MASTER_INSTANCE",
            StorageKind::ResultStorage => "REDIS_SENTINEL_RESULT_STORAGE_MASTER_INSTANCE",
        }
    }

    const fn socket_timeout_key(self) -> &'static str {
        match self {
            StorageKind::Storage => "REDIS_SENTINEL_STORAGE_SOCKET_TIMEOUT",
            StorageKind::ResultStorage => "REDIS_SENTINEL_RESULT_STORAGE_SOCKET_TIMEOUT",
        }
    }
}

/// Every configuration key the redis storages read.
///
/// ```
/// use tc_redis::RedisConfig;
///
/// let config = RedisConfig::from_yaml(
///     r#"
/// REDIS_STORAGE_MODE: cluster
/// REDIS_CLUSTER_STORAGE_STARTUP_INSTANCES: "localhost:6390,localhost:6391"
/// "#,
/// )?;
/// assert_eq!(config.redis_storage_mode, "cluster");
/// assert!(config.redis_storage_ignore_errors);
/// # Ok::<(), tc_redis::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RedisConfig {
    /// Topology of the original image store: `single_node`, `sentinel` or `cluster`.
    pub redis_storage_mode: String,
    /// Single node host.
    pub redis_storage_server_host: String,
    /// Single node port.
    pub redis_storage_server_port: u16,
    /// Single node database index.
    pub redis_storage_server_db: i64,
    /// Password for single node and cluster servers.
    pub redis_storage_server_password: Option<String>,
    /// Log backend failures and return empty values instead of failing.
    pub redis_storage_ignore_errors: bool,
    /// Comma separated cluster seed nodes.
    pub redis_cluster_storage_startup_instances: Option<String>,
    /// Comma separated `host:port` sentinels.
    pub redis_sentinel_storage_instances: Option<String>,
    /// Name of the master monitored by the sentinels.
    pub redis_sentinel_storage_master_instance: Option<String>,
    /// Database index on the sentinel-managed primary.
    pub redis_sentinel_storage_master_db: i64,
    /// Password of the sentinel-managed primary.
    pub redis_sentinel_storage_master_password: Option<String>,
    /// Password of the sentinels themselves.
    pub redis_sentinel_storage_password: Option<String>,
    /// Sentinel and primary socket timeout, in seconds.
    pub redis_sentinel_storage_socket_timeout: f64,

    /// Topology of the result store.
    pub redis_result_storage_mode: String,
    /// Result store single node host.
    pub redis_result_storage_server_host: String,
    /// Result store single node port.
    pub redis_result_storage_server_port: u16,
    /// Result store single node database index.
    pub redis_result_storage_server_db: i64,
    /// Result store password for single node and cluster servers.
    pub redis_result_storage_server_password: Option<String>,
    /// Result store counterpart of `redis_storage_ignore_errors`.
    pub redis_result_storage_ignore_errors: bool,
    /// Result store cluster seed nodes.
    pub redis_cluster_result_storage_startup_instances: Option<String>,
    /// Result store sentinels.
    pub redis_sentinel_result_storage_instances: Option<String>,
    /// Result store sentinel master name.
    pub redis_sentinel_result_storage_master_instance: Option<String>,
    /// Result store database index on the primary.
    pub redis_sentinel_result_storage_master_db: i64,
    /// Result store primary password.
    pub redis_sentinel_result_storage_master_password: Option<String>,
    /// Result store sentinel password.
    pub redis_sentinel_result_storage_password: Option<String>,
    /// Result store socket timeout, in seconds.
    pub redis_sentinel_result_storage_socket_timeout: f64,

    /// Seconds before an original image expires. Zero or less disables expiry.
    pub storage_expiration_seconds: i64,
    /// Default seconds before a result expires. Zero or less disables expiry.
    pub result_storage_expiration_seconds: i64,
    /// Store the signing key next to every original image.
    pub stores_crypto_key_for_each_image: bool,
    /// Serve WebP automatically to clients that accept it.
    pub auto_webp: bool,
}

const DEFAULT_SOCKET_TIMEOUT: f64 = 2.0;

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_storage_mode: RedisMode::SingleNode.as_str().to_owned(),
            redis_storage_server_host: "localhost".to_owned(),
            redis_storage_server_port: 6379,
            redis_storage_server_db: 0,
            redis_storage_server_password: None,
            redis_storage_ignore_errors: true,
            redis_cluster_storage_startup_instances: None,
            redis_sentinel_storage_instances: None,
            redis_sentinel_storage_master_instance: None,
            redis_sentinel_storage_master_db: 0,
            redis_sentinel_storage_master_password: None,
            redis_sentinel_storage_password: None,
            redis_sentinel_storage_socket_timeout: DEFAULT_SOCKET_TIMEOUT,

            redis_result_storage_mode: RedisMode::SingleNode.as_str().to_owned(),
            redis_result_storage_server_host: "localhost".to_owned(),
            redis_result_storage_server_port: 6379,
            redis_result_storage_server_db: 0,
            redis_result_storage_server_password: None,
            redis_result_storage_ignore_errors: true,
            redis_cluster_result_storage_startup_instances: None,
            redis_sentinel_result_storage_instances: None,
            redis_sentinel_result_storage_master_instance: None,
            redis_sentinel_result_storage_master_db: 0,
            redis_sentinel_result_storage_master_password: None,
            redis_sentinel_result_storage_password: None,
            redis_sentinel_result_storage_socket_timeout: DEFAULT_SOCKET_TIMEOUT,

            storage_expiration_seconds: 60 * 60 * 24 * 30,
            result_storage_expiration_seconds: 0,
            stores_crypto_key_for_each_image: false,
            auto_webp: false,
        }
    }
}

impl RedisConfig {
    /// Parses a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_saphyr::from_str(yaml).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Builds the configuration from an already parsed key/value map.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// The `*_IGNORE_ERRORS` flag of the given store.
    pub fn ignore_errors(&self, kind: StorageKind) -> bool {
        match kind {
            StorageKind::Storage => self.redis_storage_ignore_errors,
            StorageKind::ResultStorage => self.redis_result_storage_ignore_errors,
        }
    }
}

/// Connection settings of one logical store.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Store these settings were resolved for.
    pub kind: StorageKind,
    /// Lower-cased topology tag, validated when the connection is built.
    pub mode: String,
    /// Single node host.
    pub host: String,
    /// Single node port.
    pub port: u16,
    /// Single node database index.
    pub db: i64,
    /// Server password, also used for cluster nodes.
    pub password: Option<String>,
    /// Comma separated `host:port` list: sentinels or cluster seed nodes.
    pub instances: Option<String>,
    /// Sentinel master name.
    pub master_instance: Option<String>,
    /// Database index on the sentinel-managed primary.
    pub master_db: i64,
    /// Password of the sentinel-managed primary.
    pub master_password: Option<String>,
    /// Password for the sentinels themselves.
    pub sentinel_password: Option<String>,
    /// Bound on sentinel queries and on commands sent to a sentinel-managed primary.
    pub socket_timeout: Duration,
}

impl ConnectionConfig {
    /// Picks the settings of `kind` out of the full configuration.
    pub fn resolve(config: &RedisConfig, kind: StorageKind) -> Result<Self, Error> {
        let resolved = match kind {
            StorageKind::Storage => Self {
                kind,
                mode: config.redis_storage_mode.to_ascii_lowercase(),
                host: config.redis_storage_server_host.clone(),
                port: config.redis_storage_server_port,
                db: config.redis_storage_server_db,
                password: config.redis_storage_server_password.clone(),
                instances: None,
                master_instance: config.redis_sentinel_storage_master_instance.clone(),
                master_db: config.redis_sentinel_storage_master_db,
                master_password: config.redis_sentinel_storage_master_password.clone(),
                sentinel_password: config.redis_sentinel_storage_password.clone(),
                socket_timeout: socket_timeout(kind, config.redis_sentinel_storage_socket_timeout)?,
            },
            StorageKind::ResultStorage => Self {
                kind,
                mode: config.redis_result_storage_mode.to_ascii_lowercase(),
                host: config.redis_result_storage_server_host.clone(),
                port: config.redis_result_storage_server_port,
                db: config.redis_result_storage_server_db,
                password: config.redis_result_storage_server_password.clone(),
                instances: None,
                master_instance: config.redis_sentinel_result_storage_master_instance.clone(),
                master_db: config.redis_sentinel_result_storage_master_db,
                master_password: config.redis_sentinel_result_storage_master_password.clone(),
                sentinel_password: config.redis_sentinel_result_storage_password.clone(),
                socket_timeout: socket_timeout(
                    kind,
                    config.redis_sentinel_result_storage_socket_timeout,
                )?,
            },
        };

        let cluster = resolved.mode == RedisMode::Cluster.as_str();
        let instances = match (kind, cluster) {
            (StorageKind::Storage, true) => &config.redis_cluster_storage_startup_instances,
            (StorageKind::Storage, false) => &config.redis_sentinel_storage_instances,
            (StorageKind::ResultStorage, true) => {
                &config.redis_cluster_result_storage_startup_instances
            }
            (StorageKind::ResultStorage, false) => &config.redis_sentinel_result_storage_instances,
        };

        Ok(Self {
            instances: instances.clone(),
            ..resolved
        })
    }

    /// Validates the topology tag.
    ///
    /// Fails with [`Error::UnknownMode`] naming the store's mode key.
    pub fn mode(&self) -> Result<RedisMode, Error> {
        self.mode.parse().map_err(|()| Error::UnknownMode {
            key: self.kind.mode_key(),
            value: self.mode.clone(),
        })
    }
}

fn socket_timeout(kind: StorageKind, seconds: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        Error::InvalidConfig(format!(
            "{} must be a non-negative number of seconds, got {seconds}",
            kind.socket_timeout_key()
        ))
    })
}

/// Converts an `*_EXPIRATION_SECONDS` value into a time span.
///
/// Zero or less means no expiry. Values that cannot be added to the current
/// time are [`Error::InvalidConfig`].
pub(crate) fn expiration(key: &'static str, seconds: i64) -> Result<Option<TimeDelta>, Error> {
    if seconds <= 0 {
        return Ok(None);
    }
    TimeDelta::try_seconds(seconds)
        .filter(|delta| Utc::now().checked_add_signed(*delta).is_some())
        .map(Some)
        .ok_or_else(|| Error::InvalidConfig(format!("{key} is out of range: {seconds}")))
}

/// The instant an entry written now with `expiration` should expire.
pub(crate) fn expire_at(expiration: TimeDelta) -> Result<DateTime<Utc>, Error> {
    Utc::now().checked_add_signed(expiration).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "expiry of {} seconds is out of range",
            expiration.num_seconds()
        ))
    })
}

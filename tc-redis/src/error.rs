//! Error types for the redis storages.
//!
//! Errors fall in two groups. Backend errors come from talking to redis and
//! go through the storages' error policy (`*_IGNORE_ERRORS`). Configuration
//! errors describe a broken setup and always reach the caller.

use std::time::Duration;

use redis::RedisError;
use tc_storage::StorageError;

/// Error type for redis storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying redis client.
    ///
    /// Connection failures, protocol errors, authentication failures and
    /// command errors all end up here.
    #[error("Redis backend error: {0}")]
    Redis(#[from] RedisError),

    /// A command did not complete within the configured socket timeout.
    #[error("Redis operation timed out after {0:?}")]
    Timeout(Duration),

    /// None of the configured sentinels knows the requested master.
    #[error("No sentinel could resolve master `{0}`")]
    MasterNotFound(String),

    /// The `*_MODE` setting names an unknown topology.
    #[error("Unknown value for {key} {value}. See README for more information.")]
    UnknownMode {
        /// Configuration key holding the mode.
        key: &'static str,
        /// The offending value.
        value: String,
    },

    /// A setting required by the selected topology is missing or empty.
    #[error("{key} must be set for redis {mode} mode")]
    MissingSetting {
        /// Missing configuration key.
        key: &'static str,
        /// Topology that needs it.
        mode: &'static str,
    },

    /// An instance list entry is not a valid `host:port` pair.
    #[error("Invalid instance `{value}` in {key}, expected host:port")]
    InvalidInstance {
        /// Configuration key holding the instance list.
        key: &'static str,
        /// The offending entry.
        value: String,
    },

    /// Per-image signing keys are enabled but the server has no signing key.
    #[error("STORES_CRYPTO_KEY_FOR_EACH_IMAGE can't be True if no SECURITY_KEY specified")]
    MissingSecurityKey,

    /// The configuration could not be parsed or holds an out-of-range value.
    #[error("Invalid redis storage configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error came from the backend rather than from configuration.
    ///
    /// Only backend errors are subject to the `*_IGNORE_ERRORS` policy.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Redis(_) | Error::Timeout(_) | Error::MasterNotFound(_)
        )
    }
}

impl From<Error> for StorageError {
    fn from(error: Error) -> Self {
        if error.is_backend() {
            StorageError::Backend(Box::new(error))
        } else {
            StorageError::Configuration(error.to_string())
        }
    }
}
